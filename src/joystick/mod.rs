//! Joystick state subsystem
//!
//! Holds the controller mirror and the rules for folding hardware events into it:
//!
//! 1. [`event`] - Discrete joystick events as the kernel joystick API reports them
//! 2. [`state`] - The [`Snapshot`] mirror of buttons and axes
//! 3. [`merge`] - Applies one [`JsEvent`] to a [`Snapshot`]
//!
//! # Data Flow
//!
//! ```text
//! Event Source ──► JsEvent ──► Snapshot::merge ──► Snapshot ──► wire::encode
//! ```

pub mod event;
pub mod merge;
pub mod state;

pub use event::{EventKind, JsEvent};
pub use merge::MergeError;
pub use state::{Axes, ButtonSlot, Snapshot};
