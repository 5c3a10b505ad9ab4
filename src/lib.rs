//! # udp-joystick
//!
//! Mirrors the state of a local joystick to a remote host over UDP.
//!
//! The sender folds hardware events into a [`Snapshot`](joystick::Snapshot) and,
//! once the device's replayed start-up state has been followed by a live event,
//! sends the whole snapshot as one text line per event. The receiver validates
//! each line and replaces its own snapshot only with complete, newer packets.
//!
//! ```text
//! source ──► joystick ──► wire::encode ──► link ══UDP══► link ──► wire::decode ──► Snapshot
//! ```

pub mod config;
pub mod joystick;
pub mod link;
pub mod source;
pub mod wire;
