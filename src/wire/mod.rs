//! # Wire Codec
//!
//! Text encoding of a [`Snapshot`](crate::joystick::Snapshot) for one UDP datagram:
//!
//! ```text
//! <dispatch> <timestamp> <button_0> ... <button_11> <lsx> <lsy> <rsx> <rsy> <cross_x> <cross_y>
//! ```
//!
//! ASCII integers, each followed by a single space, no newline. Decoding validates
//! field count, dispatch tag, timestamp ordering and button range before anything
//! is replaced.

pub mod codec;

pub use codec::{decode, encode, normalize, DecodeError, FieldWriter, FIELD_COUNT};
