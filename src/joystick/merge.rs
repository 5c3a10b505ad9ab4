use super::event::{EventKind, JsEvent};
use super::state::Snapshot;
use crate::config::BUTTON_COUNT;
use tracing::trace;

/// Conditions that mean the device and this program disagree about the hardware.
/// None of them can be fixed by skipping the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error("Device reported button {}, but only {} buttons are configured", .index, BUTTON_COUNT)]
    ButtonIndexOutOfRange { index: u8 },

    #[error("Unknown joystick event type {0:#04x}")]
    UnknownEventKind(u8),
}

impl Snapshot {
    /// Folds one event into the snapshot.
    ///
    /// Init-flagged events set their slot like any other event but leave
    /// `initialized` alone; the first organic event marks the snapshot initialized.
    /// The timestamp always takes the event's time, even when the event turns out
    /// to be fatal.
    pub fn merge(&mut self, event: JsEvent) -> Result<(), MergeError> {
        if !event.is_init {
            self.initialized = true;
        }

        self.timestamp = event.time;

        match event.kind {
            EventKind::Axis => match self.axes.slot_mut(event.index) {
                Some(slot) => *slot = event.value,
                None => trace!("Ignoring axis {} without a slot", event.index),
            },
            EventKind::Button => {
                let slot = self
                    .buttons
                    .get_mut(usize::from(event.index))
                    .ok_or(MergeError::ButtonIndexOutOfRange { index: event.index })?;
                *slot = u8::from(event.value != 0);
            }
            EventKind::Unknown(raw) => return Err(MergeError::UnknownEventKind(raw)),
        }

        Ok(())
    }
}
