use super::SourceError;
use crate::joystick::event::{JsEvent, JS_EVENT_SIZE};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Reads raw `js_event` records from a kernel joystick device.
///
/// Opening the device makes the kernel replay the current state of every button
/// and axis as init-flagged events before live events follow.
pub struct DeviceSource<R = File> {
    reader: R,
}

impl DeviceSource<File> {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        info!("Opening joystick device {}", path.display());
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(file))
    }
}

impl<R: Read> DeviceSource<R> {
    pub fn from_reader(reader: R) -> Self {
        Self { reader }
    }

    /// Blocks for the next full record. A partial record is an error.
    pub fn read_event(&mut self) -> Result<JsEvent, SourceError> {
        let mut raw = [0u8; JS_EVENT_SIZE];
        let mut filled = 0;
        while filled < JS_EVENT_SIZE {
            match self.reader.read(&mut raw[filled..]) {
                Ok(0) => {
                    return Err(SourceError::ShortRead {
                        expected: JS_EVENT_SIZE,
                        got: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(JsEvent::from_bytes(&raw))
    }

    pub fn run(
        mut self,
        sender: &mpsc::Sender<JsEvent>,
        cancel: &CancellationToken,
    ) -> Result<(), SourceError> {
        info!("Starting joystick device read loop");
        while !cancel.is_cancelled() {
            let event = self.read_event()?;
            debug!(
                "Event: time {:8}, value {:6}, kind {:?}, number {}, init {}",
                event.time, event.value, event.kind, event.index, event.is_init
            );
            sender
                .blocking_send(event)
                .map_err(|_| SourceError::ChannelClosed)?;
        }
        Ok(())
    }
}
