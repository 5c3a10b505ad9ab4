//! # Event Sources
//!
//! Producers of [`JsEvent`]s for the transmitter. Each source runs on its own OS
//! thread, because hardware reads block, and hands events over a bounded tokio
//! channel:
//!
//! ```text
//! DeviceSource  (/dev/input/jsN) ─┐
//!                                 ├─[JsEvent]→ mpsc ─→ Transmitter
//! GamepadCollector (gilrs)  ──────┘
//! ```
//!
//! A source ends when its device fails or when the receiving side of the channel
//! is dropped. Dropping the sender is how the transmitter learns the source is gone.

pub mod device;
pub mod gamepad;

use crate::config::{SourceConfig, SourceKind};
use crate::joystick::JsEvent;
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub use device::DeviceSource;
pub use gamepad::GamepadCollector;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to initialize event source: {0}")]
    InitializationError(String),

    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Joystick read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Joystick read returned {got} of {expected} bytes")]
    ShortRead { expected: usize, got: usize },

    #[error("Event channel closed")]
    ChannelClosed,

    #[error("Event source thread panicked")]
    ThreadPanicked,
}

#[derive(Clone, Debug)]
pub struct SourceSettings {
    pub kind: SourceKind,
    pub device_path: PathBuf,
    pub poll_interval: Duration,
}

impl From<&SourceConfig> for SourceSettings {
    fn from(config: &SourceConfig) -> Self {
        Self {
            kind: config.kind,
            device_path: config.device_path.clone(),
            poll_interval: Duration::from_micros(config.poll_interval_us),
        }
    }
}

/// Handle to a running source thread
pub struct SourceHandle {
    thread: JoinHandle<Result<(), SourceError>>,
}

impl SourceHandle {
    /// Starts the configured source. The device node is opened before this returns,
    /// so a missing device fails here rather than on the source thread.
    pub fn spawn(
        settings: SourceSettings,
        sender: mpsc::Sender<JsEvent>,
        cancel: CancellationToken,
    ) -> Result<Self, SourceError> {
        info!("Spawning {:?} event source", settings.kind);

        let builder = std::thread::Builder::new().name("js-source".into());
        let spawned = match settings.kind {
            SourceKind::Device => {
                let source = DeviceSource::open(&settings.device_path)?;
                builder.spawn(move || log_exit(source.run(&sender, &cancel)))
            }
            SourceKind::Gamepad => builder.spawn(move || {
                let result = GamepadCollector::create(settings)
                    .map(|collector| collector.initialize())
                    .and_then(|mut collector| collector.run_collection_loop(&sender, &cancel));
                log_exit(result)
            }),
        };

        let thread = spawned.map_err(|e| SourceError::InitializationError(e.to_string()))?;
        Ok(Self { thread })
    }

    /// Blocks until the source thread ends and returns why it ended
    pub fn join(self) -> Result<(), SourceError> {
        self.thread.join().map_err(|_| SourceError::ThreadPanicked)?
    }
}

fn log_exit(result: Result<(), SourceError>) -> Result<(), SourceError> {
    match &result {
        Ok(()) => info!("Event source finished"),
        Err(e) => error!("Event source terminated with error: {}", e),
    }
    result
}
