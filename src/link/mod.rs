//! # Link
//!
//! The two flows that move snapshots across the network, plus the loopback mode
//! that runs both in one process.
//!
//! ```text
//! sender:    JsEvent ─► Transmitter ─► merge ─► encode ─► UdpChannel ─┐
//!                                                                     │ UDP
//! receiver:  watch::Receiver<Snapshot> ◄─ Receiver ◄─ decode ◄────────┘
//! ```
//!
//! Each flow owns its own [`Snapshot`](crate::joystick::Snapshot). Nothing mutable is
//! shared between them, so no locking is involved. A fatal merge error stops the
//! transmitter and cancels the shared [`CancellationToken`] so the rest of the
//! process winds down with it; decode errors are logged and the packet is dropped.

pub mod receiver;
pub mod transmitter;
pub mod transport;

use crate::joystick::{JsEvent, MergeError};
use chrono::{DateTime, Local};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use receiver::Receiver;
pub use transmitter::Transmitter;
pub use transport::{DatagramChannel, UdpChannel};

/// Capacity of the event channel between a source and the transmitter
pub const EVENT_BUFFER: usize = 1000;

const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Fatal joystick event: {0}")]
    Fatal(#[from] MergeError),

    #[error("Event source closed")]
    SourceClosed,

    /// The socket kept failing; see [`receiver::MAX_RECV_FAILURES`]
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Running packet counters of one flow
#[derive(Debug, Clone)]
pub struct FlowStats {
    name: &'static str,
    pub sent: u64,
    pub send_failures: u64,
    pub accepted: u64,
    pub discarded: u64,
    started: DateTime<Local>,
}

impl FlowStats {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            sent: 0,
            send_failures: 0,
            accepted: 0,
            discarded: 0,
            started: Local::now(),
        }
    }

    pub fn log(&self) {
        let seconds = (Local::now() - self.started).num_milliseconds().max(1) as f64 / 1000.0;
        info!(
            "{} stats: {} sent ({} failed), {} accepted, {} discarded in {:.0}s (avg {:.2} packets/sec)",
            self.name,
            self.sent,
            self.send_failures,
            self.accepted,
            self.discarded,
            seconds,
            (self.sent + self.accepted) as f64 / seconds
        );
    }
}

pub(crate) fn stats_timer() -> Interval {
    interval_at(Instant::now() + STATS_INTERVAL, STATS_INTERVAL)
}

/// Sender and receiver in one task: after every event the transmitter handles,
/// whatever has arrived on the receiver's socket is drained without blocking.
pub async fn run_loopback<C, D>(
    mut transmitter: Transmitter<C>,
    mut receiver: Receiver<D>,
    mut events: mpsc::Receiver<JsEvent>,
    cancel: CancellationToken,
) -> Result<(), LinkError>
where
    C: DatagramChannel,
    D: DatagramChannel,
{
    info!("Starting loopback link");
    let mut stats_timer = stats_timer();

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Loopback link shutting down");
                transmitter.stats().log();
                receiver.stats().log();
                return Ok(());
            }
            _ = stats_timer.tick() => {
                transmitter.stats().log();
                receiver.stats().log();
                continue;
            }
            event = events.recv() => event,
        };

        let Some(event) = event else {
            warn!("Event source closed, stopping loopback link");
            return Err(LinkError::SourceClosed);
        };

        if let Err(e) = transmitter.handle_event(event).await {
            error!("Loopback link stopping: {}", e);
            cancel.cancel();
            return Err(e);
        }

        if let Err(e) = receiver.drain_pending() {
            warn!("Loopback receive failed: {}", e);
        }
    }
}
