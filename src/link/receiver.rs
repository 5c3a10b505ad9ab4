use super::{stats_timer, DatagramChannel, FlowStats, LinkError};
use crate::config::MAX_LINE_LEN;
use crate::joystick::Snapshot;
use crate::wire::DecodeError;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// One byte over the limit so an oversized datagram shows up as too long
// instead of being cut to fit.
const RECV_BUF_LEN: usize = MAX_LINE_LEN + 1;

/// Pause after a failed receive before trying again
pub const RECV_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Consecutive failed receives after which the receiver gives up
pub const MAX_RECV_FAILURES: u32 = 10;

/// Receiving side of a link: owns the remote mirror and publishes every
/// accepted update on a watch channel.
#[derive(Debug)]
pub struct Receiver<C> {
    channel: C,
    snapshot: Snapshot,
    publisher: watch::Sender<Snapshot>,
    stats: FlowStats,
}

impl<C: DatagramChannel> Receiver<C> {
    pub fn new(channel: C) -> Self {
        let (publisher, _) = watch::channel(Snapshot::default());
        Self {
            channel,
            snapshot: Snapshot::default(),
            publisher,
            stats: FlowStats::new("Receiver"),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.publisher.subscribe()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn stats(&self) -> &FlowStats {
        &self.stats
    }

    /// Applies one datagram. On error the held snapshot is untouched and nothing
    /// is published.
    pub fn handle_packet(&mut self, packet: &[u8]) -> Result<(), DecodeError> {
        self.snapshot.apply_packet(packet)?;

        let [lsx, lsy, rsx, rsy, cross_x, cross_y] = self.snapshot.axes.normalized();
        debug!(
            "Updated state @{}: left ({:.3}, {:.3}) right ({:.3}, {:.3}) cross ({:.3}, {:.3}) pressed {:?}",
            self.snapshot.timestamp,
            lsx,
            lsy,
            rsx,
            rsy,
            cross_x,
            cross_y,
            self.snapshot.pressed().collect::<Vec<_>>()
        );

        self.publisher.send_replace(self.snapshot.clone());
        Ok(())
    }

    /// Processes every datagram already queued without waiting for more.
    /// Returns how many were processed.
    pub fn drain_pending(&mut self) -> std::io::Result<usize> {
        let mut buf = [0u8; RECV_BUF_LEN];
        let mut processed = 0;
        while let Some(len) = self.channel.try_recv(&mut buf)? {
            self.on_datagram(&buf[..len]);
            processed += 1;
        }
        Ok(processed)
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), LinkError> {
        info!("Starting receiver");
        let mut stats_timer = stats_timer();
        let mut buf = vec![0u8; RECV_BUF_LEN];
        let mut failures = 0;

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Receiver shutting down");
                    self.stats.log();
                    return Ok(());
                }
                _ = stats_timer.tick() => {
                    self.stats.log();
                    continue;
                }
                received = self.channel.recv(&mut buf) => received,
            };

            match received {
                Ok(len) => {
                    failures = 0;
                    self.on_datagram(&buf[..len]);
                }
                Err(e) => {
                    failures += 1;
                    if failures >= MAX_RECV_FAILURES {
                        error!("Receiver stopping after {} failed receives: {}", failures, e);
                        self.stats.log();
                        return Err(LinkError::Io(e));
                    }
                    warn!("Receive failed ({}/{}): {}", failures, MAX_RECV_FAILURES, e);
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(RECV_RETRY_DELAY) => {}
                    }
                }
            }
        }
    }

    fn on_datagram(&mut self, packet: &[u8]) {
        match self.handle_packet(packet) {
            Ok(()) => self.stats.accepted += 1,
            Err(e) => {
                self.stats.discarded += 1;
                warn!("Discarding packet: {}", e);
            }
        }
    }
}
