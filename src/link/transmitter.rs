use super::{stats_timer, DatagramChannel, FlowStats, LinkError};
use crate::joystick::{JsEvent, Snapshot};
use crate::wire::encode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sending side of a link: owns the local mirror and the outgoing channel.
///
/// Events replayed by the device at open time only prime the mirror. Once the
/// first live event has been merged, every event is followed by one packet.
#[derive(Debug)]
pub struct Transmitter<C> {
    channel: C,
    snapshot: Snapshot,
    stats: FlowStats,
}

impl<C: DatagramChannel> Transmitter<C> {
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            snapshot: Snapshot::default(),
            stats: FlowStats::new("Transmitter"),
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn stats(&self) -> &FlowStats {
        &self.stats
    }

    /// Merges one event and, once initialized, sends the encoded snapshot.
    /// Returns whether a packet went out. Only merge errors are returned; a failed
    /// send is counted and logged.
    pub async fn handle_event(&mut self, event: JsEvent) -> Result<bool, LinkError> {
        let was_initialized = self.snapshot.initialized;
        self.snapshot.merge(event)?;

        if !self.snapshot.initialized {
            debug!("Priming with replayed event {:?}", event);
            return Ok(false);
        }
        if !was_initialized {
            info!("Joystick state initialized, streaming packets");
        }

        let packet = encode(&self.snapshot);
        match self.channel.send(packet.as_bytes()).await {
            Ok(_) => {
                self.stats.sent += 1;
                debug!("Sent: '{}'", packet);
                Ok(true)
            }
            Err(e) => {
                self.stats.send_failures += 1;
                warn!("Failed to send packet: {}", e);
                Ok(false)
            }
        }
    }

    /// Consumes events until cancelled, the source goes away, or a fatal event
    /// arrives. A fatal event cancels `cancel` before returning.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<JsEvent>,
        cancel: CancellationToken,
    ) -> Result<(), LinkError> {
        info!("Starting transmitter");
        let mut stats_timer = stats_timer();

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Transmitter shutting down");
                    self.stats.log();
                    return Ok(());
                }
                _ = stats_timer.tick() => {
                    self.stats.log();
                    continue;
                }
                event = events.recv() => event,
            };

            let Some(event) = event else {
                warn!("Event source closed, stopping transmitter");
                return Err(LinkError::SourceClosed);
            };

            if let Err(e) = self.handle_event(event).await {
                error!("Transmitter stopping: {}", e);
                cancel.cancel();
                return Err(e);
            }
        }
    }
}
