//! Heartbeat Task
//!
//! Keeps the stream connection alive with periodic `{"ping":<ms>}` frames.
//! One ping goes out as soon as the task starts, then one per interval,
//! until the connection's done signal fires.
//!
//! Pings are fire-and-forget. Pong replies are decoded by the dispatcher
//! and discarded; a missing pong never tears the connection down, only a
//! failed read does.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::codec::JsonCodec;

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between ping frames.
    pub ping_interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
        }
    }
}

impl HeartbeatConfig {
    /// Create a configuration with a custom interval.
    #[must_use]
    pub const fn new(ping_interval: Duration) -> Self {
        Self { ping_interval }
    }
}

/// Periodic ping producer for one connection.
///
/// # Example
///
/// ```rust,no_run
/// use ndex_stream::infrastructure::ndex::heartbeat::{Heartbeat, HeartbeatConfig};
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// async fn example() {
///     let (outbound_tx, mut outbound_rx) = mpsc::channel(10);
///     let done = CancellationToken::new();
///
///     tokio::spawn(Heartbeat::new(HeartbeatConfig::default(), outbound_tx, done.clone()).run());
///
///     // First ping is immediate
///     let ping = outbound_rx.recv().await;
///     assert!(ping.is_some());
///
///     done.cancel();
/// }
/// ```
pub struct Heartbeat {
    config: HeartbeatConfig,
    codec: JsonCodec,
    outbound: mpsc::Sender<String>,
    done: CancellationToken,
}

impl Heartbeat {
    /// Create a heartbeat feeding `outbound` until `done` fires.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        outbound: mpsc::Sender<String>,
        done: CancellationToken,
    ) -> Self {
        Self {
            config,
            codec: JsonCodec::new(),
            outbound,
            done,
        }
    }

    /// Run the ping loop.
    pub async fn run(self) {
        // The first tick completes immediately.
        let mut interval = tokio::time::interval(self.config.ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.done.cancelled() => {
                    tracing::debug!("Heartbeat stopped");
                    break;
                }
                _ = interval.tick() => {
                    if !self.send_ping().await {
                        break;
                    }
                }
            }
        }
    }

    /// Enqueue one ping. Returns `false` when the outbound queue is gone.
    async fn send_ping(&self) -> bool {
        let frame = match self.codec.ping(Utc::now()) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode ping");
                return true;
            }
        };

        if self.outbound.send(frame).await.is_err() {
            tracing::debug!("Outbound queue closed, stopping heartbeat");
            return false;
        }
        tracing::trace!("Ping enqueued");
        true
    }
}
