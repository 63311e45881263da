//! Connection I/O Pump
//!
//! The per-connection tasks that move frames between the transport and the
//! bounded queues:
//!
//! - **Reader**: transport → inbound queue. A read failure fires the
//!   connection's done signal and hands control to the reconnect path.
//! - **Writer**: outbound queue → transport. A write failure ends the task
//!   quietly; only the reader detects a dead connection.
//! - **Watcher**: waits for done, then closes the transport.
//!
//! All three stop when the done token is cancelled.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FrameSink, FrameSource, TransportError};

/// Write half shared between the writer and the watcher.
pub type SharedSink = Arc<Mutex<Box<dyn FrameSink>>>;

/// Wrap a write half for sharing.
#[must_use]
pub fn shared_sink(sink: Box<dyn FrameSink>) -> SharedSink {
    Arc::new(Mutex::new(sink))
}

/// Read frames until the transport fails or `done` fires.
///
/// Pushing onto a full inbound queue stalls this loop, and with it the
/// socket, until the dispatcher catches up.
pub async fn run_reader<F>(
    mut source: Box<dyn FrameSource>,
    inbound: mpsc::Sender<String>,
    done: CancellationToken,
    on_failure: F,
) where
    F: FnOnce(TransportError) -> BoxFuture<'static, ()> + Send,
{
    let error = loop {
        let frame = tokio::select! {
            biased;
            () = done.cancelled() => {
                tracing::debug!("Reader stopped");
                return;
            }
            frame = source.next_frame() => frame,
        };

        match frame {
            Ok(text) => {
                let pushed = tokio::select! {
                    biased;
                    () = done.cancelled() => return,
                    pushed = inbound.send(text) => pushed,
                };
                if pushed.is_err() {
                    tracing::debug!("Inbound queue closed, stopping reader");
                    return;
                }
            }
            Err(e) => break e,
        }
    };

    // The watcher closing the socket on purpose also surfaces here.
    if done.is_cancelled() {
        tracing::debug!(error = %error, "Read ended after shutdown");
        return;
    }

    tracing::warn!(error = %error, "Stream read failed");
    done.cancel();
    on_failure(error).await;
}

/// Send queued frames until the queue closes, a write fails, or `done` fires.
pub async fn run_writer(
    sink: SharedSink,
    mut outbound: mpsc::Receiver<String>,
    done: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            () = done.cancelled() => break,
            frame = outbound.recv() => frame,
        };
        let Some(text) = frame else {
            break;
        };

        // A send stuck on a dead peer must not keep the sink locked
        // away from the watcher.
        let sent = {
            let mut sink = sink.lock().await;
            tokio::select! {
                biased;
                () = done.cancelled() => break,
                sent = sink.send(text) => sent,
            }
        };
        if let Err(e) = sent {
            tracing::debug!(error = %e, "Stream write failed, stopping writer");
            return;
        }
    }
    tracing::debug!("Writer stopped");
}

/// Close the transport once `done` fires.
pub async fn run_watcher(sink: SharedSink, done: CancellationToken) {
    done.cancelled().await;
    if let Err(e) = sink.lock().await.close().await {
        tracing::debug!(error = %e, "Transport close failed");
    }
    tracing::info!("Stream connection closed");
}
