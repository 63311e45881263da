//! Prometheus Metrics Module
//!
//! Exposes stream client metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Frames**: Inbound frames received and dropped by reason
//! - **Deliveries**: Events handed to subscribers by channel kind
//! - **Connection**: Connection state and reconnect attempts
//! - **Subscriptions**: Active subscription count
//!
//! Recording without an installed recorder is a no-op, so the client can be
//! embedded without calling [`init_metrics`].

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::subscription::ChannelKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Errors installing the metrics recorder.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The exporter could not be built.
    #[error("failed to build Prometheus exporter: {0}")]
    Build(#[from] BuildError),

    /// Another global recorder is already installed.
    #[error("a metrics recorder is already installed")]
    AlreadyInstalled,
}

/// Initialize the Prometheus metrics recorder.
///
/// With a non-zero `port` the exporter also serves `/metrics` on
/// `0.0.0.0:<port>`; this spawns a task and must run inside a Tokio
/// runtime. Later calls return the handle of the first.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or another recorder
/// is already installed.
pub fn init_metrics(port: u16) -> Result<PrometheusHandle, MetricsError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = if port == 0 {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder).map_err(|_| MetricsError::AlreadyInstalled)?;
        handle
    } else {
        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
            .build()?;
        let handle = recorder.handle();
        metrics::set_global_recorder(recorder).map_err(|_| MetricsError::AlreadyInstalled)?;

        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(error = ?e, "Prometheus exporter stopped");
            }
        });
        tracing::info!(port, "Prometheus exporter listening");
        handle
    };

    register_metrics();
    let _ = PROMETHEUS_HANDLE.set(handle.clone());
    Ok(handle)
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "ndex_stream_frames_received_total",
        "Total frames read from the NDEX stream"
    );
    describe_counter!(
        "ndex_stream_frames_dropped_total",
        "Total frames not delivered to any subscriber, by reason"
    );
    describe_counter!(
        "ndex_stream_events_delivered_total",
        "Total events delivered to subscribers, by channel"
    );
    describe_counter!(
        "ndex_stream_reconnects_total",
        "Total reconnection attempts"
    );
    describe_gauge!(
        "ndex_stream_connected",
        "1 while a connection is live, 0 otherwise"
    );
    describe_gauge!(
        "ndex_stream_subscriptions",
        "Number of active subscriptions"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a frame read from the stream.
pub fn record_frame_received() {
    counter!("ndex_stream_frames_received_total").increment(1);
}

/// Record a frame that reached no subscriber.
pub fn record_frame_dropped(reason: &'static str) {
    counter!("ndex_stream_frames_dropped_total", "reason" => reason).increment(1);
}

/// Record an event handed to a subscriber.
pub fn record_delivery(kind: ChannelKind) {
    counter!("ndex_stream_events_delivered_total", "channel" => kind.as_str()).increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect() {
    counter!("ndex_stream_reconnects_total").increment(1);
}

/// Update the connection state gauge.
pub fn set_connected(connected: bool) {
    gauge!("ndex_stream_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Update the active subscription count.
pub fn set_subscriptions(count: usize) {
    gauge!("ndex_stream_subscriptions").set(u32::try_from(count).map_or(f64::from(u32::MAX), f64::from));
}

// =============================================================================
// Tests
// =============================================================================
