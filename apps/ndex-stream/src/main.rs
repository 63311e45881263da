//! NDEX Stream Binary
//!
//! Connects to the NerveDEX stream, subscribes to the configured channels
//! and logs every event until shut down.
//!
//! # Usage
//!
//! ```bash
//! NDEX_SYMBOLS=BTCUSDT NDEX_ADDRESSES=TNVT1... cargo run --bin ndex-stream
//! ```
//!
//! # Environment Variables
//!
//! - `NDEX_WS_HOST`: Streaming host (default: wss://api.nervedex.com)
//! - `NDEX_SYMBOLS`: Comma-separated order book symbols
//! - `NDEX_ORDER_BOOK_DEPTH`: Order book depth (default: 10)
//! - `NDEX_ADDRESSES`: Comma-separated account addresses
//! - `NDEX_HEARTBEAT_INTERVAL_SECS`: Ping interval (default: 10)
//! - `NDEX_RECONNECT_DELAY_INITIAL_MS`: Reconnect wait (default: 5000)
//! - `NDEX_METRICS_PORT`: Prometheus metrics port, 0 disables (default: 9090)
//! - `OTEL_ENABLED`: Export traces over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Context;
use ndex_stream::infrastructure::telemetry;
use ndex_stream::{
    ChannelKey, EventStream, NdexStreamClient, StreamSettings, WebSocketConnector, init_metrics,
};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting NDEX stream client");

    let settings = StreamSettings::from_env().context("invalid NDEX settings")?;
    log_settings(&settings);

    if let Err(e) = init_metrics(settings.metrics_port) {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    let client = NdexStreamClient::new(
        settings.to_client_config(),
        Arc::new(WebSocketConnector::new()),
    );
    client.connect().await.context("initial connection failed")?;

    let subscriptions = &settings.subscriptions;
    for symbol in &subscriptions.symbols {
        let stream = client
            .subscribe_order_book(symbol, subscriptions.order_book_depth)
            .await?;
        tokio::spawn(consume(stream));
    }
    for address in &subscriptions.addresses {
        tokio::spawn(consume(client.subscribe_order_change(address).await?));
        tokio::spawn(consume(client.subscribe_balance_change(address).await?));
    }

    tracing::info!(
        subscriptions = client.subscriptions().len(),
        "NDEX stream client ready"
    );

    await_shutdown().await;

    client.close().await;
    tracing::info!("NDEX stream client stopped");
    Ok(())
}

/// Log every event of one stream until it ends.
async fn consume<T: Debug + Send + 'static>(stream: EventStream<T>) {
    let key: ChannelKey = stream.key().clone();
    while let Some(event) = stream.recv().await {
        tracing::info!(channel = %key, ?event, "Event");
    }
    tracing::debug!(channel = %key, "Stream ended");
}

/// Log the parsed settings.
fn log_settings(settings: &StreamSettings) {
    tracing::info!(
        host = %settings.connection.host,
        symbols = settings.subscriptions.symbols.len(),
        addresses = settings.subscriptions.addresses.len(),
        metrics_port = settings.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        heartbeat_secs = settings.connection.heartbeat_interval.as_secs(),
        reconnect_initial_ms =
            u64::try_from(settings.connection.reconnect_delay_initial.as_millis()).unwrap_or(u64::MAX),
        max_reconnect_attempts = settings.connection.max_reconnect_attempts,
        "Connection settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
