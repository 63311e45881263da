//! NerveDEX Stream Client
//!
//! Owns the connection lifecycle: dials the endpoint, wires the reader,
//! writer, heartbeat, dispatcher and watcher tasks of each connection
//! together, and re-establishes everything after a read failure.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──dial ok──► Connected
//!       ▲                          │                      │
//!       └──────── dial failed ─────┘        read failure  │
//!       └─────────────────────────────────────────────────┘
//!                                     (reconnect loop, replay)
//!
//! any state ──close()──► Closing ──► Closed
//! ```
//!
//! The subscription registry is the only state that survives a reconnect.
//! Every stored subscribe frame is replayed onto the new connection before
//! its reader starts, so no data frame of the new connection is dispatched
//! ahead of the replay.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, JsonCodec};
use super::connection::{self, shared_sink};
use super::dispatcher::Dispatcher;
use super::heartbeat::{Heartbeat, HeartbeatConfig};
use super::reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
use crate::application::ports::{Connector, TransportError};
use crate::domain::streaming::{BalanceChange, OrderBook, OrderChange};
use crate::domain::subscription::{
    ChannelKey, ChannelPayload, EventStream, RegistryError, SubscriptionRegistry,
};
use crate::infrastructure::metrics;

/// Default streaming host.
pub const DEFAULT_HOST: &str = "wss://api.nervedex.com";

/// Endpoint path appended to the host.
pub const WS_PATH: &str = "/ws";

/// Build the endpoint URL for `host`.
#[must_use]
pub fn ws_url(host: &str) -> String {
    format!("{}{WS_PATH}", host.trim_end_matches('/'))
}

// =============================================================================
// Configuration
// =============================================================================

/// Buffer sizes of subscriber sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkCapacities {
    /// Order book sinks.
    pub order_book: usize,
    /// Order change sinks.
    pub order_change: usize,
    /// Balance change sinks.
    pub balance_change: usize,
}

impl Default for SinkCapacities {
    fn default() -> Self {
        Self {
            order_book: 30,
            order_change: 10,
            balance_change: 10,
        }
    }
}

/// Stream client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Full endpoint URL.
    pub url: String,
    /// Keep-alive settings.
    pub heartbeat: HeartbeatConfig,
    /// Retry settings after a dropped connection.
    pub reconnect: ReconnectConfig,
    /// Raw frames buffered between reader and dispatcher.
    pub inbound_capacity: usize,
    /// Frames buffered between callers and writer.
    pub outbound_capacity: usize,
    /// Subscriber buffer sizes.
    pub sinks: SinkCapacities,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

impl ClientConfig {
    /// Configuration for `host` with default tuning.
    #[must_use]
    pub fn new(host: &str) -> Self {
        Self {
            url: ws_url(host),
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
            inbound_capacity: 100,
            outbound_capacity: 10,
            sinks: SinkCapacities::default(),
        }
    }

    /// Use an explicit endpoint URL.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the ping interval.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat = HeartbeatConfig::new(interval);
        self
    }

    /// Set the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the inbound queue capacity.
    #[must_use]
    pub const fn with_inbound_capacity(mut self, capacity: usize) -> Self {
        self.inbound_capacity = capacity;
        self
    }

    /// Set the outbound queue capacity.
    #[must_use]
    pub const fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity;
        self
    }

    /// Set subscriber buffer sizes.
    #[must_use]
    pub const fn with_sink_capacities(mut self, sinks: SinkCapacities) -> Self {
        self.sinks = sinks;
        self
    }

    /// Check the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] for an empty URL, a zero
    /// capacity, a zero ping interval, or a reconnect multiplier or jitter
    /// that is not a finite non-negative number.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.url.is_empty() {
            return Err(ClientError::InvalidConfig("url is empty".to_string()));
        }
        if self.heartbeat.ping_interval.is_zero() {
            return Err(ClientError::InvalidConfig(
                "heartbeat interval must be positive".to_string(),
            ));
        }
        let capacities = [
            ("inbound_capacity", self.inbound_capacity),
            ("outbound_capacity", self.outbound_capacity),
            ("order_book sink", self.sinks.order_book),
            ("order_change sink", self.sinks.order_change),
            ("balance_change sink", self.sinks.balance_change),
        ];
        if let Some((name, _)) = capacities.iter().find(|(_, value)| *value == 0) {
            return Err(ClientError::InvalidConfig(format!("{name} must be positive")));
        }
        let multiplier = self.reconnect.multiplier;
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ClientError::InvalidConfig(format!(
                "reconnect multiplier must be finite and positive, got {multiplier}"
            )));
        }
        let jitter = self.reconnect.jitter_factor;
        if !jitter.is_finite() || jitter < 0.0 {
            return Err(ClientError::InvalidConfig(format!(
                "reconnect jitter must be finite and non-negative, got {jitter}"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// State and Errors
// =============================================================================

/// Connection state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live connection.
    Disconnected,
    /// Dialing.
    Connecting,
    /// Tasks running on a live connection.
    Connected,
    /// `close()` in progress.
    Closing,
    /// Closed for good.
    Closed,
}

impl ConnectionState {
    /// State name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport failure (dial errors surface here).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Subscription bookkeeping failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Frame encoding failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// No live connection to send on.
    #[error("not connected")]
    NotConnected,

    /// `connect()` called while a connection is live or being dialed.
    #[error("already connected")]
    AlreadyConnected,

    /// The client has been closed.
    #[error("client is closed")]
    Closed,

    /// Rejected configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Handles of the live connection generation.
struct Link {
    outbound: mpsc::Sender<String>,
    done: CancellationToken,
}

// =============================================================================
// Client
// =============================================================================

/// Self-healing streaming client.
///
/// Construct with [`NdexStreamClient::new`], call
/// [`connect`](Self::connect), then subscribe. Dropping the last handle
/// stops every task; [`close`](Self::close) does so explicitly and also
/// ends every subscriber stream.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use ndex_stream::infrastructure::ndex::{ClientConfig, NdexStreamClient, WebSocketConnector};
///
/// async fn example() -> Result<(), Box<dyn std::error::Error>> {
///     let client = NdexStreamClient::new(
///         ClientConfig::default(),
///         Arc::new(WebSocketConnector::new()),
///     );
///     client.connect().await?;
///
///     let books = client.subscribe_order_book("NVT-USDT", 10).await?;
///     while let Some(book) = books.recv().await {
///         println!("{} bids={}", book.symbol, book.buy_list.len());
///     }
///     Ok(())
/// }
/// ```
pub struct NdexStreamClient {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    codec: JsonCodec,
    registry: Arc<SubscriptionRegistry>,
    state: RwLock<ConnectionState>,
    link: RwLock<Option<Link>>,
    shutdown: CancellationToken,
    self_ref: Weak<Self>,
}

impl fmt::Debug for NdexStreamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NdexStreamClient")
            .field("url", &self.config.url)
            .field("state", &self.state())
            .field("subscriptions", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Drop for NdexStreamClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl NdexStreamClient {
    /// Create a disconnected client.
    #[must_use]
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            config,
            connector,
            codec: JsonCodec::new(),
            registry: Arc::new(SubscriptionRegistry::new()),
            state: RwLock::new(ConnectionState::Disconnected),
            link: RwLock::new(None),
            shutdown: CancellationToken::new(),
            self_ref: self_ref.clone(),
        })
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether a connection is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Keys of all live subscriptions.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<ChannelKey> {
        self.registry.keys()
    }

    /// Client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Dial the endpoint and start the connection tasks.
    ///
    /// The first connect does not retry; a dial failure is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the dial fails,
    /// [`ClientError::AlreadyConnected`] if a connection is live or being
    /// dialed, and [`ClientError::Closed`] after [`close`](Self::close).
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.config.validate()?;
        self.claim_dial()?;

        let result = self.establish().await;
        if let Err(e) = &result {
            tracing::error!(url = %self.config.url, error = %e, "Initial connection failed");
            self.set_state_unless_closed(ConnectionState::Disconnected);
        }
        result
    }

    /// Re-dial until connected, waiting the policy delay between attempts.
    ///
    /// Returns once connected, when another caller brings the connection up
    /// first, or when the client is closed or dropped.
    pub async fn reconnect(&self) {
        reconnect_loop(self.self_ref.clone()).await;
    }

    /// Stop all connection tasks and end every subscriber stream.
    pub async fn close(&self) {
        {
            let mut state = self.state.write();
            if matches!(*state, ConnectionState::Closing | ConnectionState::Closed) {
                return;
            }
            *state = ConnectionState::Closing;
        }
        tracing::info!("Closing stream client");

        self.shutdown.cancel();
        if let Some(link) = self.link.write().take() {
            link.done.cancel();
        }

        for key in self.registry.keys() {
            if let Err(e) = self.registry.unregister(&key).await {
                tracing::debug!(channel = %key, error = %e, "Subscription already removed");
            }
        }
        metrics::set_subscriptions(0);
        metrics::set_connected(false);

        *self.state.write() = ConnectionState::Closed;
        tracing::info!("Stream client closed");
    }

    /// One dial plus task start-up. State must already be `Connecting`.
    async fn establish(&self) -> Result<(), ClientError> {
        tracing::info!(url = %self.config.url, "Connecting to NDEX stream");
        let (sink, source) = self.connector.connect(&self.config.url).await?;
        if self.shutdown.is_cancelled() {
            return Err(ClientError::Closed);
        }

        let done = self.shutdown.child_token();
        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.inbound_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity);
        let sink = shared_sink(sink);

        tokio::spawn(connection::run_writer(
            Arc::clone(&sink),
            outbound_rx,
            done.clone(),
        ));
        tokio::spawn(connection::run_watcher(sink, done.clone()));
        tokio::spawn(
            Heartbeat::new(
                self.config.heartbeat.clone(),
                outbound_tx.clone(),
                done.clone(),
            )
            .run(),
        );

        let previous = self.link.write().replace(Link {
            outbound: outbound_tx.clone(),
            done: done.clone(),
        });
        if let Some(previous) = previous {
            previous.done.cancel();
        }

        let replayed = match self.registry.replay_all(&outbound_tx).await {
            Ok(count) => count,
            Err(_) => {
                done.cancel();
                return Err(TransportError::Write(
                    "outbound queue closed during replay".to_string(),
                )
                .into());
            }
        };

        tokio::spawn(Dispatcher::new(Arc::clone(&self.registry)).run(inbound_rx, done.clone()));
        let client = self.self_ref.clone();
        tokio::spawn(connection::run_reader(
            source,
            inbound_tx,
            done.clone(),
            move |_| reconnect_loop(client),
        ));

        {
            let mut state = self.state.write();
            if matches!(*state, ConnectionState::Closing | ConnectionState::Closed)
                || self.shutdown.is_cancelled()
            {
                done.cancel();
                return Err(ClientError::Closed);
            }
            *state = ConnectionState::Connected;
        }
        metrics::set_connected(true);
        tracing::info!(replayed, "Connected to NDEX stream");
        Ok(())
    }

    /// Drop the live link after a failure and mark the client disconnected.
    fn mark_disconnected(&self) {
        if let Some(link) = self.link.write().take() {
            link.done.cancel();
        }
        self.set_state_unless_closed(ConnectionState::Disconnected);
        metrics::set_connected(false);
    }

    /// Move `Disconnected` to `Connecting` so exactly one caller dials.
    fn claim_dial(&self) -> Result<(), ClientError> {
        let mut state = self.state.write();
        match *state {
            ConnectionState::Closing | ConnectionState::Closed => Err(ClientError::Closed),
            ConnectionState::Connecting | ConnectionState::Connected => {
                Err(ClientError::AlreadyConnected)
            }
            ConnectionState::Disconnected => {
                *state = ConnectionState::Connecting;
                Ok(())
            }
        }
    }

    fn set_state_unless_closed(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if !matches!(*state, ConnectionState::Closing | ConnectionState::Closed) {
            *state = next;
        }
    }

    // =========================================================================
    // Outbound frames
    // =========================================================================

    /// Enqueue a frame on the live connection.
    async fn send_frame(&self, frame: String) -> Result<(), ClientError> {
        let outbound = self
            .link
            .read()
            .as_ref()
            .map(|link| link.outbound.clone())
            .ok_or(ClientError::NotConnected)?;
        outbound
            .send(frame)
            .await
            .map_err(|_| ClientError::NotConnected)
    }

    /// Send one keep-alive immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] without a live connection.
    pub async fn send_ping(&self) -> Result<(), ClientError> {
        let frame = self.codec.ping(Utc::now())?;
        self.send_frame(frame).await
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Stream order book snapshots of `symbol` at depth `top`.
    ///
    /// Subscribing again to the same symbol returns the existing stream.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] after [`close`](Self::close).
    pub async fn subscribe_order_book(
        &self,
        symbol: &str,
        top: u32,
    ) -> Result<EventStream<OrderBook>, ClientError> {
        let frame = self.codec.subscribe_order_book(symbol, top)?;
        self.subscribe(
            ChannelKey::order_book(symbol),
            frame,
            self.config.sinks.order_book,
        )
        .await
    }

    /// Stop the order book stream of `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Registry`] (not found) if not subscribed.
    pub async fn unsubscribe_order_book(&self, symbol: &str) -> Result<(), ClientError> {
        let frame = self.codec.unsubscribe_order_book(symbol)?;
        self.unsubscribe(&ChannelKey::order_book(symbol), frame).await
    }

    /// Stream order changes of account `address`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] after [`close`](Self::close).
    pub async fn subscribe_order_change(
        &self,
        address: &str,
    ) -> Result<EventStream<OrderChange>, ClientError> {
        let frame = self.codec.subscribe_order_change(address)?;
        self.subscribe(
            ChannelKey::order_change(address),
            frame,
            self.config.sinks.order_change,
        )
        .await
    }

    /// Stop the order change stream of `address`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Registry`] (not found) if not subscribed.
    pub async fn unsubscribe_order_change(&self, address: &str) -> Result<(), ClientError> {
        let frame = self.codec.unsubscribe_order_change(address)?;
        self.unsubscribe(&ChannelKey::order_change(address), frame)
            .await
    }

    /// Stream balance changes of account `address`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] after [`close`](Self::close).
    pub async fn subscribe_balance_change(
        &self,
        address: &str,
    ) -> Result<EventStream<BalanceChange>, ClientError> {
        let frame = self.codec.subscribe_balance_change(address)?;
        self.subscribe(
            ChannelKey::balance_change(address),
            frame,
            self.config.sinks.balance_change,
        )
        .await
    }

    /// Stop the balance change stream of `address`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Registry`] (not found) if not subscribed.
    pub async fn unsubscribe_balance_change(&self, address: &str) -> Result<(), ClientError> {
        let frame = self.codec.unsubscribe_balance_change(address)?;
        self.unsubscribe(&ChannelKey::balance_change(address), frame)
            .await
    }

    async fn subscribe<T: ChannelPayload>(
        &self,
        key: ChannelKey,
        frame: String,
        capacity: usize,
    ) -> Result<EventStream<T>, ClientError> {
        if self.shutdown.is_cancelled() {
            return Err(ClientError::Closed);
        }

        let registration = self
            .registry
            .register::<T>(key.clone(), frame.clone(), capacity)?;
        if !registration.created {
            tracing::debug!(channel = %key, "Reusing existing subscription");
            return Ok(registration.stream);
        }
        metrics::set_subscriptions(self.registry.len());

        match self.send_frame(frame).await {
            Ok(()) => tracing::debug!(channel = %key, "Subscribed"),
            Err(_) => tracing::debug!(
                channel = %key,
                "Not connected, subscription will be sent on reconnect"
            ),
        }
        Ok(registration.stream)
    }

    async fn unsubscribe(&self, key: &ChannelKey, frame: String) -> Result<(), ClientError> {
        self.registry.unregister(key).await?;
        metrics::set_subscriptions(self.registry.len());

        if let Err(e) = self.send_frame(frame).await {
            tracing::debug!(channel = %key, error = %e, "Unsubscribe frame not sent");
        } else {
            tracing::debug!(channel = %key, "Unsubscribed");
        }
        Ok(())
    }
}

/// Retry loop shared by [`NdexStreamClient::reconnect`] and the reader's
/// failure path. Holds only a weak handle between attempts so a dropped
/// client is not kept alive by its own reconnect loop.
fn reconnect_loop(client: Weak<NdexStreamClient>) -> BoxFuture<'static, ()> {
    async move {
        let Some(this) = client.upgrade() else {
            return;
        };
        if let Err(e) = this.config.validate() {
            tracing::error!(error = %e, "Reconnect skipped, invalid configuration");
            return;
        }
        this.mark_disconnected();
        let shutdown = this.shutdown.clone();
        let mut policy = ReconnectPolicy::new(this.config.reconnect.clone());
        drop(this);

        loop {
            let Some(this) = client.upgrade() else {
                return;
            };
            if shutdown.is_cancelled() {
                tracing::info!("Reconnect abandoned, client closed");
                return;
            }

            match this.claim_dial() {
                Ok(()) => {}
                Err(ClientError::AlreadyConnected) => {
                    tracing::info!(
                        state = %this.state(),
                        "Connection brought up elsewhere, reconnect loop stops"
                    );
                    return;
                }
                Err(_) => return,
            }

            metrics::record_reconnect();
            match this.establish().await {
                Ok(()) => {
                    tracing::info!(
                        attempts = policy.attempt_count() + 1,
                        "Reconnected to NDEX stream"
                    );
                    return;
                }
                Err(ClientError::Closed) => return,
                Err(e) => {
                    tracing::warn!(error = %e, "Reconnect attempt failed");
                    this.set_state_unless_closed(ConnectionState::Disconnected);
                }
            }
            drop(this);

            let Some(delay) = policy.next_delay() else {
                let error = ReconnectError::MaxAttemptsExceeded(policy.attempt_count());
                tracing::error!(error = %error, "Giving up on NDEX stream");
                if let Some(this) = client.upgrade() {
                    this.close().await;
                }
                return;
            };
            tracing::info!(
                attempt = policy.attempt_count(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting to NDEX stream"
            );

            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("Reconnect cancelled during delay");
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockConnector;

    fn failing_connector() -> Arc<MockConnector> {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .returning(|_| Err(TransportError::Dial("connection refused".to_string())));
        Arc::new(connector)
    }

    #[test]
    fn ws_url_appends_path() {
        assert_eq!(ws_url("wss://api.nervedex.com"), "wss://api.nervedex.com/ws");
        assert_eq!(ws_url("ws://localhost:8080/"), "ws://localhost:8080/ws");
    }

    #[test]
    fn default_config_values() {
        let config = ClientConfig::default();
        assert_eq!(config.url, "wss://api.nervedex.com/ws");
        assert_eq!(config.heartbeat.ping_interval, Duration::from_secs(10));
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs(5));
        assert_eq!(config.inbound_capacity, 100);
        assert_eq!(config.outbound_capacity, 10);
        assert_eq!(config.sinks, SinkCapacities::default());
        assert_eq!(config.sinks.order_book, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let config = ClientConfig::default().with_sink_capacities(SinkCapacities {
            order_change: 0,
            ..SinkCapacities::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ClientError::InvalidConfig(msg)) if msg.contains("order_change")
        ));
    }

    #[test]
    fn validate_rejects_zero_heartbeat() {
        let config = ClientConfig::default().with_heartbeat_interval(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ClientError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_non_finite_jitter() {
        for jitter in [f64::NAN, f64::INFINITY, -0.1] {
            let config = ClientConfig::default()
                .with_reconnect(ReconnectConfig::fixed(Duration::from_secs(1)).with_jitter(jitter));
            assert!(
                matches!(config.validate(), Err(ClientError::InvalidConfig(msg)) if msg.contains("jitter")),
                "jitter {jitter} should be rejected"
            );
        }
    }

    #[test]
    fn validate_rejects_bad_multiplier() {
        for multiplier in [f64::NAN, f64::INFINITY, 0.0, -2.0] {
            let config = ClientConfig::default().with_reconnect(ReconnectConfig::exponential(
                Duration::from_secs(1),
                Duration::from_secs(30),
                multiplier,
            ));
            assert!(
                matches!(config.validate(), Err(ClientError::InvalidConfig(msg)) if msg.contains("multiplier")),
                "multiplier {multiplier} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn initial_dial_failure_is_returned() {
        let client = NdexStreamClient::new(ClientConfig::default(), failing_connector());

        let err = client.connect().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Transport(TransportError::Dial(_))
        ));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn initial_dial_does_not_retry() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|_| Err(TransportError::Dial("connection refused".to_string())));
        let client = NdexStreamClient::new(ClientConfig::default(), Arc::new(connector));

        assert!(client.connect().await.is_err());
    }

    #[tokio::test]
    async fn subscribe_while_disconnected_is_kept_for_replay() {
        let client = NdexStreamClient::new(ClientConfig::default(), failing_connector());

        let stream = client.subscribe_order_change("TNVT1").await.unwrap();

        assert_eq!(stream.key(), &ChannelKey::order_change("TNVT1"));
        assert_eq!(client.subscriptions(), vec![ChannelKey::order_change("TNVT1")]);
    }

    #[tokio::test]
    async fn unsubscribe_unknown_is_not_found() {
        let client = NdexStreamClient::new(ClientConfig::default(), failing_connector());

        let err = client.unsubscribe_balance_change("TNVT1").await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Registry(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn send_ping_requires_connection() {
        let client = NdexStreamClient::new(ClientConfig::default(), failing_connector());
        assert!(matches!(
            client.send_ping().await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn close_is_terminal() {
        let client = NdexStreamClient::new(ClientConfig::default(), failing_connector());
        let stream = client.subscribe_order_book("BTCUSDT", 10).await.unwrap();

        client.close().await;

        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(client.subscriptions().is_empty());
        assert!(stream.recv().await.is_none());
        assert!(matches!(client.connect().await, Err(ClientError::Closed)));
        assert!(matches!(
            client.subscribe_order_book("BTCUSDT", 10).await,
            Err(ClientError::Closed)
        ));
    }

    #[tokio::test]
    async fn reconnect_wait_is_cancellable() {
        let client = NdexStreamClient::new(
            ClientConfig::default().with_reconnect(ReconnectConfig::fixed(Duration::from_secs(60))),
            failing_connector(),
        );

        let handle = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.reconnect().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        client.close().await;
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("reconnect loop should stop on close")
            .unwrap();
    }

    #[tokio::test]
    async fn reconnect_gives_up_after_max_attempts() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(2)
            .returning(|_| Err(TransportError::Dial("connection refused".to_string())));
        let client = NdexStreamClient::new(
            ClientConfig::default().with_reconnect(
                ReconnectConfig::fixed(Duration::from_millis(5)).with_max_attempts(2),
            ),
            Arc::new(connector),
        );

        tokio::time::timeout(Duration::from_millis(500), client.reconnect())
            .await
            .expect("bounded reconnect should finish");
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn reconnect_with_invalid_config_does_not_dial() {
        let mut connector = MockConnector::new();
        connector.expect_connect().never();
        let client = NdexStreamClient::new(
            ClientConfig::default().with_reconnect(
                ReconnectConfig::fixed(Duration::from_millis(5)).with_jitter(f64::NAN),
            ),
            Arc::new(connector),
        );

        tokio::time::timeout(Duration::from_millis(200), client.reconnect())
            .await
            .expect("invalid config should stop the loop at once");
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
