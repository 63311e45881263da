//! Stream Client Settings
//!
//! Configuration for the stream client binary, loaded from environment
//! variables. Numeric values that fail to parse fall back to defaults.

use std::time::Duration;

use crate::infrastructure::ndex::{
    ClientConfig, DEFAULT_HOST, ReconnectConfig, SinkCapacities,
};

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Streaming host, without the `/ws` path.
    pub host: String,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier (1.0 = fixed interval).
    pub reconnect_delay_multiplier: f64,
    /// Jitter as a fraction of the reconnection delay.
    pub reconnect_jitter: f64,
    /// Failed reconnection dials before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            heartbeat_interval: Duration::from_secs(10),
            reconnect_delay_initial: Duration::from_secs(5),
            reconnect_delay_max: Duration::from_secs(60),
            reconnect_delay_multiplier: 1.0,
            reconnect_jitter: 0.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

/// Queue and sink buffer settings.
#[derive(Debug, Clone)]
pub struct BufferSettings {
    /// Raw frames buffered between reader and dispatcher.
    pub inbound_capacity: usize,
    /// Frames buffered for the writer.
    pub outbound_capacity: usize,
    /// Order book subscriber buffer.
    pub order_book_capacity: usize,
    /// Order change subscriber buffer.
    pub order_change_capacity: usize,
    /// Balance change subscriber buffer.
    pub balance_change_capacity: usize,
}

impl Default for BufferSettings {
    fn default() -> Self {
        let sinks = SinkCapacities::default();
        Self {
            inbound_capacity: 100,
            outbound_capacity: 10,
            order_book_capacity: sinks.order_book,
            order_change_capacity: sinks.order_change,
            balance_change_capacity: sinks.balance_change,
        }
    }
}

/// Channels the binary subscribes to at startup.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSettings {
    /// Order book symbols.
    pub symbols: Vec<String>,
    /// Order book depth.
    pub order_book_depth: u32,
    /// Account addresses for order and balance changes.
    pub addresses: Vec<String>,
}

/// Complete stream client settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// WebSocket connection settings.
    pub connection: ConnectionSettings,
    /// Queue and sink buffer settings.
    pub buffers: BufferSettings,
    /// Startup subscriptions.
    pub subscriptions: SubscriptionSettings,
    /// Prometheus metrics port (0 = no HTTP listener).
    pub metrics_port: u16,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings::default(),
            buffers: BufferSettings::default(),
            subscriptions: SubscriptionSettings {
                order_book_depth: DEFAULT_ORDER_BOOK_DEPTH,
                ..SubscriptionSettings::default()
            },
            metrics_port: 9090,
        }
    }
}

const DEFAULT_ORDER_BOOK_DEPTH: u32 = 10;

impl StreamSettings {
    /// Create settings from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `NDEX_WS_HOST` is not a `ws://` or `wss://` URL or
    /// `NDEX_ORDER_BOOK_DEPTH` is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create settings from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`StreamSettings::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("NDEX_WS_HOST")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.connection.host);
        if !(host.starts_with("ws://") || host.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: "NDEX_WS_HOST".to_string(),
                reason: format!("expected a ws:// or wss:// URL, got {host:?}"),
            });
        }

        let connection = ConnectionSettings {
            host,
            heartbeat_interval: parse_env_duration_secs(
                &lookup,
                "NDEX_HEARTBEAT_INTERVAL_SECS",
                defaults.connection.heartbeat_interval,
            ),
            reconnect_delay_initial: parse_env_duration_millis(
                &lookup,
                "NDEX_RECONNECT_DELAY_INITIAL_MS",
                defaults.connection.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                &lookup,
                "NDEX_RECONNECT_DELAY_MAX_SECS",
                defaults.connection.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_env_f64(
                &lookup,
                "NDEX_RECONNECT_DELAY_MULTIPLIER",
                defaults.connection.reconnect_delay_multiplier,
            ),
            reconnect_jitter: parse_env_f64(
                &lookup,
                "NDEX_RECONNECT_JITTER",
                defaults.connection.reconnect_jitter,
            ),
            max_reconnect_attempts: parse_env_u32(
                &lookup,
                "NDEX_MAX_RECONNECT_ATTEMPTS",
                defaults.connection.max_reconnect_attempts,
            ),
        };

        let buffers = BufferSettings {
            inbound_capacity: parse_env_usize(
                &lookup,
                "NDEX_INBOUND_CAPACITY",
                defaults.buffers.inbound_capacity,
            ),
            outbound_capacity: parse_env_usize(
                &lookup,
                "NDEX_OUTBOUND_CAPACITY",
                defaults.buffers.outbound_capacity,
            ),
            order_book_capacity: parse_env_usize(
                &lookup,
                "NDEX_ORDER_BOOK_CAPACITY",
                defaults.buffers.order_book_capacity,
            ),
            order_change_capacity: parse_env_usize(
                &lookup,
                "NDEX_ORDER_CHANGE_CAPACITY",
                defaults.buffers.order_change_capacity,
            ),
            balance_change_capacity: parse_env_usize(
                &lookup,
                "NDEX_BALANCE_CHANGE_CAPACITY",
                defaults.buffers.balance_change_capacity,
            ),
        };

        let order_book_depth = parse_env_u32(
            &lookup,
            "NDEX_ORDER_BOOK_DEPTH",
            defaults.subscriptions.order_book_depth,
        );
        if order_book_depth == 0 {
            return Err(ConfigError::InvalidValue {
                key: "NDEX_ORDER_BOOK_DEPTH".to_string(),
                reason: "depth must be positive".to_string(),
            });
        }

        let subscriptions = SubscriptionSettings {
            symbols: parse_env_list(&lookup, "NDEX_SYMBOLS"),
            order_book_depth,
            addresses: parse_env_list(&lookup, "NDEX_ADDRESSES"),
        };

        Ok(Self {
            connection,
            buffers,
            subscriptions,
            metrics_port: parse_env_u16(&lookup, "NDEX_METRICS_PORT", defaults.metrics_port),
        })
    }

    /// Build the client configuration.
    #[must_use]
    pub fn to_client_config(&self) -> ClientConfig {
        let connection = &self.connection;
        let reconnect = ReconnectConfig::exponential(
            connection.reconnect_delay_initial,
            connection.reconnect_delay_max.max(connection.reconnect_delay_initial),
            connection.reconnect_delay_multiplier,
        )
        .with_jitter(connection.reconnect_jitter)
        .with_max_attempts(connection.max_reconnect_attempts);

        ClientConfig::new(&connection.host)
            .with_heartbeat_interval(connection.heartbeat_interval)
            .with_reconnect(reconnect)
            .with_inbound_capacity(self.buffers.inbound_capacity)
            .with_outbound_capacity(self.buffers.outbound_capacity)
            .with_sink_capacities(SinkCapacities {
                order_book: self.buffers.order_book_capacity,
                order_change: self.buffers.order_change_capacity,
                balance_change: self.buffers.balance_change_capacity,
            })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has an unusable value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn parse_env<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_u16<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u16) -> u16 {
    parse_env(lookup, key, default)
}

fn parse_env_u32<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u32) -> u32 {
    parse_env(lookup, key, default)
}

fn parse_env_usize<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: usize) -> usize {
    parse_env(lookup, key, default)
}

fn parse_env_f64<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: f64) -> f64 {
    parse_env(lookup, key, default)
}

fn parse_env_duration_secs<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

/// Comma-separated list; blank entries are skipped.
fn parse_env_list<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Vec<String> {
    lookup(key)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}
