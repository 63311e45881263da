#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::option_if_let_else,
        clippy::items_after_statements
    )
)]

//! NDEX Stream - Self-healing NerveDEX event client
//!
//! Keeps one WebSocket connection to the NerveDEX streaming endpoint and
//! multiplexes order book, order change and balance change events to
//! independent subscribers. After a dropped connection it reconnects and
//! replays every live subscription.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Payload types and subscription state
//!   - `streaming`: Order books, orders, balance changes
//!   - `subscription`: Channel keys, typed sinks, subscription registry
//!
//! - **Application**: Port definitions
//!   - `ports`: Transport interfaces (connector, frame sink, frame source)
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `ndex`: Codec, heartbeat, dispatcher, connection tasks, client
//!   - `config`: Environment-driven settings
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Tracing subscriber and OTLP export
//!
//! # Data Flow
//!
//! ```text
//!                ┌──────────┐  inbound  ┌────────────┐     ┌─► order book streams
//! NDEX WS ──────►│  Reader  │──────────►│ Dispatcher │─────┼─► order change streams
//!    ▲           └──────────┘           └────────────┘     └─► balance change streams
//!    │           ┌──────────┐ outbound  ┌────────────┐
//!    └───────────│  Writer  │◄──────────│ Heartbeat, │
//!                └──────────┘           │ subscribe  │
//!                                       └────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Payload types and subscription state.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{
    BalanceChange, Order, OrderBook, OrderChange, OrderChangeKind, OrderSide, OrderStatus,
    PriceLevel,
};
pub use domain::subscription::{ChannelKey, ChannelKind, EventStream, RegistryError};

// Transport port
pub use application::ports::{Connector, FrameSink, FrameSource, TransportError};

// Stream client
pub use infrastructure::ndex::{
    ClientConfig, ClientError, ConnectionState, NdexStreamClient, ReconnectConfig,
    SinkCapacities, WebSocketConnector,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, StreamSettings};

// Metrics
pub use infrastructure::metrics::{MetricsError, init_metrics};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
