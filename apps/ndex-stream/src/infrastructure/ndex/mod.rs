//! NerveDEX Streaming Adapters
//!
//! Everything between the raw WebSocket and the typed subscriber streams:
//!
//! - **messages / codec**: JSON wire frames (pings, channel requests, envelopes)
//! - **heartbeat**: Periodic keep-alive pings
//! - **reconnect**: Wait policy between dial attempts
//! - **dispatcher**: Envelope classification and routing to subscriber sinks
//! - **connection**: Reader, writer and watcher tasks of one connection
//! - **transport**: `tokio-tungstenite` implementation of the transport port
//! - **client**: Connection lifecycle, subscriptions and replay

pub mod client;
pub mod codec;
pub mod connection;
pub mod dispatcher;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod transport;

pub use client::{
    ClientConfig, ClientError, ConnectionState, DEFAULT_HOST, NdexStreamClient, SinkCapacities,
    ws_url,
};
pub use codec::{CodecError, InboundFrame, JsonCodec};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use heartbeat::{Heartbeat, HeartbeatConfig};
pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
pub use transport::WebSocketConnector;
