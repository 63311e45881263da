//! Port Interfaces
//!
//! Defines the transport contract the stream client depends on, following
//! the Hexagonal Architecture pattern. The WebSocket adapter in
//! `infrastructure::ndex::transport` implements it for production; tests
//! plug in an in-memory implementation.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Connector`: Dials a duplex text connection and splits it in two halves
//! - `FrameSink`: Write half (send text, close)
//! - `FrameSource`: Read half (next text payload)

use async_trait::async_trait;

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Dialing the endpoint failed.
    #[error("dial failed: {0}")]
    Dial(String),
    /// Reading a frame failed.
    #[error("read failed: {0}")]
    Read(String),
    /// Writing a frame failed.
    #[error("write failed: {0}")]
    Write(String),
    /// The peer closed the connection.
    #[error("connection closed")]
    Closed,
}

/// Both halves of an established connection.
pub type TransportHalves = (Box<dyn FrameSink>, Box<dyn FrameSource>);

/// Dials connections to the streaming endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`.
    async fn connect(&self, url: &str) -> Result<TransportHalves, TransportError>;
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame.
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Receive the next text payload.
    async fn next_frame(&mut self) -> Result<String, TransportError>;
}
