//! Domain Layer - Streaming payloads and subscription state.
//!
//! This layer contains the event types delivered to subscribers and the
//! registry that maps channel keys to their sinks. It knows nothing about
//! sockets or wire framing.

/// Order book, order change and balance change payloads.
pub mod streaming;

/// Channel keys, typed sinks and the subscription registry.
pub mod subscription;
