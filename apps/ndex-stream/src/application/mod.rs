//! Application Layer - Port definitions.
//!
//! This layer holds the interfaces the streaming core needs from the
//! outside world. Infrastructure adapters implement them.

/// Port interfaces for external systems (transport).
pub mod ports;
