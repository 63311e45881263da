//! Configuration Module
//!
//! Environment-driven settings for the stream client binary.

mod settings;

pub use settings::{
    BufferSettings, ConfigError, ConnectionSettings, StreamSettings, SubscriptionSettings,
};
