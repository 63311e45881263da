//! NerveDEX Stream Message Types
//!
//! Wire shapes of the JSON frames exchanged on the `/ws` endpoint.
//!
//! # Client Frames
//!
//! ```json
//! {"ping":1700000000000}
//! {"action":"Subscribe","channel":"order:TNVTdTSP..."}
//! {"action":"Unsubscribe","channel":"account:TNVTdTSP..."}
//! ```
//!
//! # Server Frames
//!
//! ```json
//! {"pong":1700000000000}
//! {"channel":"apiOrderBook","action":"Data","status":200,"data":{...}}
//! ```
//!
//! The order book channel embeds a JSON object in the channel name, e.g.
//! `apiOrderBook:{"symbol":"BTCUSDT","top":10}`. The server matches these
//! names byte for byte.

use serde::{Deserialize, Serialize};

use crate::domain::subscription::ChannelKind;

/// Action value of data frames.
pub const DATA_ACTION: &str = "Data";

/// Status value of successful frames.
pub const STATUS_OK: i64 = 200;

// =============================================================================
// Client Frames
// =============================================================================

/// Client keep-alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Send time in epoch milliseconds.
    pub ping: i64,
}

/// Subscription action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelAction {
    /// Start receiving a channel.
    Subscribe,
    /// Stop receiving a channel.
    Unsubscribe,
}

/// Subscribe or unsubscribe request.
///
/// Field order is part of the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRequest {
    /// Requested action.
    pub action: ChannelAction,
    /// Channel name.
    pub channel: String,
}

impl ChannelRequest {
    /// Subscribe request for `channel`.
    #[must_use]
    pub fn subscribe(channel: impl Into<String>) -> Self {
        Self {
            action: ChannelAction::Subscribe,
            channel: channel.into(),
        }
    }

    /// Unsubscribe request for `channel`.
    #[must_use]
    pub fn unsubscribe(channel: impl Into<String>) -> Self {
        Self {
            action: ChannelAction::Unsubscribe,
            channel: channel.into(),
        }
    }
}

/// Selector embedded in order book channel names.
#[derive(Debug, Serialize)]
struct OrderBookSelector<'a> {
    symbol: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    top: Option<u32>,
}

/// Order book channel name. `top` is present on subscribe only.
///
/// # Errors
///
/// Returns an error if the selector cannot be serialized.
pub fn order_book_channel(symbol: &str, top: Option<u32>) -> Result<String, serde_json::Error> {
    let selector = serde_json::to_string(&OrderBookSelector { symbol, top })?;
    Ok(format!("{}:{selector}", ChannelKind::OrderBook.prefix()))
}

/// Order change channel name for an account.
#[must_use]
pub fn order_change_channel(address: &str) -> String {
    format!("{}:{address}", ChannelKind::OrderChange.prefix())
}

/// Balance change channel name for an account.
#[must_use]
pub fn balance_change_channel(address: &str) -> String {
    format!("{}:{address}", ChannelKind::BalanceChange.prefix())
}

// =============================================================================
// Server Frames
// =============================================================================

/// Server keep-alive reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    /// Echoed time in epoch milliseconds.
    pub pong: i64,
}

/// Envelope wrapping every non keep-alive server frame.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Envelope {
    /// Channel name; empty when the frame is not an envelope.
    pub channel: String,
    /// Frame action (`Data` for payload frames).
    pub action: String,
    /// HTTP-like status code.
    pub status: i64,
    /// Channel-specific payload.
    pub data: serde_json::Value,
}

impl Envelope {
    /// Whether the frame carries channel data.
    #[must_use]
    pub fn is_data(&self) -> bool {
        self.status == STATUS_OK && self.action == DATA_ACTION
    }
}
