//! Stream Codec Module
//!
//! JSON encoding of client frames and decoding of server frames for the
//! NerveDEX stream.
//!
//! Decoding follows a fixed fallback order: a frame is first read as an
//! [`Envelope`]; if that fails or yields an empty channel it is read as a
//! keep-alive [`Pong`]; anything else is unrecognized.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::messages::{
    ChannelRequest, Envelope, Ping, Pong, balance_change_channel, order_book_channel,
    order_change_channel,
};

/// Longest frame excerpt kept in error messages.
const PREVIEW_CHARS: usize = 64;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is neither an envelope nor a keep-alive.
    #[error("unrecognized frame: {0}")]
    UnrecognizedFrame(String),
}

/// A classified server frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Keep-alive reply.
    KeepAlive(Pong),
    /// Envelope with a non-empty channel.
    Envelope(Envelope),
}

/// JSON codec for the NerveDEX stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classify a raw text frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnrecognizedFrame`] if the text is neither an
    /// envelope with a channel nor a keep-alive.
    pub fn decode(&self, text: &str) -> Result<InboundFrame, CodecError> {
        if let Ok(envelope) = serde_json::from_str::<Envelope>(text)
            && !envelope.channel.is_empty()
        {
            return Ok(InboundFrame::Envelope(envelope));
        }

        serde_json::from_str::<Pong>(text)
            .map(InboundFrame::KeepAlive)
            .map_err(|_| CodecError::UnrecognizedFrame(preview(text)))
    }

    /// Decode an envelope's payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self, envelope: Envelope) -> Result<T, CodecError> {
        Ok(serde_json::from_value(envelope.data)?)
    }

    /// Encode any client frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode<T: Serialize>(&self, frame: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(frame)?)
    }

    /// Keep-alive stamped with `at`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn ping(&self, at: DateTime<Utc>) -> Result<String, CodecError> {
        self.encode(&Ping {
            ping: at.timestamp_millis(),
        })
    }

    /// Subscribe frame for an order book of depth `top`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn subscribe_order_book(&self, symbol: &str, top: u32) -> Result<String, CodecError> {
        self.encode(&ChannelRequest::subscribe(order_book_channel(
            symbol,
            Some(top),
        )?))
    }

    /// Unsubscribe frame for an order book.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn unsubscribe_order_book(&self, symbol: &str) -> Result<String, CodecError> {
        self.encode(&ChannelRequest::unsubscribe(order_book_channel(
            symbol, None,
        )?))
    }

    /// Subscribe frame for an account's order changes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn subscribe_order_change(&self, address: &str) -> Result<String, CodecError> {
        self.encode(&ChannelRequest::subscribe(order_change_channel(address)))
    }

    /// Unsubscribe frame for an account's order changes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn unsubscribe_order_change(&self, address: &str) -> Result<String, CodecError> {
        self.encode(&ChannelRequest::unsubscribe(order_change_channel(address)))
    }

    /// Subscribe frame for an account's balance changes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn subscribe_balance_change(&self, address: &str) -> Result<String, CodecError> {
        self.encode(&ChannelRequest::subscribe(balance_change_channel(address)))
    }

    /// Unsubscribe frame for an account's balance changes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn unsubscribe_balance_change(&self, address: &str) -> Result<String, CodecError> {
        self.encode(&ChannelRequest::unsubscribe(balance_change_channel(
            address,
        )))
    }
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    let mut excerpt: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    if trimmed.chars().count() > PREVIEW_CHARS {
        excerpt.push_str("...");
    }
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::streaming::OrderBook;
    use crate::infrastructure::ndex::messages::ChannelAction;
    use proptest::prelude::*;

    #[test]
    fn subscribe_order_book_frame_is_exact() {
        let frame = JsonCodec::new().subscribe_order_book("BTCUSDT", 10).unwrap();
        assert_eq!(
            frame,
            r#"{"action":"Subscribe","channel":"apiOrderBook:{\"symbol\":\"BTCUSDT\",\"top\":10}"}"#
        );
    }

    #[test]
    fn unsubscribe_order_book_frame_is_exact() {
        let frame = JsonCodec::new().unsubscribe_order_book("BTCUSDT").unwrap();
        assert_eq!(
            frame,
            r#"{"action":"Unsubscribe","channel":"apiOrderBook:{\"symbol\":\"BTCUSDT\"}"}"#
        );
    }

    #[test]
    fn account_frames_are_exact() {
        let codec = JsonCodec::new();
        assert_eq!(
            codec.subscribe_order_change("TNVT1").unwrap(),
            r#"{"action":"Subscribe","channel":"order:TNVT1"}"#
        );
        assert_eq!(
            codec.unsubscribe_order_change("TNVT1").unwrap(),
            r#"{"action":"Unsubscribe","channel":"order:TNVT1"}"#
        );
        assert_eq!(
            codec.subscribe_balance_change("TNVT1").unwrap(),
            r#"{"action":"Subscribe","channel":"account:TNVT1"}"#
        );
        assert_eq!(
            codec.unsubscribe_balance_change("TNVT1").unwrap(),
            r#"{"action":"Unsubscribe","channel":"account:TNVT1"}"#
        );
    }

    #[test]
    fn ping_frame_uses_epoch_millis() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        assert_eq!(
            JsonCodec::new().ping(at).unwrap(),
            r#"{"ping":1700000000123}"#
        );
    }

    #[test]
    fn decode_data_envelope() {
        let frame = JsonCodec::new()
            .decode(r#"{"channel":"apiOrderBook","action":"Data","status":200,"data":{"symbol":"BTCUSDT"}}"#)
            .unwrap();

        let InboundFrame::Envelope(envelope) = frame else {
            panic!("expected envelope");
        };
        assert_eq!(envelope.channel, "apiOrderBook");
        assert!(envelope.is_data());

        let book: OrderBook = JsonCodec::new().decode_payload(envelope).unwrap();
        assert_eq!(book.symbol, "BTCUSDT");
    }

    #[test]
    fn decode_pong_falls_back_from_empty_channel() {
        let frame = JsonCodec::new().decode(r#"{"pong":1700000000000}"#).unwrap();
        assert_eq!(frame, InboundFrame::KeepAlive(Pong { pong: 1_700_000_000_000 }));
    }

    #[test]
    fn decode_pong_falls_back_from_envelope_error() {
        // status as a string breaks the envelope shape but not the pong shape
        let frame = JsonCodec::new()
            .decode(r#"{"status":"bad","pong":7}"#)
            .unwrap();
        assert_eq!(frame, InboundFrame::KeepAlive(Pong { pong: 7 }));
    }

    #[test]
    fn decode_garbage_is_unrecognized() {
        let codec = JsonCodec::new();
        assert!(matches!(
            codec.decode("not json"),
            Err(CodecError::UnrecognizedFrame(_))
        ));
        assert!(matches!(
            codec.decode(r#"{"hello":"world"}"#),
            Err(CodecError::UnrecognizedFrame(_))
        ));
    }

    #[test]
    fn decode_payload_shape_mismatch() {
        let envelope = Envelope {
            channel: "apiOrderBook".to_string(),
            action: "Data".to_string(),
            status: 200,
            data: serde_json::json!([1, 2, 3]),
        };
        let result: Result<OrderBook, _> = JsonCodec::new().decode_payload(envelope);
        assert!(matches!(result, Err(CodecError::Json(_))));
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(100);
        let excerpt = preview(&long);
        assert_eq!(excerpt.chars().count(), PREVIEW_CHARS + 3);
        assert!(excerpt.ends_with("..."));
    }

    proptest! {
        #[test]
        fn order_book_subscribe_carries_symbol_and_depth(
            symbol in "[A-Z0-9]{1,6}(-[A-Z0-9]{1,6})?",
            top in 1u32..500,
        ) {
            let frame = JsonCodec::new().subscribe_order_book(&symbol, top).unwrap();
            let request: ChannelRequest = serde_json::from_str(&frame).unwrap();
            prop_assert_eq!(request.action, ChannelAction::Subscribe);

            let selector = request.channel.strip_prefix("apiOrderBook:").unwrap();
            let selector: serde_json::Value = serde_json::from_str(selector).unwrap();
            prop_assert_eq!(selector["symbol"].as_str(), Some(symbol.as_str()));
            prop_assert_eq!(selector["top"].as_u64(), Some(u64::from(top)));
        }
    }
}
