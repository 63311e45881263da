//! Frame Dispatcher
//!
//! Consumes raw inbound frames one at a time, classifies them and routes
//! decoded payloads to the matching subscription sink.
//!
//! # Routing
//!
//! | Channel        | Payload        | Key                                   |
//! |----------------|----------------|---------------------------------------|
//! | `apiOrderBook` | `OrderBook`    | payload symbol                        |
//! | `order`        | `OrderChange`  | each order's address (`update`), or the first order's address (`init`) |
//! | `account`      | `BalanceChange`| payload address                       |
//!
//! Keys come from the payload, never from the envelope's channel string.
//! Nothing that fails to decode or route ever reaches a subscriber.
//!
//! Delivery waits for room in the subscriber's buffer, so one slow
//! consumer holds up dispatch for every channel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::codec::{InboundFrame, JsonCodec};
use super::messages::{DATA_ACTION, Envelope, Pong, STATUS_OK};
use crate::domain::streaming::{BalanceChange, OrderBook, OrderChange, OrderChangeKind};
use crate::domain::subscription::{
    ChannelKey, ChannelKind, ChannelPayload, SubscriptionRegistry,
};
use crate::infrastructure::metrics;

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Payload routed; the count is the number of sink deliveries (0 = no subscriber).
    Delivered(usize),
    /// Keep-alive reply, discarded.
    KeepAlive,
    /// Frame or payload failed to decode.
    Malformed,
    /// Envelope with a non-200 status.
    Exception(i64),
    /// Successful envelope with an action other than `Data`.
    UnknownAction,
    /// Data frame on a channel this client does not handle.
    Unparsed,
}

impl DispatchOutcome {
    /// Metric label for frames that produced no delivery.
    #[must_use]
    pub const fn drop_reason(self) -> Option<&'static str> {
        match self {
            Self::Delivered(0) => Some("unrouted"),
            Self::Delivered(_) => None,
            Self::KeepAlive => Some("keep_alive"),
            Self::Malformed => Some("malformed"),
            Self::Exception(_) => Some("exception"),
            Self::UnknownAction => Some("unknown_action"),
            Self::Unparsed => Some("unparsed"),
        }
    }
}

/// Routes decoded frames into the subscription registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<SubscriptionRegistry>,
    codec: JsonCodec,
}

impl Dispatcher {
    /// Create a dispatcher over `registry`.
    #[must_use]
    pub const fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            registry,
            codec: JsonCodec::new(),
        }
    }

    /// Drain `inbound` until it closes or `done` fires.
    pub async fn run(self, mut inbound: mpsc::Receiver<String>, done: CancellationToken) {
        loop {
            let frame = tokio::select! {
                biased;
                () = done.cancelled() => break,
                frame = inbound.recv() => frame,
            };
            let Some(text) = frame else {
                break;
            };
            self.dispatch(&text).await;
        }
        tracing::debug!("Dispatcher stopped");
    }

    /// Classify and route one raw frame.
    pub async fn dispatch(&self, text: &str) -> DispatchOutcome {
        metrics::record_frame_received();

        let outcome = match self.codec.decode(text) {
            Ok(InboundFrame::KeepAlive(pong)) => {
                on_keep_alive(pong);
                DispatchOutcome::KeepAlive
            }
            Ok(InboundFrame::Envelope(envelope)) => self.dispatch_envelope(envelope).await,
            Err(e) => {
                tracing::debug!(error = %e, "Dropping unrecognized frame");
                DispatchOutcome::Malformed
            }
        };

        if let Some(reason) = outcome.drop_reason() {
            metrics::record_frame_dropped(reason);
        }
        outcome
    }

    async fn dispatch_envelope(&self, envelope: Envelope) -> DispatchOutcome {
        if envelope.status != STATUS_OK {
            tracing::error!(
                channel = %envelope.channel,
                status = envelope.status,
                data = %envelope.data,
                "Exception frame from server"
            );
            return DispatchOutcome::Exception(envelope.status);
        }

        if envelope.action != DATA_ACTION {
            tracing::warn!(
                channel = %envelope.channel,
                action = %envelope.action,
                "Unknown frame action"
            );
            return DispatchOutcome::UnknownAction;
        }

        match ChannelKind::from_channel(&envelope.channel) {
            Some(ChannelKind::OrderBook) => self.route_order_book(envelope).await,
            Some(ChannelKind::OrderChange) => self.route_order_change(envelope).await,
            Some(ChannelKind::BalanceChange) => self.route_balance_change(envelope).await,
            None => {
                tracing::warn!(channel = %envelope.channel, "Unparsed channel");
                DispatchOutcome::Unparsed
            }
        }
    }

    async fn route_order_book(&self, envelope: Envelope) -> DispatchOutcome {
        let Some(book) = self.decode::<OrderBook>(envelope) else {
            return DispatchOutcome::Malformed;
        };
        let key = ChannelKey::order_book(book.symbol.clone());
        DispatchOutcome::Delivered(usize::from(self.deliver(&key, book).await))
    }

    async fn route_order_change(&self, envelope: Envelope) -> DispatchOutcome {
        let Some(change) = self.decode::<OrderChange>(envelope) else {
            return DispatchOutcome::Malformed;
        };

        match change.kind {
            OrderChangeKind::Update => {
                let mut delivered = 0;
                for order in change.orders {
                    let key = ChannelKey::order_change(order.address.clone());
                    if self.deliver(&key, OrderChange::single_update(order)).await {
                        delivered += 1;
                    }
                }
                DispatchOutcome::Delivered(delivered)
            }
            OrderChangeKind::Init => {
                let Some(first) = change.orders.first() else {
                    tracing::trace!("Empty order snapshot");
                    return DispatchOutcome::Delivered(0);
                };
                let key = ChannelKey::order_change(first.address.clone());
                DispatchOutcome::Delivered(usize::from(self.deliver(&key, change).await))
            }
            OrderChangeKind::Other => {
                tracing::debug!("Ignoring order change of unknown type");
                DispatchOutcome::Delivered(0)
            }
        }
    }

    async fn route_balance_change(&self, envelope: Envelope) -> DispatchOutcome {
        let Some(balance) = self.decode::<BalanceChange>(envelope) else {
            return DispatchOutcome::Malformed;
        };
        let key = ChannelKey::balance_change(balance.address.clone());
        DispatchOutcome::Delivered(usize::from(self.deliver(&key, balance).await))
    }

    fn decode<T: ChannelPayload + serde::de::DeserializeOwned>(
        &self,
        envelope: Envelope,
    ) -> Option<T> {
        match self.codec.decode_payload::<T>(envelope) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    kind = T::KIND.as_str(),
                    "Malformed payload"
                );
                None
            }
        }
    }

    async fn deliver<T: ChannelPayload>(&self, key: &ChannelKey, event: T) -> bool {
        let delivered = self.registry.deliver(key, event).await;
        if delivered {
            metrics::record_delivery(T::KIND);
        } else {
            tracing::trace!(channel = %key, "No subscriber for frame");
        }
        delivered
    }
}

/// Pong replies carry nothing the client acts on.
fn on_keep_alive(pong: Pong) {
    tracing::trace!(pong = pong.pong, "Keep-alive received");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;
    use test_case::test_case;

    use super::*;
    use crate::domain::streaming::PriceLevel;
    use crate::domain::subscription::EventStream;

    fn registry_with_book(symbol: &str) -> (Arc<SubscriptionRegistry>, EventStream<OrderBook>) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let reg = registry
            .register::<OrderBook>(ChannelKey::order_book(symbol), "sub", 30)
            .unwrap();
        (registry, reg.stream)
    }

    fn order_stream(registry: &SubscriptionRegistry, address: &str) -> EventStream<OrderChange> {
        registry
            .register::<OrderChange>(ChannelKey::order_change(address), "sub", 10)
            .unwrap()
            .stream
    }

    #[test_case(r#"{"pong":1700000000000}"#, DispatchOutcome::KeepAlive ; "keep alive")]
    #[test_case("garbage", DispatchOutcome::Malformed ; "not json")]
    #[test_case(r#"{"foo":1}"#, DispatchOutcome::Malformed ; "neither envelope nor pong")]
    #[test_case(r#"{"channel":"apiOrderBook","action":"Data","status":500,"data":{}}"#, DispatchOutcome::Exception(500) ; "exception status")]
    #[test_case(r#"{"channel":"apiOrderBook","action":"Subscribe","status":200}"#, DispatchOutcome::UnknownAction ; "subscribe ack")]
    #[test_case(r#"{"channel":"kline","action":"Data","status":200,"data":{}}"#, DispatchOutcome::Unparsed ; "unknown channel")]
    #[test_case(r#"{"channel":"apiOrderBook","action":"Data","status":200,"data":[1]}"#, DispatchOutcome::Malformed ; "bad payload")]
    #[test_case(r#"{"channel":"apiOrderBook","action":"Data","status":200,"data":{"symbol":"ETHUSDT"}}"#, DispatchOutcome::Delivered(0) ; "routing miss")]
    #[test_case(r#"{"channel":"apiOrderBook","action":"Data","status":200,"data":{"symbol":"BTCUSDT"}}"#, DispatchOutcome::Delivered(1) ; "routed")]
    #[tokio::test]
    async fn classifies_frames(frame: &str, expected: DispatchOutcome) {
        let (registry, _stream) = registry_with_book("BTCUSDT");
        let dispatcher = Dispatcher::new(registry);

        assert_eq!(dispatcher.dispatch(frame).await, expected);
    }

    #[tokio::test]
    async fn order_book_delivered_with_levels() {
        let (registry, stream) = registry_with_book("BTCUSDT");
        let dispatcher = Dispatcher::new(registry);

        let outcome = dispatcher
            .dispatch(r#"{"channel":"apiOrderBook","action":"Data","status":200,"data":{"symbol":"BTCUSDT","updateTime":1,"sellList":[[100,1]],"buyList":[[99,1]]}}"#)
            .await;
        assert_eq!(outcome, DispatchOutcome::Delivered(1));

        let book = stream.try_recv().unwrap();
        assert_eq!(book.update_time, 1);
        assert_eq!(
            book.sell_list,
            vec![PriceLevel::new(Decimal::from(100), Decimal::ONE)]
        );
        assert_eq!(
            book.buy_list,
            vec![PriceLevel::new(Decimal::from(99), Decimal::ONE)]
        );
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn order_book_keyed_by_payload_symbol() {
        let (registry, stream) = registry_with_book("BTCUSDT");
        let dispatcher = Dispatcher::new(registry);

        // channel string names another symbol; the payload decides
        let outcome = dispatcher
            .dispatch(r#"{"channel":"apiOrderBook:{\"symbol\":\"ETHUSDT\"}","action":"Data","status":200,"data":{"symbol":"BTCUSDT"}}"#)
            .await;

        assert_eq!(outcome, DispatchOutcome::Delivered(1));
        assert_eq!(stream.try_recv().unwrap().symbol, "BTCUSDT");
    }

    #[tokio::test]
    async fn order_update_splits_per_order() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let a = order_stream(&registry, "addr-a");
        let b = order_stream(&registry, "addr-b");
        let dispatcher = Dispatcher::new(Arc::clone(&registry));

        let outcome = dispatcher
            .dispatch(r#"{"channel":"order","action":"Data","status":200,"data":{"t":"update","d":[
                {"id":"1","address":"addr-a"},
                {"id":"2","address":"addr-b"},
                {"id":"3","address":"addr-a"}
            ]}}"#)
            .await;
        assert_eq!(outcome, DispatchOutcome::Delivered(3));

        let first = a.try_recv().unwrap();
        assert_eq!(first.kind, OrderChangeKind::Update);
        assert_eq!(first.orders.len(), 1);
        assert_eq!(first.orders[0].id, "1");
        assert_eq!(a.try_recv().unwrap().orders[0].id, "3");
        assert!(a.try_recv().is_none());

        let only = b.try_recv().unwrap();
        assert_eq!(only.orders.len(), 1);
        assert_eq!(only.orders[0].id, "2");
        assert!(b.try_recv().is_none());
    }

    #[tokio::test]
    async fn order_update_skips_unsubscribed_addresses() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let a = order_stream(&registry, "addr-a");
        let dispatcher = Dispatcher::new(Arc::clone(&registry));

        let outcome = dispatcher
            .dispatch(r#"{"channel":"order","action":"Data","status":200,"data":{"t":"update","d":[
                {"id":"1","address":"addr-x"},
                {"id":"2","address":"addr-a"}
            ]}}"#)
            .await;

        assert_eq!(outcome, DispatchOutcome::Delivered(1));
        assert_eq!(a.try_recv().unwrap().orders[0].id, "2");
    }

    #[tokio::test]
    async fn order_init_goes_whole_to_first_address() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let a = order_stream(&registry, "addr-a");
        let b = order_stream(&registry, "addr-b");
        let dispatcher = Dispatcher::new(Arc::clone(&registry));

        let outcome = dispatcher
            .dispatch(r#"{"channel":"order","action":"Data","status":200,"data":{"t":"init","d":[
                {"id":"1","address":"addr-a"},
                {"id":"2","address":"addr-b"}
            ]}}"#)
            .await;
        assert_eq!(outcome, DispatchOutcome::Delivered(1));

        let snapshot = a.try_recv().unwrap();
        assert_eq!(snapshot.kind, OrderChangeKind::Init);
        assert_eq!(snapshot.orders.len(), 2);
        assert!(b.try_recv().is_none());
    }

    #[tokio::test]
    async fn order_init_empty_is_dropped() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let a = order_stream(&registry, "addr-a");
        let dispatcher = Dispatcher::new(Arc::clone(&registry));

        let outcome = dispatcher
            .dispatch(r#"{"channel":"order","action":"Data","status":200,"data":{"t":"init","d":[]}}"#)
            .await;

        assert_eq!(outcome, DispatchOutcome::Delivered(0));
        assert!(a.try_recv().is_none());
    }

    #[tokio::test]
    async fn balance_change_routed_by_address() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let stream = registry
            .register::<BalanceChange>(ChannelKey::balance_change("addr-a"), "sub", 10)
            .unwrap()
            .stream;
        let dispatcher = Dispatcher::new(Arc::clone(&registry));

        let outcome = dispatcher
            .dispatch(r#"{"channel":"account","action":"Data","status":200,"data":{"address":"addr-a","asset":"NVT","available":"10","frozen":"1"}}"#)
            .await;

        assert_eq!(outcome, DispatchOutcome::Delivered(1));
        let balance = stream.try_recv().unwrap();
        assert_eq!(balance.asset, "NVT");
        assert_eq!(balance.available, Decimal::from(10));
    }

    #[tokio::test]
    async fn keep_alive_never_delivers() {
        let (registry, stream) = registry_with_book("BTCUSDT");
        let dispatcher = Dispatcher::new(registry);

        dispatcher.dispatch(r#"{"pong":1}"#).await;
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn run_drains_queue_until_done() {
        let (registry, stream) = registry_with_book("BTCUSDT");
        let (inbound_tx, inbound_rx) = mpsc::channel(100);
        let done = CancellationToken::new();

        let handle = tokio::spawn(Dispatcher::new(registry).run(inbound_rx, done.clone()));

        for update_time in 1..=3 {
            inbound_tx
                .send(format!(
                    r#"{{"channel":"apiOrderBook","action":"Data","status":200,"data":{{"symbol":"BTCUSDT","updateTime":{update_time}}}}}"#
                ))
                .await
                .unwrap();
        }

        for expected in 1..=3 {
            let book = tokio::time::timeout(Duration::from_millis(200), stream.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(book.update_time, expected);
        }

        done.cancel();
        tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("dispatcher should stop on done")
            .unwrap();
    }
}
