//! Subscription Registry
//!
//! Tracks the live subscriptions of one stream client. Each subscription
//! pairs a [`ChannelKey`] with the subscribe request that created it (kept
//! verbatim for replay after a reconnect) and a typed event sink.
//!
//! # Design
//!
//! - The map is guarded by a `parking_lot::RwLock`; lookups by the
//!   dispatcher and register/unregister calls from callers never race.
//! - Sinks are typed through [`ChannelPayload`]: a key's [`ChannelKind`]
//!   fixes the payload type, so a delivery can never hit a sink of the
//!   wrong kind.
//! - Closing a sink is synchronized with delivery. Once
//!   [`SubscriptionRegistry::unregister`] returns, nothing more is
//!   delivered to that sink.
//!
//! # Example
//!
//! ```rust
//! use ndex_stream::domain::streaming::OrderBook;
//! use ndex_stream::domain::subscription::{ChannelKey, SubscriptionRegistry};
//!
//! let registry = SubscriptionRegistry::new();
//! let key = ChannelKey::order_book("BTCUSDT");
//!
//! let first = registry
//!     .register::<OrderBook>(key.clone(), "subscribe-frame", 30)
//!     .unwrap();
//! let second = registry
//!     .register::<OrderBook>(key.clone(), "subscribe-frame", 30)
//!     .unwrap();
//!
//! assert!(first.created);
//! assert!(!second.created);
//! assert!(first.stream.is_same_stream(&second.stream));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::domain::streaming::{BalanceChange, OrderBook, OrderChange};

// =============================================================================
// Channel Keys
// =============================================================================

/// Family of a subscription channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Order book snapshots, keyed by symbol.
    OrderBook,
    /// Order changes, keyed by account address.
    OrderChange,
    /// Balance changes, keyed by account address.
    BalanceChange,
}

impl ChannelKind {
    /// Channel name prefix used on the wire.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::OrderBook => "apiOrderBook",
            Self::OrderChange => "order",
            Self::BalanceChange => "account",
        }
    }

    /// Label used for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderBook => "order_book",
            Self::OrderChange => "order_change",
            Self::BalanceChange => "balance_change",
        }
    }

    /// Classify a channel name by its prefix (the part before any `:`).
    #[must_use]
    pub fn from_channel(channel: &str) -> Option<Self> {
        let prefix = channel.split_once(':').map_or(channel, |(head, _)| head);
        match prefix {
            "apiOrderBook" => Some(Self::OrderBook),
            "order" => Some(Self::OrderChange),
            "account" => Some(Self::BalanceChange),
            _ => None,
        }
    }
}

/// Identifies one logical subscription: kind plus symbol or address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    kind: ChannelKind,
    discriminator: String,
}

impl ChannelKey {
    /// Create a key from its parts.
    #[must_use]
    pub fn new(kind: ChannelKind, discriminator: impl Into<String>) -> Self {
        Self {
            kind,
            discriminator: discriminator.into(),
        }
    }

    /// Key for an order book subscription.
    #[must_use]
    pub fn order_book(symbol: impl Into<String>) -> Self {
        Self::new(ChannelKind::OrderBook, symbol)
    }

    /// Key for an order change subscription.
    #[must_use]
    pub fn order_change(address: impl Into<String>) -> Self {
        Self::new(ChannelKind::OrderChange, address)
    }

    /// Key for a balance change subscription.
    #[must_use]
    pub fn balance_change(address: impl Into<String>) -> Self {
        Self::new(ChannelKind::BalanceChange, address)
    }

    /// Channel kind.
    #[must_use]
    pub const fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Symbol or address.
    #[must_use]
    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.prefix(), self.discriminator)
    }
}

// =============================================================================
// Sinks and Streams
// =============================================================================

/// Consumer side of a subscription.
///
/// Clones share one bounded channel. `recv` returns `None` once the
/// subscription has been removed and buffered events are drained.
pub struct EventStream<T> {
    key: ChannelKey,
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<T> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<T> EventStream<T> {
    /// Channel this stream belongs to.
    #[must_use]
    pub const fn key(&self) -> &ChannelKey {
        &self.key
    }

    /// Wait for the next event.
    pub async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Take a buffered event without waiting.
    #[must_use]
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Whether both handles drain the same channel.
    #[must_use]
    pub fn is_same_stream(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.rx, &other.rx)
    }
}

/// Producer side of a subscription.
pub struct EventSink<T> {
    tx: Mutex<Option<mpsc::Sender<T>>>,
    closed: CancellationToken,
}

impl<T> fmt::Debug for EventSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("closed", &self.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<T> EventSink<T> {
    fn new(tx: mpsc::Sender<T>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            closed: CancellationToken::new(),
        }
    }

    /// Deliver one event, waiting while the consumer's buffer is full.
    ///
    /// Returns `false` if the sink was closed before or during delivery.
    pub async fn deliver(&self, event: T) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }
        let guard = self.tx.lock().await;
        let Some(tx) = guard.as_ref() else {
            return false;
        };
        tokio::select! {
            biased;
            () = self.closed.cancelled() => false,
            sent = tx.send(event) => sent.is_ok(),
        }
    }

    /// Close the sink. Returns `true` only for the call that closed it.
    pub async fn close(&self) -> bool {
        self.closed.cancel();
        self.tx.lock().await.take().is_some()
    }

    /// Whether the sink has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

/// Both ends of one subscription's channel.
pub struct TypedSink<T> {
    sink: Arc<EventSink<T>>,
    stream: EventStream<T>,
}

impl<T> TypedSink<T> {
    fn with_capacity(key: ChannelKey, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            sink: Arc::new(EventSink::new(tx)),
            stream: EventStream {
                key,
                rx: Arc::new(Mutex::new(rx)),
            },
        }
    }
}

/// A registered sink of any kind.
pub enum RegisteredSink {
    /// Order book sink.
    OrderBook(TypedSink<OrderBook>),
    /// Order change sink.
    OrderChange(TypedSink<OrderChange>),
    /// Balance change sink.
    BalanceChange(TypedSink<BalanceChange>),
}

impl RegisteredSink {
    /// Kind of events this sink carries.
    #[must_use]
    pub const fn kind(&self) -> ChannelKind {
        match self {
            Self::OrderBook(_) => ChannelKind::OrderBook,
            Self::OrderChange(_) => ChannelKind::OrderChange,
            Self::BalanceChange(_) => ChannelKind::BalanceChange,
        }
    }

    async fn close(&self) -> bool {
        match self {
            Self::OrderBook(s) => s.sink.close().await,
            Self::OrderChange(s) => s.sink.close().await,
            Self::BalanceChange(s) => s.sink.close().await,
        }
    }
}

impl fmt::Debug for RegisteredSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RegisteredSink").field(&self.kind()).finish()
    }
}

/// Binds a payload type to its channel kind and sink variant.
pub trait ChannelPayload: Sized + Send + 'static {
    /// Channel kind carrying this payload.
    const KIND: ChannelKind;

    /// Wrap a typed sink into the registry's sink union.
    fn into_registered(sink: TypedSink<Self>) -> RegisteredSink;

    /// Borrow the typed sink if the variant matches.
    fn from_registered(sink: &RegisteredSink) -> Option<&TypedSink<Self>>;
}

impl ChannelPayload for OrderBook {
    const KIND: ChannelKind = ChannelKind::OrderBook;

    fn into_registered(sink: TypedSink<Self>) -> RegisteredSink {
        RegisteredSink::OrderBook(sink)
    }

    fn from_registered(sink: &RegisteredSink) -> Option<&TypedSink<Self>> {
        match sink {
            RegisteredSink::OrderBook(s) => Some(s),
            _ => None,
        }
    }
}

impl ChannelPayload for OrderChange {
    const KIND: ChannelKind = ChannelKind::OrderChange;

    fn into_registered(sink: TypedSink<Self>) -> RegisteredSink {
        RegisteredSink::OrderChange(sink)
    }

    fn from_registered(sink: &RegisteredSink) -> Option<&TypedSink<Self>> {
        match sink {
            RegisteredSink::OrderChange(s) => Some(s),
            _ => None,
        }
    }
}

impl ChannelPayload for BalanceChange {
    const KIND: ChannelKind = ChannelKind::BalanceChange;

    fn into_registered(sink: TypedSink<Self>) -> RegisteredSink {
        RegisteredSink::BalanceChange(sink)
    }

    fn from_registered(sink: &RegisteredSink) -> Option<&TypedSink<Self>> {
        match sink {
            RegisteredSink::BalanceChange(s) => Some(s),
            _ => None,
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// One live subscription.
#[derive(Debug)]
pub struct Subscription {
    key: ChannelKey,
    subscribe_message: String,
    sink: RegisteredSink,
}

impl Subscription {
    /// Channel key.
    #[must_use]
    pub const fn key(&self) -> &ChannelKey {
        &self.key
    }

    /// Subscribe frame replayed after reconnect.
    #[must_use]
    pub fn subscribe_message(&self) -> &str {
        &self.subscribe_message
    }

    /// Kind of the sink.
    #[must_use]
    pub const fn kind(&self) -> ChannelKind {
        self.sink.kind()
    }
}

/// Result of [`SubscriptionRegistry::register`].
#[derive(Debug)]
pub struct Registration<T> {
    /// Stream handed to the caller.
    pub stream: EventStream<T>,
    /// `true` if this call created the subscription.
    pub created: bool,
}

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No subscription exists for the key.
    #[error("no subscription for channel {0}")]
    NotFound(ChannelKey),
    /// The key's kind does not match the requested payload type.
    #[error("channel {key} does not carry {expected:?} events")]
    KindMismatch {
        /// Offending key.
        key: ChannelKey,
        /// Kind implied by the payload type.
        expected: ChannelKind,
    },
}

/// Thread-safe map from channel key to subscription.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<ChannelKey, Subscription>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscription, or return the existing stream for the key.
    ///
    /// `capacity` bounds the sink's buffer and only applies on creation.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::KindMismatch`] if the key's kind is not the
    /// kind carried by `T`.
    pub fn register<T: ChannelPayload>(
        &self,
        key: ChannelKey,
        subscribe_message: impl Into<String>,
        capacity: usize,
    ) -> Result<Registration<T>, RegistryError> {
        if key.kind() != T::KIND {
            return Err(RegistryError::KindMismatch {
                key,
                expected: T::KIND,
            });
        }

        let mut entries = self.entries.write();

        if let Some(existing) = entries.get(&key) {
            let typed = T::from_registered(&existing.sink).ok_or_else(|| {
                RegistryError::KindMismatch {
                    key: key.clone(),
                    expected: T::KIND,
                }
            })?;
            return Ok(Registration {
                stream: typed.stream.clone(),
                created: false,
            });
        }

        let typed = TypedSink::<T>::with_capacity(key.clone(), capacity);
        let stream = typed.stream.clone();
        entries.insert(
            key.clone(),
            Subscription {
                key,
                subscribe_message: subscribe_message.into(),
                sink: T::into_registered(typed),
            },
        );
        drop(entries);

        Ok(Registration {
            stream,
            created: true,
        })
    }

    /// Look up the producer side of a subscription.
    #[must_use]
    pub fn sink<T: ChannelPayload>(&self, key: &ChannelKey) -> Option<Arc<EventSink<T>>> {
        let entries = self.entries.read();
        entries
            .get(key)
            .and_then(|sub| T::from_registered(&sub.sink))
            .map(|typed| Arc::clone(&typed.sink))
    }

    /// Deliver an event to the sink for `key`.
    ///
    /// Returns `false` if there is no such sink or it closed meanwhile.
    pub async fn deliver<T: ChannelPayload>(&self, key: &ChannelKey, event: T) -> bool {
        match self.sink::<T>(key) {
            Some(sink) => sink.deliver(event).await,
            None => false,
        }
    }

    /// Remove a subscription and close its sink.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the key is not registered.
    pub async fn unregister(&self, key: &ChannelKey) -> Result<Subscription, RegistryError> {
        let removed = self
            .entries
            .write()
            .remove(key)
            .ok_or_else(|| RegistryError::NotFound(key.clone()))?;
        removed.sink.close().await;
        Ok(removed)
    }

    /// Snapshot of every stored subscribe message.
    #[must_use]
    pub fn subscribe_messages(&self) -> Vec<String> {
        self.entries
            .read()
            .values()
            .map(|sub| sub.subscribe_message.clone())
            .collect()
    }

    /// Enqueue every stored subscribe message onto `outbound`.
    ///
    /// Returns how many messages were enqueued.
    ///
    /// # Errors
    ///
    /// Fails if the outbound queue closes part way through.
    pub async fn replay_all(
        &self,
        outbound: &mpsc::Sender<String>,
    ) -> Result<usize, mpsc::error::SendError<String>> {
        let messages = self.subscribe_messages();
        let count = messages.len();
        for message in messages {
            outbound.send(message).await?;
        }
        Ok(count)
    }

    /// Keys of all live subscriptions.
    #[must_use]
    pub fn keys(&self) -> Vec<ChannelKey> {
        self.entries.read().keys().cloned().collect()
    }

    /// Whether `key` is registered.
    #[must_use]
    pub fn contains(&self, key: &ChannelKey) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether there are no live subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
