//! Streaming Payload Types
//!
//! Canonical representations of the three event families pushed by the
//! NerveDEX streaming endpoint: order book snapshots, order changes and
//! balance changes. Field names follow the camelCase JSON shape the server
//! emits; numeric fields default to zero when absent.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Order Book
// =============================================================================

/// A single `[price, amount]` level of an order book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel(pub Decimal, pub Decimal);

impl PriceLevel {
    /// Create a level from price and amount.
    #[must_use]
    pub const fn new(price: Decimal, amount: Decimal) -> Self {
        Self(price, amount)
    }

    /// Level price.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.0
    }

    /// Amount resting at this price.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.1
    }
}

/// Order book snapshot for one trading pair.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderBook {
    /// Trading pair symbol (e.g. `NVT-USDT`).
    pub symbol: String,
    /// Server update time in epoch milliseconds.
    pub update_time: i64,
    /// Ask levels, best first.
    pub sell_list: Vec<PriceLevel>,
    /// Bid levels, best first.
    pub buy_list: Vec<PriceLevel>,
}

impl OrderBook {
    /// Best (first) ask level, if any.
    #[must_use]
    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.sell_list.first().copied()
    }

    /// Best (first) bid level, if any.
    #[must_use]
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.buy_list.first().copied()
    }
}

// =============================================================================
// Orders
// =============================================================================

/// Order direction, encoded on the wire as `1` (buy) or `2` (sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
    /// Any code the server may add later.
    #[default]
    Unknown,
}

impl From<u8> for OrderSide {
    fn from(code: u8) -> Self {
        match code {
            1 => Self::Buy,
            2 => Self::Sell,
            _ => Self::Unknown,
        }
    }
}

impl From<OrderSide> for u8 {
    fn from(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => 1,
            OrderSide::Sell => 2,
            OrderSide::Unknown => 0,
        }
    }
}

/// Order lifecycle status as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum OrderStatus {
    /// Resting, nothing filled.
    Open,
    /// Partially filled, still resting.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Cancelled before any fill.
    Cancelled,
    /// Partially filled, remainder cancelled.
    PartiallyCancelled,
    /// Unrecognized status code.
    #[default]
    Unknown,
}

impl OrderStatus {
    /// Whether the order can still trade.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::PartiallyFilled)
    }
}

impl From<u8> for OrderStatus {
    fn from(code: u8) -> Self {
        match code {
            1 => Self::Open,
            2 => Self::PartiallyFilled,
            3 => Self::Filled,
            4 => Self::Cancelled,
            5 => Self::PartiallyCancelled,
            _ => Self::Unknown,
        }
    }
}

impl From<OrderStatus> for u8 {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Open => 1,
            OrderStatus::PartiallyFilled => 2,
            OrderStatus::Filled => 3,
            OrderStatus::Cancelled => 4,
            OrderStatus::PartiallyCancelled => 5,
            OrderStatus::Unknown => 0,
        }
    }
}

/// One order as carried by an order change event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Order {
    /// Exchange order id.
    pub id: String,
    /// Trading pair symbol.
    pub symbol: String,
    /// Owning account address.
    pub address: String,
    /// Buy or sell.
    #[serde(rename = "type")]
    pub side: OrderSide,
    /// Original base amount.
    pub base_amount: Decimal,
    /// Base amount filled so far.
    pub base_deal_amount: Decimal,
    /// Limit price.
    pub price: Decimal,
    /// Average fill price.
    pub avg_price: Decimal,
    /// Quote amount filled so far.
    pub quote_deal_amount: Decimal,
    /// Base amount still open.
    pub left_amount: Decimal,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Creation time in epoch milliseconds.
    pub create_time: i64,
}

/// Kind of order change event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderChangeKind {
    /// Initial snapshot of an account's open orders.
    Init,
    /// Incremental update for one or more orders.
    Update,
    /// Anything else; never delivered.
    #[default]
    #[serde(other)]
    Other,
}

/// Order change event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderChange {
    /// Event kind.
    #[serde(rename = "t")]
    pub kind: OrderChangeKind,
    /// Orders in server order.
    #[serde(rename = "d")]
    pub orders: Vec<Order>,
}

impl OrderChange {
    /// Build an update event carrying exactly one order.
    #[must_use]
    pub fn single_update(order: Order) -> Self {
        Self {
            kind: OrderChangeKind::Update,
            orders: vec![order],
        }
    }
}

// =============================================================================
// Balances
// =============================================================================

/// Balance change for one asset of one account.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceChange {
    /// Account address.
    #[serde(alias = "a")]
    pub address: String,
    /// Asset identifier.
    #[serde(alias = "assetName")]
    pub asset: String,
    /// Spendable balance.
    pub available: Decimal,
    /// Balance locked in open orders.
    #[serde(alias = "freeze")]
    pub frozen: Decimal,
}

impl BalanceChange {
    /// Available plus frozen.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.available + self.frozen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_book_from_wire() {
        let json = r#"{"symbol":"BTCUSDT","updateTime":1,"sellList":[[100,1]],"buyList":[[99,1]]}"#;
        let book: OrderBook = serde_json::from_str(json).unwrap();

        assert_eq!(book.symbol, "BTCUSDT");
        assert_eq!(book.update_time, 1);
        assert_eq!(
            book.best_ask(),
            Some(PriceLevel::new(Decimal::from(100), Decimal::ONE))
        );
        assert_eq!(
            book.best_bid(),
            Some(PriceLevel::new(Decimal::from(99), Decimal::ONE))
        );
    }

    #[test]
    fn order_book_fractional_levels() {
        let json = r#"{"symbol":"NVT-USDT","sellList":[[0.0125,1500.5]],"buyList":[]}"#;
        let book: OrderBook = serde_json::from_str(json).unwrap();

        let ask = book.best_ask().unwrap();
        assert_eq!(ask.price(), Decimal::new(125, 4));
        assert_eq!(ask.amount(), Decimal::new(15005, 1));
        assert!(book.best_bid().is_none());
        assert_eq!(book.update_time, 0);
    }

    #[test]
    fn order_from_wire() {
        let json = r#"{
            "id":"o-1","symbol":"NVT-USDT","address":"TNVTdTSP",
            "type":2,"baseAmount":10,"baseDealAmount":4,"price":0.5,
            "avgPrice":0.5,"quoteDealAmount":2,"leftAmount":6,
            "status":2,"createTime":1700000000000
        }"#;
        let order: Order = serde_json::from_str(json).unwrap();

        assert_eq!(order.side, OrderSide::Sell);
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert!(order.status.is_active());
        assert_eq!(order.left_amount, Decimal::from(6));
        assert_eq!(order.create_time, 1_700_000_000_000);
    }

    #[test]
    fn order_status_codes() {
        assert_eq!(OrderStatus::from(1), OrderStatus::Open);
        assert_eq!(OrderStatus::from(3), OrderStatus::Filled);
        assert_eq!(OrderStatus::from(4), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::from(5), OrderStatus::PartiallyCancelled);
        assert_eq!(OrderStatus::from(42), OrderStatus::Unknown);
        assert!(!OrderStatus::Filled.is_active());
        assert_eq!(u8::from(OrderStatus::Cancelled), 4);
    }

    #[test]
    fn order_change_kinds() {
        let init: OrderChange = serde_json::from_str(r#"{"t":"init","d":[]}"#).unwrap();
        assert_eq!(init.kind, OrderChangeKind::Init);

        let update: OrderChange =
            serde_json::from_str(r#"{"t":"update","d":[{"address":"a1"}]}"#).unwrap();
        assert_eq!(update.kind, OrderChangeKind::Update);
        assert_eq!(update.orders[0].address, "a1");

        let other: OrderChange = serde_json::from_str(r#"{"t":"snapshot","d":[]}"#).unwrap();
        assert_eq!(other.kind, OrderChangeKind::Other);
    }

    #[test]
    fn single_update_wraps_one_order() {
        let order = Order {
            address: "a1".to_string(),
            ..Order::default()
        };
        let change = OrderChange::single_update(order.clone());
        assert_eq!(change.kind, OrderChangeKind::Update);
        assert_eq!(change.orders, vec![order]);
    }

    #[test]
    fn balance_change_aliases() {
        let json = r#"{"a":"TNVTdTSP","asset":"NVT","available":"12.5","freeze":"2.5"}"#;
        let balance: BalanceChange = serde_json::from_str(json).unwrap();

        assert_eq!(balance.address, "TNVTdTSP");
        assert_eq!(balance.frozen, Decimal::new(25, 1));
        assert_eq!(balance.total(), Decimal::from(15));
    }
}
