//! Shared value types used across every component: sides, order lifecycle
//! status, market snapshots, and the client-order-id scheme.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type as seen by the exchange port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
    PostOnly,
}

/// Time-in-force, part of an order's immutable-field set for the SOR (spec.md §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

/// Order lifecycle status. FILLED/CANCELLED/REJECTED/EXPIRED are terminal:
/// once reached, no further mutation is permitted (spec.md §3 invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    PendingNew,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }
}

/// A single market tick: best bid/ask and last trade, for one symbol at `ts_ms`.
/// Immutable; flows one-way through the core (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub symbol: String,
    pub ts_ms: i64,
    pub best_bid_price: Decimal,
    pub best_bid_qty: Decimal,
    pub best_ask_price: Decimal,
    pub best_ask_qty: Decimal,
    pub last_trade_price: Option<Decimal>,
    pub last_trade_qty: Option<Decimal>,
}

impl Snapshot {
    pub fn mid_price(&self) -> Decimal {
        (self.best_bid_price + self.best_ask_price) / Decimal::from(2)
    }

    pub fn spread(&self) -> Decimal {
        self.best_ask_price - self.best_bid_price
    }
}

/// Deterministic client-order-id builder. Wire format (spec.md §6):
/// `grinder_{strategy_id}_{symbol}_{level_id}_{ts_ms}_{seq}`.
/// The `grinder_` prefix identifies system-owned orders for safe cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientOrderId(pub String);

impl ClientOrderId {
    pub const PREFIX: &'static str = "grinder";

    pub fn build(strategy_id: &str, symbol: &str, level_id: u32, ts_ms: i64, seq: u32) -> Self {
        Self(format!(
            "{}_{strategy_id}_{symbol}_{level_id}_{ts_ms}_{seq}",
            Self::PREFIX
        ))
    }

    pub fn is_system_owned(raw: &str) -> bool {
        raw.starts_with(Self::PREFIX)
    }

    /// Strategy id embedded in the client order id, used to derive the
    /// remediation strategy allowlist (spec.md §4.I gate 5).
    pub fn strategy_id(&self) -> Option<&str> {
        self.0.strip_prefix("grinder_")?.split('_').next()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn client_order_id_round_trip() {
        let id = ClientOrderId::build("grid_v1", "BTCUSDT", 3, 1_700_000_000_000, 7);
        assert_eq!(id.as_str(), "grinder_grid_v1_BTCUSDT_3_1700000000000_7");
        assert!(ClientOrderId::is_system_owned(id.as_str()));
        assert_eq!(id.strategy_id(), Some("grid_v1"));
    }

    #[test]
    fn foreign_order_id_not_system_owned() {
        assert!(!ClientOrderId::is_system_owned("manual_order_42"));
    }

    #[test]
    fn mid_and_spread() {
        let snap = Snapshot {
            symbol: "BTCUSDT".into(),
            ts_ms: 1,
            best_bid_price: dec!(100),
            best_bid_qty: dec!(1),
            best_ask_price: dec!(101),
            best_ask_qty: dec!(1),
            last_trade_price: None,
            last_trade_qty: None,
        };
        assert_eq!(snap.mid_price(), dec!(100.5));
        assert_eq!(snap.spread(), dec!(1));
    }

    #[test]
    fn order_status_terminal() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(!OrderStatus::Open.is_terminal());
    }
}
