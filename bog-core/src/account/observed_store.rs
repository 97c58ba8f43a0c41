//! Observed store (spec.md §3, §4.I): the system's model of exchange truth,
//! ingested from both the WebSocket user-data stream and REST snapshots.
//! Last-writer-wins by identity key, except a terminal order status never
//! mutates again (spec.md §3 "Terminal latching").
//!
//! Keyed by `order_id` (the exchange-assigned identifier) rather than
//! `client_order_id`: this codebase's [`crate::execution::OrderRecord`]
//! (and therefore the expected store it is diffed against) only tracks
//! `order_id`, so the reconciler needs both sides to agree on that key.
//! `client_order_id` is still carried on every entry for ownership checks
//! (`grinder_` prefix) and audit logging.

use crate::core::{OrderStatus, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedOrder {
    pub client_order_id: String,
    pub symbol: String,
    pub order_id: String,
    pub side: Side,
    pub status: OrderStatus,
    pub price: Decimal,
    pub orig_qty: Decimal,
    pub executed_qty: Decimal,
    pub avg_price: Decimal,
    pub ts_observed: i64,
    pub source: String,
}

impl ObservedOrder {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedPosition {
    pub position_amt: Decimal,
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub ts_observed: i64,
}

/// Ingested exchange truth. Orders are keyed by `client_order_id`, positions
/// by `symbol` (spec.md §4.I). `last_snapshot_ts` tracks the maximum ingest
/// timestamp seen across both streams, for staleness reporting.
#[derive(Debug, Default)]
pub struct ObservedStore {
    orders: HashMap<String, ObservedOrder>,
    positions: HashMap<String, ObservedPosition>,
    last_snapshot_ts: i64,
}

impl ObservedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests one observed order. A no-op if the existing entry for this
    /// `order_id` is already terminal — terminal status never mutates
    /// (spec.md §3).
    pub fn ingest_order(&mut self, order: ObservedOrder) {
        if let Some(existing) = self.orders.get(&order.order_id) {
            if existing.is_terminal() {
                return;
            }
        }
        self.last_snapshot_ts = self.last_snapshot_ts.max(order.ts_observed);
        self.orders.insert(order.order_id.clone(), order);
    }

    pub fn ingest_position(&mut self, symbol: &str, position: ObservedPosition) {
        self.last_snapshot_ts = self.last_snapshot_ts.max(position.ts_observed);
        self.positions.insert(symbol.to_string(), position);
    }

    pub fn get_order(&self, order_id: &str) -> Option<&ObservedOrder> {
        self.orders.get(order_id)
    }

    pub fn get_position(&self, symbol: &str) -> Option<&ObservedPosition> {
        self.positions.get(symbol)
    }

    pub fn all_orders(&self) -> impl Iterator<Item = &ObservedOrder> {
        self.orders.values()
    }

    pub fn all_positions(&self) -> impl Iterator<Item = (&String, &ObservedPosition)> {
        self.positions.iter()
    }

    pub fn last_snapshot_ts(&self) -> i64 {
        self.last_snapshot_ts
    }

    pub fn clear(&mut self) {
        self.orders.clear();
        self.positions.clear();
        self.last_snapshot_ts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(client_order_id: &str, status: OrderStatus, ts: i64) -> ObservedOrder {
        ObservedOrder {
            client_order_id: client_order_id.to_string(),
            symbol: "BTCUSDT".to_string(),
            order_id: "12345678".to_string(),
            side: Side::Buy,
            status,
            price: dec!(42500.00),
            orig_qty: dec!(0.010),
            executed_qty: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            ts_observed: ts,
            source: "stream".to_string(),
        }
    }

    #[test]
    fn ingest_is_last_writer_wins_by_order_id() {
        let mut store = ObservedStore::new();
        store.ingest_order(order("co1", OrderStatus::Open, 1000));
        store.ingest_order(order("co2", OrderStatus::PartiallyFilled, 2000));
        assert_eq!(
            store.get_order("12345678").unwrap().status,
            OrderStatus::PartiallyFilled
        );
    }

    #[test]
    fn terminal_status_never_mutates() {
        let mut store = ObservedStore::new();
        store.ingest_order(order("co1", OrderStatus::Filled, 1000));
        store.ingest_order(order("co1", OrderStatus::Open, 2000));
        assert_eq!(
            store.get_order("12345678").unwrap().status,
            OrderStatus::Filled
        );
    }

    #[test]
    fn last_snapshot_ts_tracks_max_ingest_ts() {
        let mut store = ObservedStore::new();
        store.ingest_order(order("co1", OrderStatus::Open, 1000));
        store.ingest_position(
            "ETHUSDT",
            ObservedPosition {
                position_amt: dec!(1),
                entry_price: dec!(2000),
                unrealized_pnl: Decimal::ZERO,
                ts_observed: 5000,
            },
        );
        assert_eq!(store.last_snapshot_ts(), 5000);
    }

    #[test]
    fn positions_are_keyed_by_symbol() {
        let mut store = ObservedStore::new();
        store.ingest_position(
            "BTCUSDT",
            ObservedPosition {
                position_amt: dec!(0.01),
                entry_price: dec!(42000),
                unrealized_pnl: dec!(5),
                ts_observed: 1000,
            },
        );
        store.ingest_position(
            "BTCUSDT",
            ObservedPosition {
                position_amt: dec!(0.02),
                entry_price: dec!(42100),
                unrealized_pnl: dec!(6),
                ts_observed: 2000,
            },
        );
        assert_eq!(store.get_position("BTCUSDT").unwrap().position_amt, dec!(0.02));
    }
}
