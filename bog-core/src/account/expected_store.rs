//! Expected store: what the system believes it has told the exchange to do
//! (spec.md §4.I). Owned by the live loop; a ring buffer plus TTL keeps
//! terminal orders bounded instead of growing forever.

use crate::core::{OrderStatus, Side};
use crate::execution::OrderRecord;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub symbol: String,
    pub side: Side,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpectedPosition {
    pub qty: Decimal,
    pub ts_ms: i64,
}

struct Entry {
    order: OrderRecord,
    recorded_at_ms: i64,
}

/// Default TTL for terminal orders: 86.4M ms (one day).
pub const DEFAULT_TTL_MS: i64 = 86_400_000;
pub const DEFAULT_CAPACITY: usize = 4096;

pub struct ExpectedStore {
    ttl_ms: i64,
    capacity: usize,
    orders: HashMap<String, Entry>,
    insertion_order: VecDeque<String>,
    positions: HashMap<(String, Side), ExpectedPosition>,
}

impl ExpectedStore {
    pub fn new(ttl_ms: i64, capacity: usize) -> Self {
        Self {
            ttl_ms,
            capacity,
            orders: HashMap::new(),
            insertion_order: VecDeque::new(),
            positions: HashMap::new(),
        }
    }

    pub fn record_order(&mut self, order: OrderRecord, ts_ms: i64) {
        let id = order.order_id.clone();
        if !self.orders.contains_key(&id) {
            self.insertion_order.push_back(id.clone());
        }
        self.orders.insert(
            id,
            Entry {
                order,
                recorded_at_ms: ts_ms,
            },
        );
        self.evict(ts_ms);
    }

    pub fn get_order(&self, order_id: &str) -> Option<&OrderRecord> {
        self.orders.get(order_id).map(|e| &e.order)
    }

    pub fn mark_filled(&mut self, order_id: &str) {
        if let Some(entry) = self.orders.get_mut(order_id) {
            entry.order.status = OrderStatus::Filled;
        }
    }

    pub fn mark_cancelled(&mut self, order_id: &str) {
        if let Some(entry) = self.orders.get_mut(order_id) {
            entry.order.status = OrderStatus::Cancelled;
        }
    }

    pub fn remove_order(&mut self, order_id: &str) {
        self.orders.remove(order_id);
        self.insertion_order.retain(|id| id != order_id);
    }

    pub fn get_active_orders(&self, now_ms: i64) -> Vec<&OrderRecord> {
        self.orders
            .values()
            .filter(|e| !e.order.status.is_terminal() && !self.is_expired(e, now_ms))
            .map(|e| &e.order)
            .collect()
    }

    /// Same as [`Self::get_active_orders`] but pairs each record with the
    /// `ts_ms` it was recorded at — the reconciler's grace-period check
    /// needs this to avoid flagging an order placed moments ago as missing.
    pub fn get_active_orders_with_recorded_ts(&self, now_ms: i64) -> Vec<(&OrderRecord, i64)> {
        self.orders
            .values()
            .filter(|e| !e.order.status.is_terminal() && !self.is_expired(e, now_ms))
            .map(|e| (&e.order, e.recorded_at_ms))
            .collect()
    }

    pub fn get_all_orders(&self) -> Vec<&OrderRecord> {
        self.orders.values().map(|e| &e.order).collect()
    }

    pub fn set_position(&mut self, symbol: impl Into<String>, side: Side, qty: Decimal, ts_ms: i64) {
        self.positions
            .insert((symbol.into(), side), ExpectedPosition { qty, ts_ms });
    }

    pub fn get_position(&self, symbol: &str, side: Side) -> Option<ExpectedPosition> {
        self.positions.get(&(symbol.to_string(), side)).copied()
    }

    pub fn get_all_positions(&self) -> Vec<((String, Side), ExpectedPosition)> {
        self.positions
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    pub fn clear(&mut self) {
        self.orders.clear();
        self.insertion_order.clear();
        self.positions.clear();
    }

    fn is_expired(&self, entry: &Entry, now_ms: i64) -> bool {
        entry.order.status.is_terminal() && now_ms.saturating_sub(entry.recorded_at_ms) > self.ttl_ms
    }

    /// Evicts TTL-expired terminal orders first; if still over capacity,
    /// evicts the oldest terminal order, then the oldest order of any kind.
    fn evict(&mut self, now_ms: i64) {
        let expired: Vec<String> = self
            .orders
            .iter()
            .filter(|(_, e)| self.is_expired(e, now_ms))
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.remove_order(&id);
        }

        while self.orders.len() > self.capacity {
            let victim = self
                .insertion_order
                .iter()
                .find(|id| {
                    self.orders
                        .get(*id)
                        .map(|e| e.order.status.is_terminal())
                        .unwrap_or(false)
                })
                .cloned()
                .or_else(|| self.insertion_order.front().cloned());
            match victim {
                Some(id) => self.remove_order(&id),
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(id: &str, status: OrderStatus) -> OrderRecord {
        OrderRecord {
            order_id: id.to_string(),
            side: Side::Buy,
            level_id: 1,
            price: dec!(100),
            qty: dec!(1),
            status,
        }
    }

    #[test]
    fn record_and_get_order() {
        let mut store = ExpectedStore::new(DEFAULT_TTL_MS, DEFAULT_CAPACITY);
        store.record_order(order("o1", OrderStatus::Open), 0);
        assert_eq!(store.get_order("o1").unwrap().status, OrderStatus::Open);
    }

    #[test]
    fn mark_filled_nonexistent_is_noop() {
        let mut store = ExpectedStore::new(DEFAULT_TTL_MS, DEFAULT_CAPACITY);
        store.mark_filled("missing");
        assert!(store.get_order("missing").is_none());
    }

    #[test]
    fn active_orders_exclude_terminal() {
        let mut store = ExpectedStore::new(DEFAULT_TTL_MS, DEFAULT_CAPACITY);
        store.record_order(order("o1", OrderStatus::Open), 0);
        store.record_order(order("o2", OrderStatus::Cancelled), 0);
        let active = store.get_active_orders(0);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].order_id, "o1");
        assert_eq!(store.get_all_orders().len(), 2);
    }

    #[test]
    fn ttl_evicts_expired_terminal_orders() {
        let mut store = ExpectedStore::new(1_000, DEFAULT_CAPACITY);
        store.record_order(order("o1", OrderStatus::Filled), 0);
        store.record_order(order("o2", OrderStatus::Open), 2_000);
        assert_eq!(store.get_all_orders().len(), 1);
        assert_eq!(store.get_all_orders()[0].order_id, "o2");
    }

    #[test]
    fn capacity_evicts_terminal_before_active() {
        let mut store = ExpectedStore::new(DEFAULT_TTL_MS, 2);
        store.record_order(order("o1", OrderStatus::Filled), 0);
        store.record_order(order("o2", OrderStatus::Open), 0);
        store.record_order(order("o3", OrderStatus::Open), 0);
        let ids: Vec<_> = store.get_all_orders().iter().map(|o| o.order_id.clone()).collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&"o1".to_string()));
    }

    #[test]
    fn positions_round_trip() {
        let mut store = ExpectedStore::new(DEFAULT_TTL_MS, DEFAULT_CAPACITY);
        store.set_position("BTCUSDT", Side::Buy, dec!(1.5), 10);
        assert_eq!(store.get_position("BTCUSDT", Side::Buy).unwrap().qty, dec!(1.5));
        assert!(store.get_position("ETHUSDT", Side::Buy).is_none());
    }

    #[test]
    fn clear_removes_everything() {
        let mut store = ExpectedStore::new(DEFAULT_TTL_MS, DEFAULT_CAPACITY);
        store.record_order(order("o1", OrderStatus::Open), 0);
        store.set_position("BTCUSDT", Side::Buy, dec!(1), 0);
        store.clear();
        assert!(store.get_all_orders().is_empty());
        assert!(store.get_all_positions().is_empty());
    }
}
