//! Account syncer (spec.md §4.H): a thin, validating wrapper around
//! [`ExchangePort::fetch_account_snapshot`]. Every other component in this
//! module trusts that a snapshot reaching it has already passed these
//! checks.

use crate::core::ConnectorError;
use crate::ports::{AccountSnapshot, ExchangePort};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncMismatch {
    pub rule: String,
    pub detail: String,
}

impl SyncMismatch {
    pub fn new(rule: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            detail: detail.into(),
        }
    }
}

/// Outcome of one `AccountSyncer::sync` call. `ok()` is false on a fetch
/// error, any mismatch, or the absence of a snapshot — callers that only
/// care about "is it safe to reconcile against" should check `ok()` rather
/// than inspecting the fields individually.
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub snapshot: Option<AccountSnapshot>,
    pub mismatches: Vec<SyncMismatch>,
    pub error: Option<String>,
}

impl SyncResult {
    pub fn ok(&self) -> bool {
        self.error.is_none() && self.mismatches.is_empty() && self.snapshot.is_some()
    }

    /// Σ price·(qty − filled_qty) across the open orders in this snapshot;
    /// zero when the sync failed or produced no snapshot.
    pub fn pending_notional(&self) -> Decimal {
        self.snapshot
            .as_ref()
            .map(|s| {
                s.open_orders
                    .iter()
                    .map(|o| o.price * (o.quantity - o.filled_quantity))
                    .sum()
            })
            .unwrap_or(Decimal::ZERO)
    }
}

fn error_class(err: &ConnectorError) -> &'static str {
    match err {
        ConnectorError::Transient(_) => "ConnectorTransientError",
        ConnectorError::NonRetryable(_) => "ConnectorNonRetryableError",
        ConnectorError::Timeout { .. } => "ConnectorTimeoutError",
        ConnectorError::Closed => "ConnectorClosedError",
        ConnectorError::CircuitOpen { .. } => "CircuitOpenError",
    }
}

/// Drives the exchange port and validates the result before it reaches the
/// reconciler. Holds only the last accepted `ts_ms`; every other field is
/// recomputed from scratch on each call, so a syncer has no state beyond a
/// single integer.
pub struct AccountSyncer {
    port: Arc<dyn ExchangePort>,
    last_ts: Mutex<i64>,
}

impl AccountSyncer {
    pub fn new(port: Arc<dyn ExchangePort>) -> Self {
        Self {
            port,
            last_ts: Mutex::new(0),
        }
    }

    pub fn last_ts(&self) -> i64 {
        *self.last_ts.lock()
    }

    pub fn reset(&self) {
        *self.last_ts.lock() = 0;
    }

    pub async fn sync(&self, known_order_ids: Option<&HashSet<String>>) -> SyncResult {
        let snapshot = match self.port.fetch_account_snapshot().await {
            Ok(s) => s,
            Err(e) => {
                return SyncResult {
                    snapshot: None,
                    mismatches: Vec::new(),
                    error: Some(format!("{}: {}", error_class(&e), e)),
                };
            }
        };

        let mut mismatches = Vec::new();

        {
            let mut last_ts = self.last_ts.lock();
            if snapshot.ts_ms < *last_ts {
                mismatches.push(SyncMismatch::new(
                    "ts_regression",
                    format!("ts {} < last_ts {}", snapshot.ts_ms, *last_ts),
                ));
            } else {
                *last_ts = snapshot.ts_ms;
            }
        }

        let mut position_keys: HashMap<(String, crate::core::Side), u32> = HashMap::new();
        for pos in &snapshot.positions {
            let key = (pos.symbol.clone(), pos.side);
            *position_keys.entry(key).or_insert(0) += 1;
            if pos.quantity < Decimal::ZERO {
                mismatches.push(SyncMismatch::new(
                    "negative_qty",
                    format!("position {}/{:?} qty={}", pos.symbol, pos.side, pos.quantity),
                ));
            }
        }
        for ((symbol, side), count) in &position_keys {
            if *count > 1 {
                mismatches.push(SyncMismatch::new(
                    "duplicate_key",
                    format!("duplicate position key {symbol}/{side:?}"),
                ));
            }
        }

        let mut order_ids: HashMap<String, u32> = HashMap::new();
        for order in &snapshot.open_orders {
            *order_ids.entry(order.order_id.clone()).or_insert(0) += 1;
            if order.quantity < Decimal::ZERO {
                mismatches.push(SyncMismatch::new(
                    "negative_qty",
                    format!("order {} qty={}", order.order_id, order.quantity),
                ));
            }
            if let Some(known) = known_order_ids {
                if !known.contains(&order.order_id) {
                    mismatches.push(SyncMismatch::new(
                        "orphan_order",
                        format!("order {} not in known set", order.order_id),
                    ));
                }
            }
        }
        for (order_id, count) in &order_ids {
            if *count > 1 {
                mismatches.push(SyncMismatch::new(
                    "duplicate_key",
                    format!("duplicate order id {order_id}"),
                ));
            }
        }

        SyncResult {
            snapshot: Some(snapshot),
            mismatches,
            error: None,
        }
    }

    /// Σ |qty|·mark_price across `snapshot`'s positions. Used by the FSM's
    /// EMERGENCY-recovery gate to decide whether the account is flat.
    pub fn compute_position_notional(snapshot: &AccountSnapshot) -> Decimal {
        snapshot
            .positions
            .iter()
            .map(|p| p.quantity.abs() * p.mark_price)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OrderStatus, Side};
    use crate::ports::{ExchangeOrder, ExchangePosition};
    use crate::testing::{MockExchangePort, MockFailure};
    use rust_decimal_macros::dec;

    fn pos(symbol: &str, side: Side, qty: rust_decimal::Decimal) -> ExchangePosition {
        ExchangePosition {
            symbol: symbol.to_string(),
            side,
            quantity: qty,
            entry_price: dec!(50000.00),
            mark_price: dec!(50100.00),
            unrealized_pnl: dec!(150.00),
        }
    }

    fn order(order_id: &str, price: rust_decimal::Decimal, qty: rust_decimal::Decimal, filled: rust_decimal::Decimal) -> ExchangeOrder {
        ExchangeOrder {
            order_id: order_id.to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            price,
            quantity: qty,
            filled_quantity: filled,
            status: OrderStatus::Open,
        }
    }

    fn snapshot(
        positions: Vec<ExchangePosition>,
        open_orders: Vec<ExchangeOrder>,
        ts_ms: i64,
    ) -> AccountSnapshot {
        AccountSnapshot {
            positions,
            open_orders,
            ts_ms,
            source: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn clean_sync_has_no_mismatches_and_updates_last_ts() {
        let port = MockExchangePort::new();
        port.set_account_snapshot(snapshot(
            vec![pos("BTCUSDT", Side::Buy, dec!(1.5))],
            vec![order("ord_1", dec!(49000), dec!(0.01), Decimal::ZERO)],
            2000,
        ));
        let syncer = AccountSyncer::new(Arc::new(port));

        let result = syncer.sync(None).await;
        assert!(result.ok());
        assert_eq!(syncer.last_ts(), 2000);
    }

    #[tokio::test]
    async fn duplicate_position_key_is_flagged() {
        let port = MockExchangePort::new();
        port.set_account_snapshot(snapshot(
            vec![
                pos("BTCUSDT", Side::Buy, dec!(1.0)),
                pos("BTCUSDT", Side::Buy, dec!(2.0)),
            ],
            vec![],
            1000,
        ));
        let syncer = AccountSyncer::new(Arc::new(port));

        let result = syncer.sync(None).await;
        assert!(!result.ok());
        assert!(result.mismatches.iter().any(|m| m.rule == "duplicate_key"));
    }

    #[tokio::test]
    async fn duplicate_order_id_is_flagged() {
        let port = MockExchangePort::new();
        port.set_account_snapshot(snapshot(
            vec![],
            vec![
                order("dup", dec!(100), dec!(1), Decimal::ZERO),
                order("dup", dec!(101), dec!(1), Decimal::ZERO),
            ],
            1000,
        ));
        let syncer = AccountSyncer::new(Arc::new(port));

        let result = syncer.sync(None).await;
        assert!(result.mismatches.iter().any(|m| m.rule == "duplicate_key"));
    }

    #[tokio::test]
    async fn ts_regression_is_detected_and_does_not_update_last_ts() {
        let port = MockExchangePort::new();
        port.set_account_snapshot(snapshot(vec![], vec![], 5000));
        let syncer = AccountSyncer::new(Arc::new(port));
        syncer.sync(None).await;
        assert_eq!(syncer.last_ts(), 5000);

        let port2 = MockExchangePort::new();
        port2.set_account_snapshot(snapshot(vec![], vec![], 3000));
        let syncer2 = AccountSyncer::new(Arc::new(port2));
        *syncer2.last_ts.lock() = 5000;

        let result = syncer2.sync(None).await;
        assert!(result.mismatches.iter().any(|m| m.rule == "ts_regression"));
        assert_eq!(syncer2.last_ts(), 5000);
    }

    #[tokio::test]
    async fn equal_ts_is_not_a_regression() {
        let port = MockExchangePort::new();
        port.set_account_snapshot(snapshot(vec![], vec![], 5000));
        let syncer = AccountSyncer::new(Arc::new(port));
        syncer.sync(None).await;

        let result = syncer.sync(None).await;
        assert!(!result.mismatches.iter().any(|m| m.rule == "ts_regression"));
    }

    #[tokio::test]
    async fn negative_qty_is_flagged_for_positions_and_orders() {
        let port = MockExchangePort::new();
        port.set_account_snapshot(snapshot(
            vec![pos("BTCUSDT", Side::Buy, dec!(-1))],
            vec![order("o1", dec!(100), dec!(-0.5), Decimal::ZERO)],
            1000,
        ));
        let syncer = AccountSyncer::new(Arc::new(port));

        let result = syncer.sync(None).await;
        assert_eq!(
            result
                .mismatches
                .iter()
                .filter(|m| m.rule == "negative_qty")
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn zero_qty_is_not_flagged() {
        let port = MockExchangePort::new();
        port.set_account_snapshot(snapshot(
            vec![pos("BTCUSDT", Side::Buy, Decimal::ZERO)],
            vec![],
            1000,
        ));
        let syncer = AccountSyncer::new(Arc::new(port));

        let result = syncer.sync(None).await;
        assert!(!result.mismatches.iter().any(|m| m.rule == "negative_qty"));
    }

    #[tokio::test]
    async fn orphan_order_only_checked_when_known_ids_supplied() {
        let port = MockExchangePort::new();
        port.set_account_snapshot(snapshot(
            vec![],
            vec![order("exchange_only", dec!(100), dec!(1), Decimal::ZERO)],
            1000,
        ));
        let syncer = AccountSyncer::new(Arc::new(port));

        let unchecked = syncer.sync(None).await;
        assert!(!unchecked.mismatches.iter().any(|m| m.rule == "orphan_order"));

        let known: HashSet<String> = ["internal_1".to_string(), "internal_2".to_string()]
            .into_iter()
            .collect();
        let checked = syncer.sync(Some(&known)).await;
        assert!(checked.mismatches.iter().any(|m| m.rule == "orphan_order"));
    }

    #[tokio::test]
    async fn fetch_error_is_recorded_without_mutating_last_ts() {
        let port = MockExchangePort::new();
        port.fail_next("fetch_account_snapshot", MockFailure::Transient);
        let syncer = AccountSyncer::new(Arc::new(port));

        let result = syncer.sync(None).await;
        assert!(!result.ok());
        assert!(result.error.unwrap().contains("ConnectorTransientError"));
        assert_eq!(syncer.last_ts(), 0);
    }

    #[test]
    fn pending_notional_sums_remaining_order_quantity() {
        let result = SyncResult {
            snapshot: Some(snapshot(
                vec![],
                vec![
                    order("ord_1", dec!(50000), dec!(0.1), Decimal::ZERO),
                    order("ord_2", dec!(49000), dec!(0.05), dec!(0.01)),
                ],
                1000,
            )),
            mismatches: Vec::new(),
            error: None,
        };
        assert_eq!(result.pending_notional(), dec!(6960.00));
    }

    #[test]
    fn compute_position_notional_sums_absolute_qty_times_mark() {
        let snap = snapshot(
            vec![
                ExchangePosition {
                    symbol: "BTCUSDT".to_string(),
                    side: Side::Buy,
                    quantity: dec!(0.002),
                    entry_price: dec!(64000),
                    mark_price: dec!(65000),
                    unrealized_pnl: dec!(2.0),
                },
                ExchangePosition {
                    symbol: "ETHUSDT".to_string(),
                    side: Side::Buy,
                    quantity: dec!(0.01),
                    entry_price: dec!(3400),
                    mark_price: dec!(3500),
                    unrealized_pnl: dec!(1.0),
                },
            ],
            vec![],
            1000,
        );
        assert_eq!(
            AccountSyncer::compute_position_notional(&snap),
            dec!(165.00)
        );
    }

    #[test]
    fn compute_position_notional_is_zero_for_empty_positions() {
        let snap = snapshot(vec![], vec![], 1000);
        assert_eq!(AccountSyncer::compute_position_notional(&snap), Decimal::ZERO);
    }
}
