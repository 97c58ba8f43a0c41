//! Reconciler (spec.md §4.I): diffs the expected store's active orders and
//! positions for one symbol against the observed store, producing
//! low-cardinality mismatches the remediation executor may act on.

use crate::account::expected_store::ExpectedStore;
use crate::account::observed_store::ObservedStore;
use crate::core::OrderStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconcileMismatchType {
    OrderMissingOnExchange,
    OrderExistsUnexpected,
    OrderStatusDivergence,
    PositionNonzeroUnexpected,
}

impl ReconcileMismatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReconcileMismatchType::OrderMissingOnExchange => "ORDER_MISSING_ON_EXCHANGE",
            ReconcileMismatchType::OrderExistsUnexpected => "ORDER_EXISTS_UNEXPECTED",
            ReconcileMismatchType::OrderStatusDivergence => "ORDER_STATUS_DIVERGENCE",
            ReconcileMismatchType::PositionNonzeroUnexpected => "POSITION_NONZERO_UNEXPECTED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileMismatch {
    pub mismatch_type: ReconcileMismatchType,
    pub symbol: String,
    pub order_id: Option<String>,
    pub ts_detected: i64,
    pub action_plan: String,
}

/// Knobs for the diff itself; periodic-run scheduling (interval, retry
/// delay, retry count) is an orchestrator concern and lives outside this
/// pure function.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Orders recorded more recently than this are not yet flagged missing
    /// — the exchange echo may simply not have arrived.
    pub order_grace_period_ms: i64,
    pub symbol_filter: Option<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            order_grace_period_ms: 5_000,
            symbol_filter: None,
        }
    }
}

/// Diffs `expected`'s active orders/position for `symbol` against
/// `observed`. A `None` `symbol_filter` reconciles every symbol the caller
/// passes in; a `Some` filter that doesn't match `symbol` short-circuits to
/// an empty diff (the orchestrator calls this once per tracked symbol).
pub fn reconcile(
    symbol: &str,
    expected: &ExpectedStore,
    observed: &ObservedStore,
    config: &ReconcileConfig,
    now_ms: i64,
) -> Vec<ReconcileMismatch> {
    let mut mismatches = Vec::new();

    if let Some(filter) = &config.symbol_filter {
        if filter != symbol {
            return mismatches;
        }
    }

    let expected_orders = expected.get_active_orders_with_recorded_ts(now_ms);
    let expected_ids: HashSet<&str> = expected_orders
        .iter()
        .map(|(order, _)| order.order_id.as_str())
        .collect();

    for (order, recorded_at_ms) in &expected_orders {
        if order.order_id.starts_with("pending:") {
            continue;
        }
        match observed.get_order(&order.order_id) {
            None => {
                let within_grace =
                    now_ms.saturating_sub(*recorded_at_ms) < config.order_grace_period_ms;
                if !within_grace {
                    mismatches.push(ReconcileMismatch {
                        mismatch_type: ReconcileMismatchType::OrderMissingOnExchange,
                        symbol: symbol.to_string(),
                        order_id: Some(order.order_id.clone()),
                        ts_detected: now_ms,
                        action_plan: format!("would cancel order {}", order.order_id),
                    });
                }
            }
            Some(obs) => {
                if status_diverges(order.status, obs.status) {
                    mismatches.push(ReconcileMismatch {
                        mismatch_type: ReconcileMismatchType::OrderStatusDivergence,
                        symbol: symbol.to_string(),
                        order_id: Some(order.order_id.clone()),
                        ts_detected: now_ms,
                        action_plan: format!(
                            "expected {:?}, observed {:?} for order {}",
                            order.status, obs.status, order.order_id
                        ),
                    });
                }
            }
        }
    }

    for obs in observed.all_orders() {
        if obs.symbol != symbol || obs.is_terminal() {
            continue;
        }
        if !expected_ids.contains(obs.order_id.as_str())
            && crate::core::ClientOrderId::is_system_owned(&obs.client_order_id)
        {
            mismatches.push(ReconcileMismatch {
                mismatch_type: ReconcileMismatchType::OrderExistsUnexpected,
                symbol: symbol.to_string(),
                order_id: Some(obs.order_id.clone()),
                ts_detected: now_ms,
                action_plan: format!("would cancel unexpected order {}", obs.order_id),
            });
        }
    }

    let expected_position_qty: Decimal = expected
        .get_all_positions()
        .into_iter()
        .filter(|((sym, _), _)| sym == symbol)
        .map(|(_, pos)| pos.qty)
        .sum();
    if let Some(obs_pos) = observed.get_position(symbol) {
        if obs_pos.position_amt != Decimal::ZERO && expected_position_qty == Decimal::ZERO {
            mismatches.push(ReconcileMismatch {
                mismatch_type: ReconcileMismatchType::PositionNonzeroUnexpected,
                symbol: symbol.to_string(),
                order_id: None,
                ts_detected: now_ms,
                action_plan: format!("would flatten position {symbol}"),
            });
        }
    }

    mismatches
}

fn status_diverges(expected: OrderStatus, observed: OrderStatus) -> bool {
    use OrderStatus::*;
    match (expected, observed) {
        (a, b) if a == b => false,
        (Open, PartiallyFilled) | (PartiallyFilled, Open) => false,
        _ => true,
    }
}
