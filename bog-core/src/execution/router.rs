//! Smart-order router: pure per-level AMEND vs CANCEL_REPLACE vs NOOP vs
//! BLOCK decision (spec.md §4.F).
//! Grounded on `examples/original_source/src/grinder/execution/smart_order_router.py`.

use crate::core::{Side, TimeInForce};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::BTreeMap;

pub const PRICE_EPS_TICKS_DEFAULT: i64 = 1;
pub const QTY_EPS_STEPS_DEFAULT: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterDecision {
    Noop,
    Amend,
    CancelReplace,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExistingOrder {
    pub price: Decimal,
    pub qty: Decimal,
    pub side: Side,
    pub reduce_only: bool,
    pub time_in_force: TimeInForce,
}

/// Desired target for this grid level. Distinct from `fsm::OrderIntent`,
/// which gates coarse risk direction rather than a concrete price/qty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteIntent {
    pub price: Decimal,
    pub qty: Decimal,
    pub side: Side,
    pub reduce_only: bool,
    pub time_in_force: TimeInForce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketSnapshot {
    pub best_bid: Decimal,
    pub best_ask: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeFilters {
    pub tick_size: Decimal,
    pub step_size: Decimal,
    pub min_qty: Decimal,
    pub min_notional: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenueCaps {
    pub supports_amend_price: bool,
    pub supports_amend_qty: bool,
}

impl Default for VenueCaps {
    fn default() -> Self {
        Self {
            supports_amend_price: true,
            supports_amend_qty: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateBudgets {
    pub updates_remaining: i64,
    pub cancel_replace_remaining: i64,
}

impl Default for UpdateBudgets {
    fn default() -> Self {
        Self {
            updates_remaining: 100,
            cancel_replace_remaining: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterInputs {
    pub intent: RouteIntent,
    pub existing: Option<ExistingOrder>,
    pub market: MarketSnapshot,
    pub filters: ExchangeFilters,
    pub venue_caps: VenueCaps,
    pub budgets: UpdateBudgets,
    pub drawdown_breached: bool,
    pub price_eps_ticks: i64,
    pub qty_eps_steps: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResult {
    pub decision: RouterDecision,
    pub reason: &'static str,
    pub amend_price: Option<Decimal>,
    pub amend_qty: Option<Decimal>,
    pub new_price: Option<Decimal>,
    pub new_qty: Option<Decimal>,
    pub details: BTreeMap<String, String>,
}

impl RouteResult {
    fn block(reason: &'static str, details: BTreeMap<String, String>) -> Self {
        Self {
            decision: RouterDecision::Block,
            reason,
            amend_price: None,
            amend_qty: None,
            new_price: None,
            new_qty: None,
            details,
        }
    }

    fn noop(reason: &'static str, details: BTreeMap<String, String>) -> Self {
        Self {
            decision: RouterDecision::Noop,
            reason,
            amend_price: None,
            amend_qty: None,
            new_price: None,
            new_qty: None,
            details,
        }
    }

    fn cancel_replace(
        reason: &'static str,
        new_price: Decimal,
        new_qty: Decimal,
        details: BTreeMap<String, String>,
    ) -> Self {
        Self {
            decision: RouterDecision::CancelReplace,
            reason,
            amend_price: None,
            amend_qty: None,
            new_price: Some(new_price),
            new_qty: Some(new_qty),
            details,
        }
    }

    fn amend(
        amend_price: Option<Decimal>,
        amend_qty: Option<Decimal>,
        details: BTreeMap<String, String>,
    ) -> Self {
        Self {
            decision: RouterDecision::Amend,
            reason: "AMEND_SUPPORTED_AND_SAFE",
            amend_price,
            amend_qty,
            new_price: None,
            new_qty: None,
            details,
        }
    }
}

fn would_cross_spread(intent: &RouteIntent, market: &MarketSnapshot) -> bool {
    match intent.side {
        Side::Buy => intent.price >= market.best_ask,
        Side::Sell => intent.price <= market.best_bid,
    }
}

fn floor_to_step(qty: Decimal, step_size: Decimal) -> Decimal {
    if step_size <= Decimal::ZERO {
        return qty;
    }
    (qty / step_size).trunc() * step_size
}

fn check_filters(intent: &RouteIntent, filters: &ExchangeFilters) -> Option<&'static str> {
    if filters.tick_size > Decimal::ZERO && intent.price % filters.tick_size != Decimal::ZERO {
        return Some("FILTER_VIOLATION_TICK_SIZE");
    }
    if filters.step_size > Decimal::ZERO && floor_to_step(intent.qty, filters.step_size) != intent.qty {
        return Some("FILTER_VIOLATION_STEP_SIZE");
    }
    if intent.qty < filters.min_qty {
        return Some("FILTER_VIOLATION_MIN_QTY");
    }
    if intent.qty * intent.price < filters.min_notional {
        return Some("FILTER_VIOLATION_MIN_NOTIONAL");
    }
    None
}

fn price_delta_ticks(a: Decimal, b: Decimal, tick_size: Decimal) -> i64 {
    if tick_size <= Decimal::ZERO {
        return 0;
    }
    ((a - b).abs() / tick_size).trunc().to_i64().unwrap_or(i64::MAX)
}

fn qty_delta_steps(a: Decimal, b: Decimal, step_size: Decimal) -> i64 {
    if step_size <= Decimal::ZERO {
        return 0;
    }
    ((a - b).abs() / step_size).trunc().to_i64().unwrap_or(i64::MAX)
}

fn has_immutable_change(intent: &RouteIntent, existing: &ExistingOrder) -> bool {
    intent.reduce_only != existing.reduce_only || intent.time_in_force != existing.time_in_force
}

/// Pure routing decision for a single grid level. Decision priority, first
/// match wins: hard blocks, budget exhaustion, no-existing-order placement,
/// immutable-field changes, epsilon no-op, amend, fallback cancel-replace.
pub fn route(inputs: &RouterInputs) -> RouteResult {
    let intent = &inputs.intent;
    let market = &inputs.market;
    let filters = &inputs.filters;

    if would_cross_spread(intent, market) {
        let mut details = BTreeMap::new();
        details.insert("best_bid".to_string(), market.best_bid.to_string());
        details.insert("best_ask".to_string(), market.best_ask.to_string());
        return RouteResult::block("WOULD_CROSS_SPREAD", details);
    }

    if let Some(reason) = check_filters(intent, filters) {
        let mut details = BTreeMap::new();
        details.insert("intent_price".to_string(), intent.price.to_string());
        details.insert("intent_qty".to_string(), intent.qty.to_string());
        return RouteResult::block(reason, details);
    }

    if inputs.drawdown_breached {
        return RouteResult::block("DRAWDOWN_GATE_ACTIVE", BTreeMap::new());
    }

    if inputs.budgets.updates_remaining <= 0 {
        return RouteResult::noop("RATE_LIMIT_THROTTLE", BTreeMap::new());
    }

    let Some(existing) = &inputs.existing else {
        if inputs.budgets.cancel_replace_remaining <= 0 {
            return RouteResult::noop("RATE_LIMIT_THROTTLE", BTreeMap::new());
        }
        return RouteResult::cancel_replace(
            "NO_EXISTING_ORDER",
            intent.price,
            intent.qty,
            BTreeMap::new(),
        );
    };

    let price_ticks = price_delta_ticks(intent.price, existing.price, filters.tick_size);
    let qty_steps = qty_delta_steps(intent.qty, existing.qty, filters.step_size);

    if has_immutable_change(intent, existing) {
        if inputs.budgets.cancel_replace_remaining <= 0 {
            return RouteResult::noop("RATE_LIMIT_THROTTLE", BTreeMap::new());
        }
        return RouteResult::cancel_replace(
            "CANCEL_REPLACE_REQUIRED_IMMUTABLE_FIELD",
            intent.price,
            intent.qty,
            BTreeMap::new(),
        );
    }

    if price_ticks < inputs.price_eps_ticks && qty_steps < inputs.qty_eps_steps {
        let mut details = BTreeMap::new();
        details.insert("price_delta_ticks".to_string(), price_ticks.to_string());
        details.insert("qty_delta_steps".to_string(), qty_steps.to_string());
        return RouteResult::noop("NO_CHANGE_BELOW_EPS", details);
    }

    let need_amend_price = price_ticks >= inputs.price_eps_ticks;
    let need_amend_qty = qty_steps >= inputs.qty_eps_steps;
    let amend_possible = (!need_amend_price || inputs.venue_caps.supports_amend_price)
        && (!need_amend_qty || inputs.venue_caps.supports_amend_qty);

    if amend_possible {
        return RouteResult::amend(
            need_amend_price.then_some(intent.price),
            need_amend_qty.then_some(intent.qty),
            BTreeMap::new(),
        );
    }

    if inputs.budgets.cancel_replace_remaining <= 0 {
        return RouteResult::noop("RATE_LIMIT_THROTTLE", BTreeMap::new());
    }

    RouteResult::cancel_replace("AMEND_UNSUPPORTED", intent.price, intent.qty, BTreeMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_inputs(intent: RouteIntent, existing: Option<ExistingOrder>) -> RouterInputs {
        RouterInputs {
            intent,
            existing,
            market: MarketSnapshot {
                best_bid: dec!(99),
                best_ask: dec!(101),
            },
            filters: ExchangeFilters {
                tick_size: dec!(0.1),
                step_size: dec!(0.001),
                min_qty: dec!(0.001),
                min_notional: dec!(1),
            },
            venue_caps: VenueCaps::default(),
            budgets: UpdateBudgets::default(),
            drawdown_breached: false,
            price_eps_ticks: PRICE_EPS_TICKS_DEFAULT,
            qty_eps_steps: QTY_EPS_STEPS_DEFAULT,
        }
    }

    fn intent(side: Side, price: Decimal, qty: Decimal) -> RouteIntent {
        RouteIntent {
            price,
            qty,
            side,
            reduce_only: false,
            time_in_force: TimeInForce::Gtc,
        }
    }

    #[test]
    fn buy_crossing_ask_is_blocked() {
        let inputs = base_inputs(intent(Side::Buy, dec!(101), dec!(0.01)), None);
        let result = route(&inputs);
        assert_eq!(result.decision, RouterDecision::Block);
        assert_eq!(result.reason, "WOULD_CROSS_SPREAD");
    }

    #[test]
    fn tick_size_violation_is_blocked() {
        let inputs = base_inputs(intent(Side::Buy, dec!(95.05), dec!(0.01)), None);
        let result = route(&inputs);
        assert_eq!(result.decision, RouterDecision::Block);
        assert_eq!(result.reason, "FILTER_VIOLATION_TICK_SIZE");
    }

    #[test]
    fn no_existing_order_places_via_cancel_replace() {
        let inputs = base_inputs(intent(Side::Buy, dec!(95), dec!(0.01)), None);
        let result = route(&inputs);
        assert_eq!(result.decision, RouterDecision::CancelReplace);
        assert_eq!(result.reason, "NO_EXISTING_ORDER");
        assert_eq!(result.new_price, Some(dec!(95)));
    }

    #[test]
    fn no_change_within_epsilon_is_noop() {
        let existing = ExistingOrder {
            price: dec!(95),
            qty: dec!(0.01),
            side: Side::Buy,
            reduce_only: false,
            time_in_force: TimeInForce::Gtc,
        };
        let inputs = base_inputs(intent(Side::Buy, dec!(95), dec!(0.01)), Some(existing));
        let result = route(&inputs);
        assert_eq!(result.decision, RouterDecision::Noop);
        assert_eq!(result.reason, "NO_CHANGE_BELOW_EPS");
    }

    #[test]
    fn meaningful_price_change_amends() {
        let existing = ExistingOrder {
            price: dec!(95),
            qty: dec!(0.01),
            side: Side::Buy,
            reduce_only: false,
            time_in_force: TimeInForce::Gtc,
        };
        let inputs = base_inputs(intent(Side::Buy, dec!(95.5), dec!(0.01)), Some(existing));
        let result = route(&inputs);
        assert_eq!(result.decision, RouterDecision::Amend);
        assert_eq!(result.amend_price, Some(dec!(95.5)));
    }

    #[test]
    fn amend_unsupported_falls_back_to_cancel_replace() {
        let existing = ExistingOrder {
            price: dec!(95),
            qty: dec!(0.01),
            side: Side::Buy,
            reduce_only: false,
            time_in_force: TimeInForce::Gtc,
        };
        let mut inputs = base_inputs(intent(Side::Buy, dec!(95.5), dec!(0.01)), Some(existing));
        inputs.venue_caps.supports_amend_price = false;
        let result = route(&inputs);
        assert_eq!(result.decision, RouterDecision::CancelReplace);
        assert_eq!(result.reason, "AMEND_UNSUPPORTED");
    }

    #[test]
    fn immutable_field_change_requires_cancel_replace() {
        let existing = ExistingOrder {
            price: dec!(95),
            qty: dec!(0.01),
            side: Side::Buy,
            reduce_only: false,
            time_in_force: TimeInForce::Gtc,
        };
        let mut desired = intent(Side::Buy, dec!(95), dec!(0.01));
        desired.time_in_force = TimeInForce::Ioc;
        let inputs = base_inputs(desired, Some(existing));
        let result = route(&inputs);
        assert_eq!(result.decision, RouterDecision::CancelReplace);
        assert_eq!(result.reason, "CANCEL_REPLACE_REQUIRED_IMMUTABLE_FIELD");
    }

    #[test]
    fn drawdown_breached_blocks() {
        let mut inputs = base_inputs(intent(Side::Buy, dec!(95), dec!(0.01)), None);
        inputs.drawdown_breached = true;
        let result = route(&inputs);
        assert_eq!(result.decision, RouterDecision::Block);
        assert_eq!(result.reason, "DRAWDOWN_GATE_ACTIVE");
    }

    #[test]
    fn exhausted_budget_noops() {
        let mut inputs = base_inputs(intent(Side::Buy, dec!(95), dec!(0.01)), None);
        inputs.budgets.updates_remaining = 0;
        let result = route(&inputs);
        assert_eq!(result.decision, RouterDecision::Noop);
        assert_eq!(result.reason, "RATE_LIMIT_THROTTLE");
    }
}
