//! Grid-level computation and desired-vs-observed reconciliation
//! (spec.md §3, §4.E). `evaluate` is a pure function of its arguments: it
//! proposes actions and a tentative next state but performs no I/O. New
//! placements carry a pending, not-yet-exchange-assigned order id until the
//! caller confirms them with [`confirm_placement`] after a successful wire
//! call (spec.md §4.E "state application").
//!
//! Grounded on `examples/original_source/src/grinder/execution/engine.py`.

use super::types::{
    ActionType, EvaluateResult, ExecutionAction, ExecutionEvent, ExecutionState, GridLevel,
    GridMode, GridPlan, OrderRecord, ResetAction,
};
use crate::core::{OrderStatus, Side};
use rust_decimal::Decimal;
use serde_json::json;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub price_precision: u32,
    pub quantity_precision: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            price_precision: 2,
            quantity_precision: 3,
        }
    }
}

fn round_down(value: Decimal, precision: u32) -> Decimal {
    value.trunc_with_scale(precision)
}

/// SHA-256 (first 16 hex chars) of canonical JSON of the plan's identity
/// fields. Used to detect replan identity, not content equality of state.
pub fn plan_digest(plan: &GridPlan) -> String {
    let value = json!({
        "mode": format!("{:?}", plan.mode),
        "center_price": plan.center_price.to_string(),
        "spacing_bps": plan.spacing_bps,
        "levels_up": plan.levels_up,
        "levels_down": plan.levels_down,
        "size_schedule": plan.size_schedule.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        "skew_bps": plan.skew_bps,
        "reset_action": format!("{:?}", plan.reset_action),
    });
    let canonical = serde_json::to_string(&value).expect("plan digest payload is always valid JSON");
    let digest = hex::encode(Sha256::digest(canonical.as_bytes()));
    digest[..16].to_string()
}

fn compute_grid_levels(plan: &GridPlan, config: &EngineConfig) -> Vec<GridLevel> {
    if matches!(plan.mode, GridMode::Pause | GridMode::Emergency) {
        return Vec::new();
    }

    let mut levels = Vec::new();
    let skew_factor = Decimal::ONE + Decimal::from(plan.skew_bps) / Decimal::from(10_000);
    let skewed_center = plan.center_price * skew_factor;
    let spacing_up = Decimal::ONE + Decimal::from(plan.spacing_bps) / Decimal::from(10_000);
    let spacing_down = Decimal::ONE - Decimal::from(plan.spacing_bps) / Decimal::from(10_000);

    let size_for = |i: u32| -> Decimal {
        let idx = (i as usize - 1).min(plan.size_schedule.len().saturating_sub(1));
        round_down(plan.size_schedule[idx], config.quantity_precision)
    };

    if !matches!(plan.mode, GridMode::LongOnly) {
        for i in 1..=plan.levels_up {
            let price = round_down(skewed_center * spacing_up.powi(i as i64), config.price_precision);
            levels.push(GridLevel {
                side: Side::Sell,
                level_id: i,
                price,
                qty: size_for(i),
            });
        }
    }

    if !matches!(plan.mode, GridMode::ShortOnly) {
        for i in 1..=plan.levels_down {
            let price = round_down(skewed_center * spacing_down.powi(i as i64), config.price_precision);
            levels.push(GridLevel {
                side: Side::Buy,
                level_id: i,
                price,
                qty: size_for(i),
            });
        }
    }

    levels
}

fn is_active(record: &OrderRecord) -> bool {
    matches!(record.status, OrderStatus::Open | OrderStatus::PartiallyFilled)
}

/// Computes the desired ladder from `plan`, reconciles it against `state`'s
/// open orders, and returns proposed actions plus a tentative next state.
pub fn evaluate(
    plan: &GridPlan,
    symbol: &str,
    state: &ExecutionState,
    ts_ms: i64,
    config: &EngineConfig,
) -> EvaluateResult {
    let digest = plan_digest(plan);
    let current: Vec<&OrderRecord> = state.open_orders.values().filter(|o| is_active(o)).collect();

    if matches!(plan.mode, GridMode::Pause | GridMode::Emergency) {
        let actions: Vec<ExecutionAction> = current
            .iter()
            .map(|o| cancel_action(symbol, o, &format!("MODE_{:?}", plan.mode)))
            .collect();
        let cancelled_count = actions.len();
        let new_state = apply_actions(state, &actions, ts_ms);
        let events = vec![ExecutionEvent {
            ts_ms,
            symbol: symbol.to_string(),
            placed_count: 0,
            cancelled_count,
            reset_action: plan.reset_action,
        }];
        return EvaluateResult {
            actions,
            events,
            new_state,
            plan_digest: digest,
        };
    }

    let levels = compute_grid_levels(plan, config);

    if plan.reset_action == ResetAction::Hard {
        let mut actions: Vec<ExecutionAction> = current
            .iter()
            .map(|o| cancel_action(symbol, o, "HARD_RESET"))
            .collect();
        let cancelled_count = actions.len();
        actions.extend(levels.iter().map(|lv| place_action(symbol, lv, "HARD_RESET")));
        let placed_count = levels.len();
        let new_state = apply_actions(state, &actions, ts_ms);
        let events = vec![ExecutionEvent {
            ts_ms,
            symbol: symbol.to_string(),
            placed_count,
            cancelled_count,
            reset_action: plan.reset_action,
        }];
        return EvaluateResult {
            actions,
            events,
            new_state,
            plan_digest: digest,
        };
    }

    let mut actions = Vec::new();
    for order in &current {
        let level_match = levels.iter().find(|lv| lv.side == order.side && lv.level_id == order.level_id);
        match level_match {
            None => actions.push(cancel_action(symbol, order, "RECONCILE_REMOVE")),
            Some(level) => {
                let mismatched = level.price != order.price || level.qty != order.qty;
                if mismatched && plan.reset_action == ResetAction::Soft {
                    actions.push(cancel_action(symbol, order, "SOFT_RESET_REPLACE"));
                    actions.push(place_action(symbol, level, "SOFT_RESET_REPLACE"));
                }
            }
        }
    }
    for level in &levels {
        let has_order = current.iter().any(|o| o.side == level.side && o.level_id == level.level_id);
        if !has_order {
            actions.push(place_action(symbol, level, "RECONCILE_ADD"));
        }
    }

    let placed_count = actions.iter().filter(|a| a.action_type == ActionType::Place).count();
    let cancelled_count = actions.iter().filter(|a| a.action_type == ActionType::Cancel).count();
    let new_state = apply_actions(state, &actions, ts_ms);
    let events = vec![ExecutionEvent {
        ts_ms,
        symbol: symbol.to_string(),
        placed_count,
        cancelled_count,
        reset_action: plan.reset_action,
    }];

    EvaluateResult {
        actions,
        events,
        new_state,
        plan_digest: digest,
    }
}

fn cancel_action(symbol: &str, order: &OrderRecord, reason: &str) -> ExecutionAction {
    ExecutionAction {
        action_type: ActionType::Cancel,
        symbol: symbol.to_string(),
        side: order.side,
        price: order.price,
        quantity: order.qty,
        level_id: order.level_id,
        reason: reason.to_string(),
    }
}

fn place_action(symbol: &str, level: &GridLevel, reason: &str) -> ExecutionAction {
    ExecutionAction {
        action_type: ActionType::Place,
        symbol: symbol.to_string(),
        side: level.side,
        price: level.price,
        quantity: level.qty,
        level_id: level.level_id,
        reason: reason.to_string(),
    }
}

/// Applies `actions` to `state`, marking cancels terminal immediately and
/// inserting pending placeholder records for places. The monotonic tick
/// counter increments once per `evaluate` call, never per action, so replay
/// ordering is stable.
fn apply_actions(state: &ExecutionState, actions: &[ExecutionAction], ts_ms: i64) -> ExecutionState {
    let mut open_orders = state.open_orders.clone();

    for action in actions {
        match action.action_type {
            ActionType::Cancel => {
                if let Some(record) = open_orders.get_mut(&(action.side, action.level_id)) {
                    record.status = OrderStatus::Cancelled;
                }
            }
            ActionType::Place => {
                open_orders.insert(
                    (action.side, action.level_id),
                    OrderRecord {
                        order_id: format!("pending:{:?}:{}:{}", action.side, action.level_id, ts_ms),
                        side: action.side,
                        level_id: action.level_id,
                        price: action.price,
                        qty: action.quantity,
                        status: OrderStatus::PendingNew,
                    },
                );
            }
            ActionType::Amend => {}
        }
    }

    ExecutionState {
        open_orders,
        tick: state.tick + 1,
    }
}

/// Promotes a pending placement to `OPEN` once the measured HTTP layer
/// confirms it and hands back the exchange-assigned order id.
pub fn confirm_placement(state: &mut ExecutionState, side: Side, level_id: u32, order_id: impl Into<String>) {
    if let Some(record) = state.open_orders.get_mut(&(side, level_id)) {
        record.order_id = order_id.into();
        record.status = OrderStatus::Open;
    }
}

trait DecimalPow {
    fn powi(self, exp: i64) -> Decimal;
}

impl DecimalPow for Decimal {
    fn powi(self, exp: i64) -> Decimal {
        let mut result = Decimal::ONE;
        for _ in 0..exp {
            result *= self;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn plan() -> GridPlan {
        GridPlan {
            mode: GridMode::TwoSided,
            center_price: dec!(100),
            spacing_bps: 100,
            levels_up: 2,
            levels_down: 2,
            size_schedule: vec![dec!(0.01), dec!(0.02)],
            skew_bps: 0,
            reset_action: ResetAction::None,
        }
    }

    #[test]
    fn pause_mode_cancels_everything_no_placements() {
        let mut open_orders = HashMap::new();
        open_orders.insert(
            (Side::Buy, 1),
            OrderRecord {
                order_id: "o1".to_string(),
                side: Side::Buy,
                level_id: 1,
                price: dec!(99),
                qty: dec!(0.01),
                status: OrderStatus::Open,
            },
        );
        let state = ExecutionState { open_orders, tick: 0 };
        let mut paused_plan = plan();
        paused_plan.mode = GridMode::Pause;

        let result = evaluate(&paused_plan, "BTCUSDT", &state, 1_000, &EngineConfig::default());
        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].action_type, ActionType::Cancel);
        assert_eq!(result.events[0].placed_count, 0);
        assert_eq!(result.events[0].cancelled_count, 1);
    }

    #[test]
    fn empty_state_places_full_ladder() {
        let state = ExecutionState::default();
        let result = evaluate(&plan(), "BTCUSDT", &state, 1_000, &EngineConfig::default());
        assert_eq!(result.actions.len(), 4);
        assert!(result.actions.iter().all(|a| a.action_type == ActionType::Place));
        assert_eq!(result.new_state.tick, 1);
    }

    #[test]
    fn hard_reset_cancels_all_then_places_full_ladder() {
        let mut open_orders = HashMap::new();
        open_orders.insert(
            (Side::Buy, 1),
            OrderRecord {
                order_id: "o1".to_string(),
                side: Side::Buy,
                level_id: 1,
                price: dec!(1),
                qty: dec!(1),
                status: OrderStatus::Open,
            },
        );
        let state = ExecutionState { open_orders, tick: 3 };
        let mut hard_plan = plan();
        hard_plan.reset_action = ResetAction::Hard;

        let result = evaluate(&hard_plan, "BTCUSDT", &state, 1_000, &EngineConfig::default());
        let cancels = result.actions.iter().filter(|a| a.action_type == ActionType::Cancel).count();
        let places = result.actions.iter().filter(|a| a.action_type == ActionType::Place).count();
        assert_eq!(cancels, 1);
        assert_eq!(places, 4);
    }

    #[test]
    fn reconcile_none_leaves_matching_orders_untouched() {
        let levels = compute_grid_levels(&plan(), &EngineConfig::default());
        let sell_1 = levels.iter().find(|lv| lv.side == Side::Sell && lv.level_id == 1).unwrap();

        let mut open_orders = HashMap::new();
        open_orders.insert(
            (Side::Sell, 1),
            OrderRecord {
                order_id: "o1".to_string(),
                side: Side::Sell,
                level_id: 1,
                price: sell_1.price,
                qty: sell_1.qty,
                status: OrderStatus::Open,
            },
        );
        let state = ExecutionState { open_orders, tick: 0 };

        let result = evaluate(&plan(), "BTCUSDT", &state, 1_000, &EngineConfig::default());
        assert!(!result.actions.iter().any(|a| a.level_id == 1 && a.side == Side::Sell));
    }

    #[test]
    fn soft_reset_replaces_mismatched_level() {
        let mut open_orders = HashMap::new();
        open_orders.insert(
            (Side::Sell, 1),
            OrderRecord {
                order_id: "o1".to_string(),
                side: Side::Sell,
                level_id: 1,
                price: dec!(999),
                qty: dec!(0.5),
                status: OrderStatus::Open,
            },
        );
        let state = ExecutionState { open_orders, tick: 0 };
        let mut soft_plan = plan();
        soft_plan.reset_action = ResetAction::Soft;

        let result = evaluate(&soft_plan, "BTCUSDT", &state, 1_000, &EngineConfig::default());
        let level_actions: Vec<_> = result
            .actions
            .iter()
            .filter(|a| a.side == Side::Sell && a.level_id == 1)
            .collect();
        assert_eq!(level_actions.len(), 2);
        assert_eq!(level_actions[0].action_type, ActionType::Cancel);
        assert_eq!(level_actions[1].action_type, ActionType::Place);
    }

    #[test]
    fn plan_digest_is_stable_across_calls() {
        assert_eq!(plan_digest(&plan()), plan_digest(&plan()));
    }

    #[test]
    fn long_only_mode_has_no_sell_levels() {
        let mut long_only = plan();
        long_only.mode = GridMode::LongOnly;
        let levels = compute_grid_levels(&long_only, &EngineConfig::default());
        assert!(levels.iter().all(|lv| lv.side == Side::Buy));
    }

    #[test]
    fn confirm_placement_promotes_pending_to_open() {
        let state = ExecutionState::default();
        let result = evaluate(&plan(), "BTCUSDT", &state, 1_000, &EngineConfig::default());
        let mut new_state = result.new_state;
        confirm_placement(&mut new_state, Side::Sell, 1, "exch-123");
        let record = &new_state.open_orders[&(Side::Sell, 1)];
        assert_eq!(record.status, OrderStatus::Open);
        assert_eq!(record.order_id, "exch-123");
    }
}
