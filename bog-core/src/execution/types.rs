//! Grid plan and execution-action vocabulary (spec.md §3, §4.E).
//! Grounded on `examples/original_source/src/grinder/execution/engine.py`.

use crate::core::{OrderStatus, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridMode {
    TwoSided,
    LongOnly,
    ShortOnly,
    Pause,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetAction {
    Hard,
    Soft,
    None,
}

/// Desired grid shape for one symbol. `evaluate` recomputes levels from this
/// on every call; nothing here is mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridPlan {
    pub mode: GridMode,
    pub center_price: Decimal,
    pub spacing_bps: i64,
    pub levels_up: u32,
    pub levels_down: u32,
    pub size_schedule: Vec<Decimal>,
    pub skew_bps: i64,
    pub reset_action: ResetAction,
}

/// One rung of the desired ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLevel {
    pub side: Side,
    pub level_id: u32,
    pub price: Decimal,
    pub qty: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    Place,
    Cancel,
    Amend,
}

/// Intent over the wire; the SOR (§4.F) decides whether/how this is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionAction {
    pub action_type: ActionType,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub level_id: u32,
    pub reason: String,
}

/// In-memory record of an order the engine believes is open, keyed by
/// `(side, level_id)` in [`ExecutionState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub side: Side,
    pub level_id: u32,
    pub price: Decimal,
    pub qty: Decimal,
    pub status: OrderStatus,
}

/// One aggregated event per `evaluate` call (spec.md §4.E "event emission").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub ts_ms: i64,
    pub symbol: String,
    pub placed_count: usize,
    pub cancelled_count: usize,
    pub reset_action: ResetAction,
}

/// Open-orders map plus a monotonic tick counter for replay determinism.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub open_orders: HashMap<(Side, u32), OrderRecord>,
    pub tick: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluateResult {
    pub actions: Vec<ExecutionAction>,
    pub events: Vec<ExecutionEvent>,
    pub new_state: ExecutionState,
    pub plan_digest: String,
}
