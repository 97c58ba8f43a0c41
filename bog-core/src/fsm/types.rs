//! Lifecycle FSM vocabulary (spec.md §4.C).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemState {
    Init,
    Ready,
    Active,
    Throttled,
    Paused,
    Degraded,
    Emergency,
}

/// What a downstream write wants to do; gated both by the FSM's
/// allowed-intent matrix and by the risk gates (spec.md §4.C/§4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderIntent {
    IncreaseRisk,
    ReduceRisk,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatorOverride {
    Pause,
    Emergency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionReason {
    HealthOk,
    FeedsReady,
    ToxMid,
    ToxHigh,
    OperatorPause,
    ToxLowCooldown,
    ToxMidCooldown,
    FeedRecovered,
    FeedStale,
    DdBreach,
    KillSwitch,
    OperatorEmergency,
    PositionReduced,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub ts_ms: i64,
    pub from_state: SystemState,
    pub to_state: SystemState,
    pub reason: TransitionReason,
}

/// Snapshot of inputs the FSM evaluates on a single tick. Value-level only;
/// no mutable references (spec.md §5 "FSM owned by the live loop").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FsmInputs {
    pub ts_ms: i64,
    pub kill_switch_active: bool,
    pub drawdown_pct: Decimal,
    /// ms since the last snapshot for this symbol; 0 on the first tick.
    pub feed_gap_ms: i64,
    pub spread_bps: i64,
    pub toxicity_score_bps: i64,
    pub position_notional_usd: Option<Decimal>,
    pub operator_override: Option<OperatorOverride>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FsmConfig {
    pub cooldown_ms: i64,
    pub feed_stale_threshold_ms: i64,
    pub spread_spike_threshold_bps: i64,
    pub toxicity_high_threshold_bps: i64,
    pub drawdown_threshold_pct: Decimal,
    pub position_notional_threshold_usd: Decimal,
}

impl Default for FsmConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 30_000,
            feed_stale_threshold_ms: 5_000,
            spread_spike_threshold_bps: 50,
            toxicity_high_threshold_bps: 500,
            drawdown_threshold_pct: Decimal::new(20, 2),
            position_notional_threshold_usd: Decimal::from(10),
        }
    }
}

/// Allowed intents per state (spec.md §4.C). `Init` permits nothing; `Cancel`
/// is permitted in every non-Init state; `IncreaseRisk` only in `Active`.
pub fn allowed_intents(state: SystemState) -> &'static [OrderIntent] {
    use OrderIntent::*;
    use SystemState::*;
    match state {
        Init => &[],
        Ready => &[Cancel],
        Active => &[IncreaseRisk, ReduceRisk, Cancel],
        Throttled | Paused | Degraded | Emergency => &[ReduceRisk, Cancel],
    }
}

pub fn is_intent_allowed(state: SystemState, intent: OrderIntent) -> bool {
    allowed_intents(state).contains(&intent)
}
