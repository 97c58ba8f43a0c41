//! Grid execution: plan → desired ladder → reconciliation → routed actions
//! (spec.md §4.A, §4.E, §4.F).

pub mod engine;
pub mod idempotency;
pub mod router;
pub mod types;

pub use engine::{confirm_placement, evaluate, plan_digest, EngineConfig};
pub use idempotency::{
    compute_idempotency_key, compute_request_fingerprint, IdempotencyEntry, IdempotencyStatus,
    IdempotencyStats, IdempotencyStore, KeyParam,
};
pub use router::{
    route, ExchangeFilters, ExistingOrder, MarketSnapshot, RouteIntent, RouteResult,
    RouterDecision, RouterInputs, UpdateBudgets, VenueCaps, PRICE_EPS_TICKS_DEFAULT,
    QTY_EPS_STEPS_DEFAULT,
};
pub use types::{
    ActionType, EvaluateResult, ExecutionAction, ExecutionEvent, ExecutionState, GridLevel,
    GridMode, GridPlan, OrderRecord, ResetAction,
};
