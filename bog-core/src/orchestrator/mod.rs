//! Orchestrator / live loop (spec.md §4.K): the per-symbol pipeline that
//! turns a market [`Snapshot`] into exchange calls.
//!
//! This is the one module in `bog-core` that performs I/O (it owns the
//! `ExchangePort`, the idempotency store, and the measured HTTP client) and
//! the one module responsible for logging and metering every other
//! component's pure output — the FSM, the risk gates, the execution engine,
//! and the SOR all return plain values and never log or meter themselves
//! (spec.md §4.C "FSM itself does no I/O; caller performs logging/metrics").
//!
//! Grounded on spec.md §4.K's ten-step pipeline list; task/channel layout
//! grounded on the teacher's `execution/production.rs` async task structure
//! (see DESIGN.md).

use crate::account::ExpectedStore;
use crate::config::{Config, HttpOp};
use crate::core::{ConnectorError, OrderStatus, Side, Snapshot};
use crate::execution::{
    compute_idempotency_key, confirm_placement, evaluate as engine_evaluate, route,
    EngineConfig, ExchangeFilters, ExecutionAction, ExecutionState, GridPlan, IdempotencyEntry,
    IdempotencyStatus, IdempotencyStore, KeyParam, MarketSnapshot, RouteIntent, RouteResult,
    RouterDecision, RouterInputs, UpdateBudgets, VenueCaps,
};
use crate::features::{FeatureEngine, FeatureSnapshot};
use crate::fsm::{
    allowed_intents, is_intent_allowed, FsmInputs, LifecycleFsm, OperatorOverride, OrderIntent,
    SystemState, TransitionEvent,
};
use crate::http::MeasuredClient;
use crate::ports::ExchangePort;
use crate::risk::{
    compose, fill_prob, AllowDecision, AllowReason, ConsecutiveLossGuard, DrawdownGuard,
    RateLimiter, ToxicityGate,
};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Per-symbol venue facts the orchestrator needs to route and fill grid
/// levels. Distinct from [`Config`] because it varies per symbol/venue,
/// not per operator deployment (spec.md §6 exchange filters, §4.F venue
/// caps).
#[derive(Debug, Clone)]
pub struct SymbolRuntime {
    pub strategy_id: String,
    pub filters: ExchangeFilters,
    pub venue_caps: VenueCaps,
    pub engine: EngineConfig,
    pub budgets: UpdateBudgets,
}

/// Operator override cell (spec.md §9 "a single atomic cell read by the
/// FSM"): `0` = none, `1` = PAUSE, `2` = EMERGENCY. A plain `AtomicU8`
/// rather than a mutex so a CLI signal handler can set it from any thread
/// without blocking the live loop.
#[derive(Debug, Default)]
pub struct OperatorOverrideCell(AtomicU8);

impl OperatorOverrideCell {
    pub fn set(&self, value: Option<OperatorOverride>) {
        let encoded = match value {
            None => 0,
            Some(OperatorOverride::Pause) => 1,
            Some(OperatorOverride::Emergency) => 2,
        };
        self.0.store(encoded, Ordering::SeqCst);
    }

    pub fn get(&self) -> Option<OperatorOverride> {
        match self.0.load(Ordering::SeqCst) {
            1 => Some(OperatorOverride::Pause),
            2 => Some(OperatorOverride::Emergency),
            _ => None,
        }
    }
}

/// What happened to one routed level after the SOR decided AMEND, CANCEL
/// then PLACE, or nothing.
#[derive(Debug, Clone)]
pub struct RoutedOutcome {
    pub side: Side,
    pub level_id: u32,
    pub route: RouteResult,
    pub idempotency_key: Option<String>,
    pub dispatched: bool,
    pub order_id: Option<String>,
    pub error: Option<String>,
}

/// Everything that happened on one [`Orchestrator::process_snapshot`] call.
/// The caller (the `grinder` binary) is expected to log this and update
/// metrics from it; nothing inside the orchestrator writes to stdout or a
/// metrics registry directly, keeping this crate free of logging-framework
/// coupling beyond the `tracing` calls already present for diagnostics.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub symbol: String,
    pub features: Option<FeatureSnapshot>,
    pub transition: Option<TransitionEvent>,
    pub state: SystemState,
    pub gate_decision: AllowDecision,
    pub plan_digest: Option<String>,
    pub routed: Vec<RoutedOutcome>,
}

/// Per-symbol mutable state the orchestrator threads across ticks:
/// the engine's private open-orders mirror (SPEC_FULL.md §9 decision 1),
/// the last-seen tick timestamp for feed-gap computation, and a
/// replay-stable update budget.
struct SymbolState {
    execution: ExecutionState,
    last_ts: Option<i64>,
}

impl SymbolState {
    fn new() -> Self {
        Self {
            execution: ExecutionState::default(),
            last_ts: None,
        }
    }
}

/// Wires spec.md §4.B–§4.G into one per-symbol tick (§4.K). Owns every
/// mutable, I/O-touching piece of state in the pipeline; every component it
/// calls into remains pure and synchronous except the final exchange
/// dispatch.
pub struct Orchestrator {
    config: Config,
    port: Arc<dyn ExchangePort>,
    http: MeasuredClient,
    idempotency: IdempotencyStore,
    features: FeatureEngine,
    fsm: LifecycleFsm,
    drawdown: DrawdownGuard,
    consecutive_loss: ConsecutiveLossGuard,
    rate_limiter: RateLimiter,
    toxicity: ToxicityGate,
    operator_override: Arc<OperatorOverrideCell>,
    kill_switch: Arc<std::sync::atomic::AtomicBool>,
    symbols: HashMap<String, SymbolState>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        port: Arc<dyn ExchangePort>,
        http: MeasuredClient,
        features: FeatureEngine,
        fsm: LifecycleFsm,
        drawdown: DrawdownGuard,
        consecutive_loss: ConsecutiveLossGuard,
        rate_limiter: RateLimiter,
        toxicity: ToxicityGate,
        operator_override: Arc<OperatorOverrideCell>,
        kill_switch: Arc<std::sync::atomic::AtomicBool>,
    ) -> Self {
        Self {
            config,
            port,
            http,
            idempotency: IdempotencyStore::new(),
            features,
            fsm,
            drawdown,
            consecutive_loss,
            rate_limiter,
            toxicity,
            operator_override,
            kill_switch,
            symbols: HashMap::new(),
        }
    }

    pub fn fsm_state(&self) -> SystemState {
        self.fsm.state()
    }

    pub fn idempotency_store(&self) -> &IdempotencyStore {
        &self.idempotency
    }

    fn symbol_state(&mut self, symbol: &str) -> &mut SymbolState {
        self.symbols
            .entry(symbol.to_string())
            .or_insert_with(SymbolState::new)
    }

    /// Step 2 of §4.K: `feed_gap_ms` is the elapsed time since the last tick
    /// seen for this symbol; `0` on the symbol's first tick (spec.md §4.C
    /// input definition).
    fn feed_gap_ms(state: &mut SymbolState, ts_ms: i64) -> i64 {
        let gap = match state.last_ts {
            None => 0,
            Some(last) if ts_ms > last => ts_ms - last,
            Some(_) => 0,
        };
        if state.last_ts.map(|last| ts_ms > last).unwrap_or(true) {
            state.last_ts = Some(ts_ms);
        }
        gap
    }

    /// One tick of the live loop for a single symbol's market snapshot
    /// (spec.md §4.K). `plan` is supplied by the caller's strategy layer
    /// (e.g. `bog-strategies`); `runtime` carries the symbol's exchange
    /// filters and venue capabilities; `expected` is the shared intent
    /// store the orchestrator mirrors confirmed placements/cancels into.
    pub async fn process_snapshot(
        &mut self,
        snap: &Snapshot,
        plan: &GridPlan,
        runtime: &SymbolRuntime,
        expected: &mut ExpectedStore,
    ) -> TickReport {
        let symbol = snap.symbol.clone();
        let ts_ms = snap.ts_ms;

        // Step 1: features.
        let features = self.features.process_snapshot(snap);

        // Step 2: feed-gap tracker + FSM inputs.
        let state = self.symbol_state(&symbol);
        let feed_gap_ms = Self::feed_gap_ms(state, ts_ms);
        self.toxicity.record(&symbol, ts_ms, snap.mid_price());
        let toxicity_score_bps = features
            .and_then(|f| {
                self.toxicity
                    .price_impact_bps(&symbol, ts_ms, snap.mid_price())
                    .map(|impact| impact.max(f.spread_bps))
            })
            .unwrap_or(0);
        let position_notional_usd = expected
            .get_all_positions()
            .into_iter()
            .find(|((sym, _), _)| sym == &symbol)
            .map(|(_, pos)| (pos.qty * snap.mid_price()).abs());

        let fsm_inputs = FsmInputs {
            ts_ms,
            kill_switch_active: self.kill_switch.load(Ordering::SeqCst),
            drawdown_pct: self.drawdown.snapshot().portfolio_dd_pct,
            feed_gap_ms,
            spread_bps: features.map(|f| f.spread_bps).unwrap_or(0),
            toxicity_score_bps,
            position_notional_usd,
            operator_override: self.operator_override.get(),
        };

        // Step 3: FSM transition.
        let transition = self.fsm.tick(fsm_inputs);
        if let Some(event) = transition {
            info!(
                from = ?event.from_state,
                to = ?event.to_state,
                reason = ?event.reason,
                "fsm transition"
            );
        }
        let system_state = self.fsm.state();

        // Step 4: risk gates, short-circuited in spec.md §4.D priority order.
        let intent = if matches!(plan.mode, crate::execution::GridMode::Pause | crate::execution::GridMode::Emergency) {
            OrderIntent::ReduceRisk
        } else {
            OrderIntent::IncreaseRisk
        };
        let fsm_gate = if is_intent_allowed(system_state, intent) || is_intent_allowed(system_state, OrderIntent::Cancel) {
            AllowDecision::allow()
        } else {
            AllowDecision::block(
                AllowReason::DrawdownGateActive,
                format!("state={system_state:?} does not permit {intent:?}"),
            )
        };
        let fill_prob_decision = fill_prob::evaluate(&self.config.fill_prob, None);
        let gate_decision = compose([
            self.drawdown.allow(intent, &symbol),
            self.consecutive_loss_decision(),
            self.rate_limiter.check(ts_ms),
            fill_prob_decision,
            fsm_gate,
        ]);

        if !gate_decision.allowed {
            return TickReport {
                symbol,
                features,
                transition,
                state: system_state,
                gate_decision,
                plan_digest: None,
                routed: Vec::new(),
            };
        }

        // Step 5: execution engine proposes actions against the allowed plan.
        let allowed_plan = self.plan_for_state(plan, system_state);
        let sym_state = self.symbol_state(&symbol);
        let result = engine_evaluate(&allowed_plan, &symbol, &sym_state.execution, ts_ms, &runtime.engine);
        sym_state.execution = result.new_state.clone();
        let plan_digest = Some(result.plan_digest.clone());

        // Steps 6-9: route, dedupe, dispatch, mirror into ExpectedStore.
        let market = MarketSnapshot {
            best_bid: snap.best_bid_price,
            best_ask: snap.best_ask_price,
        };
        let routed = self
            .route_and_dispatch(&symbol, &result.actions, market, runtime, expected, ts_ms)
            .await;

        if routed.iter().any(|r| r.dispatched) {
            self.rate_limiter.record_order(ts_ms);
        }

        TickReport {
            symbol,
            features,
            transition,
            state: system_state,
            gate_decision,
            plan_digest,
            routed,
        }
    }

    fn consecutive_loss_decision(&self) -> AllowDecision {
        if self.consecutive_loss.is_tripped() {
            AllowDecision::block(AllowReason::ConsecutiveLossTripped, "consecutive loss guard tripped")
        } else {
            AllowDecision::allow()
        }
    }

    /// Narrows `plan` to what the FSM's current state permits: a state that
    /// only allows REDUCE_RISK/CANCEL forces the plan into PAUSE mode so the
    /// engine only ever proposes cancels (spec.md §4.C allowed-intents,
    /// §4.E PAUSE/EMERGENCY semantics).
    fn plan_for_state(&self, plan: &GridPlan, state: SystemState) -> GridPlan {
        let intents = allowed_intents(state);
        if intents.contains(&OrderIntent::IncreaseRisk) {
            plan.clone()
        } else {
            let mut narrowed = plan.clone();
            narrowed.mode = crate::execution::GridMode::Pause;
            narrowed
        }
    }

    async fn route_and_dispatch(
        &mut self,
        symbol: &str,
        actions: &[ExecutionAction],
        market: MarketSnapshot,
        runtime: &SymbolRuntime,
        expected: &mut ExpectedStore,
        ts_ms: i64,
    ) -> Vec<RoutedOutcome> {
        let mut outcomes = Vec::new();

        // Pair a CANCEL with a PLACE at the same (side, level_id) — the
        // engine's SOFT-reconciliation mismatch case — into one routed
        // decision; everything else (a lone CANCEL or a lone PLACE) routes
        // on its own.
        let mut by_level: BTreeMap<(Side, u32), (Option<&ExecutionAction>, Option<&ExecutionAction>)> =
            BTreeMap::new();
        for action in actions {
            let entry = by_level.entry((action.side, action.level_id)).or_insert((None, None));
            match action.action_type {
                crate::execution::ActionType::Cancel => entry.0 = Some(action),
                crate::execution::ActionType::Place => entry.1 = Some(action),
                crate::execution::ActionType::Amend => {}
            }
        }

        for ((side, level_id), (cancel, place)) in by_level {
            match (cancel, place) {
                (Some(cancel_action), None) => {
                    let order_id = self
                        .symbols
                        .get(symbol)
                        .and_then(|s| s.execution.open_orders.get(&(side, level_id)))
                        .map(|record| record.order_id.clone())
                        .unwrap_or_default();
                    let outcome = self
                        .dispatch_cancel(symbol, side, level_id, cancel_action, &order_id, expected, ts_ms)
                        .await;
                    outcomes.push(outcome);
                }
                (cancel_action, Some(place_action)) => {
                    let existing = cancel_action.map(|c| crate::execution::ExistingOrder {
                        price: c.price,
                        qty: c.quantity,
                        side: c.side,
                        reduce_only: false,
                        time_in_force: crate::core::TimeInForce::Gtc,
                    });
                    let inputs = RouterInputs {
                        intent: RouteIntent {
                            price: place_action.price,
                            qty: place_action.quantity,
                            side: place_action.side,
                            reduce_only: false,
                            time_in_force: crate::core::TimeInForce::Gtc,
                        },
                        existing,
                        market,
                        filters: runtime.filters,
                        venue_caps: runtime.venue_caps,
                        budgets: runtime.budgets,
                        drawdown_breached: self.drawdown.state() == crate::risk::drawdown::GuardState::Drawdown,
                        price_eps_ticks: crate::execution::PRICE_EPS_TICKS_DEFAULT,
                        qty_eps_steps: crate::execution::QTY_EPS_STEPS_DEFAULT,
                    };
                    let route_result = route(&inputs);
                    let outcome = self
                        .dispatch_routed(symbol, side, level_id, &route_result, place_action, expected, ts_ms)
                        .await;
                    outcomes.push(outcome);
                }
                (None, None) => unreachable!("by_level entries always have at least one side populated"),
            }
        }

        outcomes
    }

    async fn dispatch_cancel(
        &mut self,
        symbol: &str,
        side: Side,
        level_id: u32,
        action: &ExecutionAction,
        order_id: &str,
        expected: &mut ExpectedStore,
        ts_ms: i64,
    ) -> RoutedOutcome {
        let route_result = RouteResult {
            decision: RouterDecision::CancelReplace,
            reason: "ENGINE_CANCEL",
            amend_price: None,
            amend_qty: None,
            new_price: None,
            new_qty: None,
            details: BTreeMap::new(),
        };
        let key = self.cancel_key(symbol, side, level_id, ts_ms);
        match self.send_cancel(symbol, action, order_id, ts_ms).await {
            Ok(()) => {
                expected.mark_cancelled(&format!("{symbol}:{side:?}:{level_id}"));
                RoutedOutcome {
                    side,
                    level_id,
                    route: route_result,
                    idempotency_key: Some(key),
                    dispatched: true,
                    order_id: None,
                    error: None,
                }
            }
            Err(err) => RoutedOutcome {
                side,
                level_id,
                route: route_result,
                idempotency_key: Some(key),
                dispatched: false,
                order_id: None,
                error: Some(err.to_string()),
            },
        }
    }

    async fn dispatch_routed(
        &mut self,
        symbol: &str,
        side: Side,
        level_id: u32,
        route_result: &RouteResult,
        place_action: &ExecutionAction,
        expected: &mut ExpectedStore,
        ts_ms: i64,
    ) -> RoutedOutcome {
        match route_result.decision {
            RouterDecision::Noop | RouterDecision::Block => {
                if route_result.decision == RouterDecision::Block {
                    warn!(symbol, ?side, level_id, reason = route_result.reason, "sor blocked level");
                }
                RoutedOutcome {
                    side,
                    level_id,
                    route: route_result.clone(),
                    idempotency_key: None,
                    dispatched: false,
                    order_id: None,
                    error: None,
                }
            }
            RouterDecision::Amend | RouterDecision::CancelReplace => {
                let key = self.place_key(symbol, place_action, ts_ms);
                match self.send_place(symbol, place_action, ts_ms).await {
                    Ok(order_id) => {
                        expected.record_order(
                            crate::execution::OrderRecord {
                                order_id: order_id.clone(),
                                side,
                                level_id,
                                price: place_action.price,
                                qty: place_action.quantity,
                                status: OrderStatus::Open,
                            },
                            ts_ms,
                        );
                        if let Some(sym_state) = self.symbols.get_mut(symbol) {
                            confirm_placement(&mut sym_state.execution, side, level_id, order_id.clone());
                        }
                        RoutedOutcome {
                            side,
                            level_id,
                            route: route_result.clone(),
                            idempotency_key: Some(key),
                            dispatched: true,
                            order_id: Some(order_id),
                            error: None,
                        }
                    }
                    Err(err) => RoutedOutcome {
                        side,
                        level_id,
                        route: route_result.clone(),
                        idempotency_key: Some(key),
                        dispatched: false,
                        order_id: None,
                        error: Some(err.to_string()),
                    },
                }
            }
        }
    }

    fn place_key(&self, symbol: &str, action: &ExecutionAction, ts_ms: i64) -> String {
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), KeyParam::Str(symbol.to_string()));
        params.insert("side".to_string(), KeyParam::Str(format!("{:?}", action.side)));
        params.insert("price".to_string(), KeyParam::Decimal(action.price));
        params.insert("quantity".to_string(), KeyParam::Decimal(action.quantity));
        params.insert("level_id".to_string(), KeyParam::Int(action.level_id as i64));
        params.insert("ts_bucket".to_string(), KeyParam::Int(ts_ms / 1000));
        compute_idempotency_key("exec", "place", &params)
    }

    fn cancel_key(&self, symbol: &str, side: Side, level_id: u32, ts_ms: i64) -> String {
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), KeyParam::Str(symbol.to_string()));
        params.insert("side".to_string(), KeyParam::Str(format!("{side:?}")));
        params.insert("level_id".to_string(), KeyParam::Int(level_id as i64));
        params.insert("ts_bucket".to_string(), KeyParam::Int(ts_ms / 1000));
        compute_idempotency_key("exec", "cancel", &params)
    }

    /// Idempotency-gated cancel dispatch (spec.md §4.A/§4.K steps 7-8):
    /// `put_if_absent` INFLIGHT first; a `DONE` hit skips the wire call
    /// entirely and is treated as success.
    async fn send_cancel(
        &self,
        symbol: &str,
        action: &ExecutionAction,
        order_id: &str,
        ts_ms: i64,
    ) -> Result<(), ConnectorError> {
        let key = self.cancel_key(symbol, action.side, action.level_id, ts_ms);
        let inflight = IdempotencyEntry {
            key: key.clone(),
            status: IdempotencyStatus::Inflight,
            op_name: "cancel".to_string(),
            request_fingerprint: String::new(),
            created_at_ms: ts_ms,
            expires_at_ms: 0,
            cached_result: None,
            error_code: None,
        };
        if !self.idempotency.put_if_absent(&key, inflight, 300, ts_ms) {
            if let Some(entry) = self.idempotency.get(&key, ts_ms) {
                if entry.status == IdempotencyStatus::Done {
                    return Ok(());
                }
            }
            return Ok(());
        }

        if order_id.is_empty() {
            // Nothing was ever confirmed open on the exchange for this
            // level (e.g. a placement that never got past INFLIGHT) — a
            // cancel call would have nothing to act on.
            self.idempotency.mark_done(&key, serde_json::json!({"ok": true, "noop": true}), 86_400, ts_ms);
            return Ok(());
        }

        let result = self
            .http
            .call(HttpOp::CancelOrder, || {
                let port = self.port.clone();
                let symbol = symbol.to_string();
                let order_id = order_id.to_string();
                async move { port.cancel_order_by_exchange_id(&symbol, &order_id).await.map(|_| ()) }
            })
            .await;

        match &result {
            Ok(()) => self.idempotency.mark_done(&key, serde_json::json!({"ok": true}), 86_400, ts_ms),
            Err(err) if !err.is_retryable() => self.idempotency.mark_failed(&key, err.to_string()),
            Err(_) => self.idempotency.mark_failed(&key, "transient"),
        }
        result
    }

    /// Idempotency-gated place dispatch, mirroring [`Self::send_cancel`].
    async fn send_place(&self, symbol: &str, action: &ExecutionAction, ts_ms: i64) -> Result<String, ConnectorError> {
        let key = self.place_key(symbol, action, ts_ms);
        let inflight = IdempotencyEntry {
            key: key.clone(),
            status: IdempotencyStatus::Inflight,
            op_name: "place".to_string(),
            request_fingerprint: String::new(),
            created_at_ms: ts_ms,
            expires_at_ms: 0,
            cached_result: None,
            error_code: None,
        };
        if !self.idempotency.put_if_absent(&key, inflight, 300, ts_ms) {
            if let Some(entry) = self.idempotency.get(&key, ts_ms) {
                if entry.status == IdempotencyStatus::Done {
                    if let Some(cached) = entry.cached_result.as_ref().and_then(|v| v.get("order_id")) {
                        if let Some(order_id) = cached.as_str() {
                            return Ok(order_id.to_string());
                        }
                    }
                }
            }
            return Err(ConnectorError::NonRetryable("idempotency conflict".to_string()));
        }

        let result = self
            .http
            .call(HttpOp::PlaceOrder, || {
                let port = self.port.clone();
                let symbol = symbol.to_string();
                let side = action.side;
                let price = action.price;
                let qty = action.quantity;
                let level_id = action.level_id;
                async move { port.place_order(&symbol, side, price, qty, level_id, ts_ms).await }
            })
            .await;

        match &result {
            Ok(order_id) => self.idempotency.mark_done(
                &key,
                serde_json::json!({"order_id": order_id}),
                86_400,
                ts_ms,
            ),
            Err(err) if !err.is_retryable() => self.idempotency.mark_failed(&key, err.to_string()),
            Err(_) => self.idempotency.mark_failed(&key, "transient"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::execution::{EngineConfig, ExchangeFilters, GridMode, ResetAction, VenueCaps};
    use crate::features::{FeatureEngine, FeatureEngineConfig};
    use crate::fsm::{FsmConfig, LifecycleFsm};
    use crate::http::{CircuitBreakerConfig, MeasuredClient, RetryPolicy};
    use crate::risk::{
        ConsecutiveLossConfig, ConsecutiveLossGuard, DrawdownGuard, DrawdownGuardConfig,
        RateLimiter, RateLimiterConfig, ToxicityGate, ToxicityGateConfig,
    };
    use crate::testing::MockExchangePort;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicBool;

    fn make_orchestrator() -> (Orchestrator, Arc<MockExchangePort>) {
        let port = Arc::new(MockExchangePort::new());
        let http = MeasuredClient::new(
            crate::config::HttpConfig::default(),
            RetryPolicy::default(),
            CircuitBreakerConfig::default(),
        );
        let mut fsm = LifecycleFsm::new(FsmConfig::default());
        // Warm the FSM to ACTIVE so the first real tick can place orders.
        fsm.tick(FsmInputs {
            ts_ms: 0,
            kill_switch_active: false,
            drawdown_pct: Decimal::ZERO,
            feed_gap_ms: 0,
            spread_bps: 0,
            toxicity_score_bps: 0,
            position_notional_usd: Some(Decimal::ZERO),
            operator_override: None,
        });
        fsm.tick(FsmInputs {
            ts_ms: 1,
            kill_switch_active: false,
            drawdown_pct: Decimal::ZERO,
            feed_gap_ms: 0,
            spread_bps: 0,
            toxicity_score_bps: 0,
            position_notional_usd: Some(Decimal::ZERO),
            operator_override: None,
        });
        let orchestrator = Orchestrator::new(
            Config::safe_default(),
            port.clone(),
            http,
            FeatureEngine::new(FeatureEngineConfig::default()).unwrap(),
            fsm,
            DrawdownGuard::new(DrawdownGuardConfig {
                portfolio_dd_limit: dec!(0.2),
                symbol_dd_budgets: HashMap::new(),
            }),
            ConsecutiveLossGuard::new(ConsecutiveLossConfig {
                enabled: true,
                max_consecutive_losses: 5,
            }),
            RateLimiter::new(RateLimiterConfig {
                cooldown_ms: 0,
                max_per_window: 1000,
                window_ms: 60_000,
            }),
            ToxicityGate::new(ToxicityGateConfig::default()),
            Arc::new(OperatorOverrideCell::default()),
            Arc::new(AtomicBool::new(false)),
        );
        (orchestrator, port)
    }

    fn snapshot(ts_ms: i64) -> Snapshot {
        Snapshot {
            symbol: "BTCUSDT".to_string(),
            ts_ms,
            best_bid_price: dec!(50000),
            best_bid_qty: dec!(2),
            best_ask_price: dec!(50001),
            best_ask_qty: dec!(2),
            last_trade_price: None,
            last_trade_qty: None,
        }
    }

    fn two_sided_plan() -> GridPlan {
        GridPlan {
            mode: GridMode::TwoSided,
            center_price: dec!(50000),
            spacing_bps: 10,
            levels_up: 2,
            levels_down: 2,
            size_schedule: vec![dec!(0.01), dec!(0.02)],
            skew_bps: 0,
            reset_action: ResetAction::None,
        }
    }

    fn runtime() -> SymbolRuntime {
        SymbolRuntime {
            strategy_id: "grid_v1".to_string(),
            filters: ExchangeFilters {
                tick_size: dec!(0.01),
                step_size: dec!(0.001),
                min_qty: dec!(0.001),
                min_notional: dec!(5),
            },
            venue_caps: VenueCaps::default(),
            engine: EngineConfig::default(),
            budgets: UpdateBudgets::default(),
        }
    }

    #[tokio::test]
    async fn first_tick_places_the_full_ladder() {
        let (mut orchestrator, port) = make_orchestrator();
        let mut expected = ExpectedStore::new(86_400_000, 1024);
        let report = orchestrator
            .process_snapshot(&snapshot(2), &two_sided_plan(), &runtime(), &mut expected)
            .await;
        assert_eq!(report.state, SystemState::Active);
        assert!(report.gate_decision.allowed);
        assert_eq!(port.open_order_count(), 4);
        assert!(report.routed.iter().all(|r| r.dispatched));
    }

    #[tokio::test]
    async fn kill_switch_forces_emergency_and_only_cancels_flow() {
        let (mut orchestrator, port) = make_orchestrator();
        let mut expected = ExpectedStore::new(86_400_000, 1024);
        orchestrator
            .process_snapshot(&snapshot(2), &two_sided_plan(), &runtime(), &mut expected)
            .await;
        assert_eq!(port.open_order_count(), 4);

        orchestrator.kill_switch.store(true, Ordering::SeqCst);
        let report = orchestrator
            .process_snapshot(&snapshot(3), &two_sided_plan(), &runtime(), &mut expected)
            .await;
        assert_eq!(report.state, SystemState::Emergency);
        assert_eq!(port.open_order_count(), 0);
    }

    #[tokio::test]
    async fn drawdown_latch_blocks_increase_risk_after_breach() {
        let (mut orchestrator, port) = make_orchestrator();
        let mut expected = ExpectedStore::new(86_400_000, 1024);
        orchestrator.drawdown.update(dec!(100000), dec!(79000), &HashMap::new());
        let report = orchestrator
            .process_snapshot(&snapshot(2), &two_sided_plan(), &runtime(), &mut expected)
            .await;
        assert!(!report.gate_decision.allowed);
        assert_eq!(port.open_order_count(), 0);
    }

    #[tokio::test]
    async fn feed_gap_is_zero_on_first_tick_and_positive_after() {
        let (mut orchestrator, _port) = make_orchestrator();
        let mut expected = ExpectedStore::new(86_400_000, 1024);
        let report1 = orchestrator
            .process_snapshot(&snapshot(2), &two_sided_plan(), &runtime(), &mut expected)
            .await;
        assert!(report1.features.is_some());
        let report2 = orchestrator
            .process_snapshot(&snapshot(10), &two_sided_plan(), &runtime(), &mut expected)
            .await;
        assert!(report2.features.is_some());
    }
}
