//! Pure lifecycle FSM (spec.md §4.C). No I/O; every transition is computed
//! purely from `(current_state, state_enter_ts, inputs)`.
//!
//! Grounded on `examples/original_source/src/grinder/live/fsm_orchestrator.py`.

use super::types::{
    FsmConfig, FsmInputs, OperatorOverride, SystemState, TransitionEvent, TransitionReason,
};

/// Centralized lifecycle state machine. Owned by the live loop; transitions
/// are sequential and pure (spec.md §5).
pub struct LifecycleFsm {
    state: SystemState,
    state_enter_ts: i64,
    config: FsmConfig,
    last_transition: Option<TransitionEvent>,
}

impl LifecycleFsm {
    pub fn new(config: FsmConfig) -> Self {
        Self {
            state: SystemState::Init,
            state_enter_ts: 0,
            config,
            last_transition: None,
        }
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    pub fn last_transition(&self) -> Option<TransitionEvent> {
        self.last_transition
    }

    pub fn time_in_state_ms(&self, now_ts: i64) -> i64 {
        now_ts - self.state_enter_ts
    }

    fn cooldown_elapsed(&self, now_ts: i64) -> bool {
        self.time_in_state_ms(now_ts) >= self.config.cooldown_ms
    }

    /// Evaluate one tick. Returns `Some(event)` exactly when the state
    /// changes; caller is responsible for logging/metrics on the result.
    pub fn tick(&mut self, inputs: FsmInputs) -> Option<TransitionEvent> {
        let (to_state, reason) = self.evaluate(inputs)?;
        let event = TransitionEvent {
            ts_ms: inputs.ts_ms,
            from_state: self.state,
            to_state,
            reason,
        };
        self.state = to_state;
        self.state_enter_ts = inputs.ts_ms;
        self.last_transition = Some(event);
        Some(event)
    }

    /// Operator-forced transition. Always succeeds, bypassing priority logic.
    pub fn force(&mut self, to_state: SystemState, reason: TransitionReason, ts_ms: i64) -> TransitionEvent {
        let event = TransitionEvent {
            ts_ms,
            from_state: self.state,
            to_state,
            reason,
        };
        self.state = to_state;
        self.state_enter_ts = ts_ms;
        self.last_transition = Some(event);
        event
    }

    fn evaluate(&self, inp: FsmInputs) -> Option<(SystemState, TransitionReason)> {
        if self.state != SystemState::Init {
            if let Some(result) = self.check_emergency(inp) {
                return Some(result);
            }
        }
        match self.state {
            SystemState::Init => self.eval_init(inp),
            SystemState::Ready => self.eval_ready(inp),
            SystemState::Active => self.eval_active(inp),
            SystemState::Throttled => self.eval_throttled(inp),
            SystemState::Paused => self.eval_paused(inp),
            SystemState::Degraded => self.eval_degraded(inp),
            SystemState::Emergency => self.eval_emergency(inp),
        }
    }

    fn check_emergency(&self, inp: FsmInputs) -> Option<(SystemState, TransitionReason)> {
        if self.state == SystemState::Emergency {
            return None;
        }
        if inp.kill_switch_active {
            return Some((SystemState::Emergency, TransitionReason::KillSwitch));
        }
        if inp.operator_override == Some(OperatorOverride::Emergency) {
            return Some((SystemState::Emergency, TransitionReason::OperatorEmergency));
        }
        if self.is_dd_breached(inp) {
            return Some((SystemState::Emergency, TransitionReason::DdBreach));
        }
        None
    }

    fn is_feed_stale(&self, inp: FsmInputs) -> bool {
        inp.feed_gap_ms > 0 && inp.feed_gap_ms > self.config.feed_stale_threshold_ms
    }

    fn is_toxic_high(&self, inp: FsmInputs) -> bool {
        inp.toxicity_score_bps > self.config.toxicity_high_threshold_bps
    }

    fn is_toxic_mid(&self, inp: FsmInputs) -> bool {
        inp.spread_bps > self.config.spread_spike_threshold_bps
    }

    fn is_toxic_low(&self, inp: FsmInputs) -> bool {
        !self.is_toxic_mid(inp) && !self.is_toxic_high(inp)
    }

    fn is_dd_breached(&self, inp: FsmInputs) -> bool {
        inp.drawdown_pct >= self.config.drawdown_threshold_pct
    }

    /// `None` (unknown) conservatively counts as "large", blocking EMERGENCY recovery.
    fn is_position_large(&self, inp: FsmInputs) -> bool {
        match inp.position_notional_usd {
            None => true,
            Some(notional) => notional >= self.config.position_notional_threshold_usd,
        }
    }

    fn eval_init(&self, inp: FsmInputs) -> Option<(SystemState, TransitionReason)> {
        if !inp.kill_switch_active && !self.is_feed_stale(inp) {
            return Some((SystemState::Ready, TransitionReason::HealthOk));
        }
        None
    }

    fn eval_ready(&self, inp: FsmInputs) -> Option<(SystemState, TransitionReason)> {
        if self.is_feed_stale(inp) {
            return Some((SystemState::Degraded, TransitionReason::FeedStale));
        }
        if inp.operator_override == Some(OperatorOverride::Pause) {
            return Some((SystemState::Paused, TransitionReason::OperatorPause));
        }
        if self.is_toxic_low(inp) {
            return Some((SystemState::Active, TransitionReason::FeedsReady));
        }
        None
    }

    fn eval_active(&self, inp: FsmInputs) -> Option<(SystemState, TransitionReason)> {
        if self.is_feed_stale(inp) {
            return Some((SystemState::Degraded, TransitionReason::FeedStale));
        }
        if inp.operator_override == Some(OperatorOverride::Pause) {
            return Some((SystemState::Paused, TransitionReason::OperatorPause));
        }
        if self.is_toxic_high(inp) {
            return Some((SystemState::Paused, TransitionReason::ToxHigh));
        }
        if self.is_toxic_mid(inp) {
            return Some((SystemState::Throttled, TransitionReason::ToxMid));
        }
        None
    }

    fn eval_throttled(&self, inp: FsmInputs) -> Option<(SystemState, TransitionReason)> {
        if self.is_feed_stale(inp) {
            return Some((SystemState::Degraded, TransitionReason::FeedStale));
        }
        if inp.operator_override == Some(OperatorOverride::Pause) {
            return Some((SystemState::Paused, TransitionReason::OperatorPause));
        }
        if self.is_toxic_high(inp) {
            return Some((SystemState::Paused, TransitionReason::ToxHigh));
        }
        if self.is_toxic_low(inp) && self.cooldown_elapsed(inp.ts_ms) {
            return Some((SystemState::Active, TransitionReason::ToxLowCooldown));
        }
        None
    }

    fn eval_paused(&self, inp: FsmInputs) -> Option<(SystemState, TransitionReason)> {
        if self.is_feed_stale(inp) {
            return Some((SystemState::Degraded, TransitionReason::FeedStale));
        }
        if inp.operator_override == Some(OperatorOverride::Pause) {
            return None;
        }
        if !self.cooldown_elapsed(inp.ts_ms) {
            return None;
        }
        if self.is_toxic_low(inp) {
            return Some((SystemState::Active, TransitionReason::ToxLowCooldown));
        }
        if self.is_toxic_mid(inp) {
            return Some((SystemState::Throttled, TransitionReason::ToxMidCooldown));
        }
        None
    }

    fn eval_degraded(&self, inp: FsmInputs) -> Option<(SystemState, TransitionReason)> {
        if self.is_feed_stale(inp) {
            return None;
        }
        if self.cooldown_elapsed(inp.ts_ms) {
            return Some((SystemState::Ready, TransitionReason::FeedRecovered));
        }
        None
    }

    fn eval_emergency(&self, inp: FsmInputs) -> Option<(SystemState, TransitionReason)> {
        if !self.is_position_large(inp) && !inp.kill_switch_active && !self.is_dd_breached(inp) {
            return Some((SystemState::Paused, TransitionReason::PositionReduced));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn inputs(ts_ms: i64, feed_gap_ms: i64) -> FsmInputs {
        FsmInputs {
            ts_ms,
            kill_switch_active: false,
            drawdown_pct: dec!(0),
            feed_gap_ms,
            spread_bps: 0,
            toxicity_score_bps: 0,
            position_notional_usd: Some(dec!(0)),
            operator_override: None,
        }
    }

    fn active_fsm() -> LifecycleFsm {
        active_fsm_with_config(FsmConfig::default())
    }

    fn active_fsm_with_config(config: FsmConfig) -> LifecycleFsm {
        let mut fsm = LifecycleFsm::new(config);
        fsm.tick(inputs(0, 0));
        fsm.tick(inputs(0, 0)); // READY -> ACTIVE (toxicity low)
        assert_eq!(fsm.state(), SystemState::Active);
        fsm
    }

    /// S1 — stale feed then recover (spec.md §8). Uses the scenario's own
    /// cooldown of 5_000ms, not `FsmConfig::default()`'s 30_000ms.
    #[test]
    fn s1_stale_feed_then_recover() {
        let mut fsm = active_fsm_with_config(FsmConfig {
            cooldown_ms: 5_000,
            ..FsmConfig::default()
        });

        let ev = fsm.tick(inputs(20_000, 10_000)).unwrap();
        assert_eq!(ev.to_state, SystemState::Degraded);
        assert_eq!(ev.reason, TransitionReason::FeedStale);

        assert!(fsm.tick(inputs(21_000, 1_000)).is_none());
        assert!(fsm.tick(inputs(22_000, 1_000)).is_none());
        assert!(fsm.tick(inputs(23_000, 1_000)).is_none());

        let ev = fsm.tick(inputs(26_000, 1_000)).unwrap();
        assert_eq!(ev.from_state, SystemState::Degraded);
        assert_eq!(ev.to_state, SystemState::Ready);
        assert_eq!(ev.reason, TransitionReason::FeedRecovered);
    }

    #[test]
    fn kill_switch_forces_emergency_from_any_non_init_state() {
        let mut fsm = active_fsm();
        let mut inp = inputs(1, 0);
        inp.kill_switch_active = true;
        let ev = fsm.tick(inp).unwrap();
        assert_eq!(ev.to_state, SystemState::Emergency);
        assert_eq!(ev.reason, TransitionReason::KillSwitch);
    }

    #[test]
    fn drawdown_breach_forces_emergency() {
        let mut fsm = active_fsm();
        let mut inp = inputs(1, 0);
        inp.drawdown_pct = dec!(0.25);
        let ev = fsm.tick(inp).unwrap();
        assert_eq!(ev.to_state, SystemState::Emergency);
        assert_eq!(ev.reason, TransitionReason::DdBreach);
    }

    #[test]
    fn emergency_recovery_blocked_by_unknown_position() {
        let mut fsm = active_fsm();
        let mut inp = inputs(1, 0);
        inp.kill_switch_active = true;
        fsm.tick(inp);
        assert_eq!(fsm.state(), SystemState::Emergency);

        let mut recover = inputs(2, 0);
        recover.position_notional_usd = None;
        assert!(fsm.tick(recover).is_none());

        let mut recover_known = inputs(3, 0);
        recover_known.position_notional_usd = Some(dec!(1));
        let ev = fsm.tick(recover_known).unwrap();
        assert_eq!(ev.to_state, SystemState::Paused);
        assert_eq!(ev.reason, TransitionReason::PositionReduced);
    }

    #[test]
    fn init_never_skips_to_active() {
        let mut fsm = LifecycleFsm::new(FsmConfig::default());
        assert_eq!(fsm.state(), SystemState::Init);
        let mut inp = inputs(0, 0);
        inp.toxicity_score_bps = 0;
        let ev = fsm.tick(inp).unwrap();
        assert_eq!(ev.to_state, SystemState::Ready);
    }

    #[test]
    fn allowed_intents_contract() {
        use super::super::types::{allowed_intents, is_intent_allowed, OrderIntent};
        for &state in &[
            SystemState::Init,
            SystemState::Ready,
            SystemState::Active,
            SystemState::Throttled,
            SystemState::Paused,
            SystemState::Degraded,
            SystemState::Emergency,
        ] {
            let allowed = allowed_intents(state);
            if state == SystemState::Init {
                assert!(allowed.is_empty());
            } else {
                assert!(is_intent_allowed(state, OrderIntent::Cancel));
            }
            assert_eq!(
                is_intent_allowed(state, OrderIntent::IncreaseRisk),
                state == SystemState::Active
            );
        }
    }
}
