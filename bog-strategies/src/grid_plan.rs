//! Grid-plan construction: turns a [`FeatureSnapshot`] and the lifecycle
//! FSM's current [`SystemState`] into the [`GridPlan`] the execution engine
//! reconciles against (spec.md §3, §4.E). Spacing is driven by NATR rather
//! than the teacher's raw rolling-stdev/EWMA/Parkinson volatility estimators
//! in `bog-strategies/src/volatility.rs` — the feature engine (spec.md §4.B)
//! already produces `natr_bps` per tick, so this module's job narrows to
//! mapping that single normalized number onto spacing, the way the teacher's
//! estimators fed a spread-adjustment formula.

use bog_core::execution::{GridMode, GridPlan, ResetAction};
use bog_core::features::FeatureSnapshot;
use bog_core::fsm::SystemState;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Closed knobs for one symbol's grid. Everything here is a plain value —
/// no env reads, no wall-clock — so the binary/adapter layer owns sourcing
/// it from configuration.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub levels_up: u32,
    pub levels_down: u32,
    pub size_schedule: Vec<Decimal>,
    /// Spacing floor used before the feature engine is warmed up, and as a
    /// hard lower bound afterward.
    pub min_spacing_bps: i64,
    pub max_spacing_bps: i64,
    /// `spacing_bps = clamp(natr_bps * multiplier, min, max)`.
    pub natr_spacing_multiplier: Decimal,
    /// Maximum magnitude of the L1-imbalance-driven price skew, applied
    /// price-only (spec.md §9 decision 2).
    pub max_skew_bps: i64,
    /// Minimum change in `spacing_bps` between two plans for the same
    /// symbol that upgrades the next plan's `reset_action` from `None` to
    /// `Soft` — below this, a replan keeps `None` and the engine's normal
    /// per-level diff handles any drift.
    pub soft_reset_spacing_delta_bps: i64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            levels_up: 5,
            levels_down: 5,
            size_schedule: vec![Decimal::new(1, 2)],
            min_spacing_bps: 10,
            max_spacing_bps: 200,
            natr_spacing_multiplier: Decimal::new(15, 1),
            max_skew_bps: 20,
            soft_reset_spacing_delta_bps: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LastPlan {
    mode: GridMode,
    spacing_bps: i64,
}

/// Stateful only in the sense of remembering the previous plan per symbol,
/// so it can pick a `reset_action` — the grid math itself is a pure
/// function of `(features, system_state, config)` on every call, mirroring
/// the execution engine's own purity (spec.md §4.E).
#[derive(Debug, Default)]
pub struct GridPlanBuilder {
    last: HashMap<String, LastPlan>,
}

impl GridPlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the desired [`GridPlan`] for `symbol` given the latest
    /// feature snapshot, the FSM's current state, and this symbol's
    /// [`StrategyConfig`].
    pub fn build(
        &mut self,
        symbol: &str,
        features: &FeatureSnapshot,
        system_state: SystemState,
        config: &StrategyConfig,
    ) -> GridPlan {
        let mode = mode_for_state(system_state, features);
        let spacing_bps = spacing_for(features, config);
        let skew_bps = skew_for(features, config);

        let reset_action = self.reset_action_for(symbol, mode, spacing_bps, config);

        self.last.insert(symbol.to_string(), LastPlan { mode, spacing_bps });

        GridPlan {
            mode,
            center_price: features.mid_price,
            spacing_bps,
            levels_up: config.levels_up,
            levels_down: config.levels_down,
            size_schedule: config.size_schedule.clone(),
            skew_bps,
            reset_action,
        }
    }

    fn reset_action_for(
        &self,
        symbol: &str,
        mode: GridMode,
        spacing_bps: i64,
        config: &StrategyConfig,
    ) -> ResetAction {
        match self.last.get(symbol) {
            None => ResetAction::None,
            Some(prev) => {
                if prev.mode != mode {
                    ResetAction::Hard
                } else if (prev.spacing_bps - spacing_bps).abs() >= config.soft_reset_spacing_delta_bps {
                    ResetAction::Soft
                } else {
                    ResetAction::None
                }
            }
        }
    }

    pub fn reset_symbol(&mut self, symbol: &str) {
        self.last.remove(symbol);
    }
}

/// `Active` runs the full two-sided grid; every other FSM state that still
/// permits `ReduceRisk`/`Cancel` narrows to a mode the engine cancels down
/// to (spec.md §4.C's allowed-intent matrix is enforced again, independently,
/// by the orchestrator — this mapping only decides the *shape* of the plan
/// that narrowing is applied to).
fn mode_for_state(state: SystemState, features: &FeatureSnapshot) -> GridMode {
    match state {
        SystemState::Active => {
            if !features.is_warmed_up {
                GridMode::Pause
            } else {
                GridMode::TwoSided
            }
        }
        SystemState::Throttled | SystemState::Degraded => GridMode::TwoSided,
        SystemState::Paused | SystemState::Init | SystemState::Ready => GridMode::Pause,
        SystemState::Emergency => GridMode::Emergency,
    }
}

/// NATR-bps-driven spacing (spec.md §4.B's `natr_bps`), clamped to the
/// configured band; falls back to the floor before warmup so the first
/// plans built on a cold feature engine don't compute a zero-width grid.
fn spacing_for(features: &FeatureSnapshot, config: &StrategyConfig) -> i64 {
    if !features.is_warmed_up {
        return config.min_spacing_bps;
    }
    let scaled = (Decimal::from(features.natr_bps) * config.natr_spacing_multiplier)
        .round()
        .to_string()
        .parse::<i64>()
        .unwrap_or(config.min_spacing_bps);
    scaled.clamp(config.min_spacing_bps, config.max_spacing_bps)
}

/// Tilts the grid away from the thin side of the book: a positive
/// `imbalance_l1_bps` (more bid depth than ask) skews the center up, per
/// the teacher's spread-adjustment intent in `volatility.rs`, generalized
/// from a volatility signal to an order-book-imbalance one. Price-only
/// (spec.md §9 decision 2) — qty never changes because of skew.
fn skew_for(features: &FeatureSnapshot, config: &StrategyConfig) -> i64 {
    let raw = features.imbalance_l1_bps / 4;
    raw.clamp(-config.max_skew_bps, config.max_skew_bps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bog_core::features::indicators::RangeTrend;
    use rust_decimal_macros::dec;

    fn feature_snapshot(natr_bps: i64, imbalance_l1_bps: i64, warmed_up: bool) -> FeatureSnapshot {
        FeatureSnapshot {
            ts_ms: 1_000,
            mid_price: dec!(50000),
            spread_bps: 2,
            imbalance_l1_bps,
            thin_l1: dec!(0.1),
            natr_bps,
            atr: Some(dec!(10)),
            warmup_bars: 20,
            range_trend: RangeTrend::default(),
            is_warmed_up: warmed_up,
        }
    }

    #[test]
    fn cold_engine_plans_a_paused_grid_at_the_floor_spacing() {
        let mut builder = GridPlanBuilder::new();
        let plan = builder.build(
            "BTCUSDT",
            &feature_snapshot(0, 0, false),
            SystemState::Active,
            &StrategyConfig::default(),
        );
        assert_eq!(plan.mode, GridMode::Pause);
        assert_eq!(plan.spacing_bps, StrategyConfig::default().min_spacing_bps);
        assert_eq!(plan.reset_action, ResetAction::None);
    }

    #[test]
    fn warmed_up_active_state_runs_two_sided_with_natr_spacing() {
        let mut builder = GridPlanBuilder::new();
        let config = StrategyConfig::default();
        let plan = builder.build("BTCUSDT", &feature_snapshot(20, 0, true), SystemState::Active, &config);
        assert_eq!(plan.mode, GridMode::TwoSided);
        assert_eq!(plan.spacing_bps, 30);
    }

    #[test]
    fn spacing_is_clamped_to_the_configured_band() {
        let mut builder = GridPlanBuilder::new();
        let config = StrategyConfig::default();
        let plan = builder.build("BTCUSDT", &feature_snapshot(1_000, 0, true), SystemState::Active, &config);
        assert_eq!(plan.spacing_bps, config.max_spacing_bps);
    }

    #[test]
    fn skew_tilts_toward_thicker_side_and_is_clamped() {
        let config = StrategyConfig::default();
        assert_eq!(skew_for(&feature_snapshot(20, 400, true), &config), config.max_skew_bps);
        assert_eq!(skew_for(&feature_snapshot(20, -40, true), &config), -10);
    }

    #[test]
    fn mode_change_between_plans_forces_a_hard_reset() {
        let mut builder = GridPlanBuilder::new();
        let config = StrategyConfig::default();
        builder.build("BTCUSDT", &feature_snapshot(20, 0, true), SystemState::Active, &config);
        let plan = builder.build("BTCUSDT", &feature_snapshot(20, 0, true), SystemState::Paused, &config);
        assert_eq!(plan.reset_action, ResetAction::Hard);
    }

    #[test]
    fn large_spacing_swing_without_mode_change_is_a_soft_reset() {
        let mut builder = GridPlanBuilder::new();
        let config = StrategyConfig::default();
        builder.build("BTCUSDT", &feature_snapshot(5, 0, true), SystemState::Active, &config);
        let plan = builder.build("BTCUSDT", &feature_snapshot(60, 0, true), SystemState::Active, &config);
        assert_eq!(plan.reset_action, ResetAction::Soft);
    }

    #[test]
    fn reset_symbol_forgets_history_so_next_plan_is_unreset() {
        let mut builder = GridPlanBuilder::new();
        let config = StrategyConfig::default();
        builder.build("BTCUSDT", &feature_snapshot(5, 0, true), SystemState::Active, &config);
        builder.reset_symbol("BTCUSDT");
        let plan = builder.build("BTCUSDT", &feature_snapshot(60, 0, true), SystemState::Active, &config);
        assert_eq!(plan.reset_action, ResetAction::None);
    }
}
