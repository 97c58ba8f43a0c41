//! Per-symbol feature engine: `process_snapshot(snap) -> FeatureSnapshot`
//! (spec.md §4.B). Isolated per-symbol state; `reset()`/`reset_symbol` clear it.

use super::bar::{BarBuilder, BarBuilderConfig, BarBuilderConfigError};
use super::indicators::{atr, imbalance_l1_bps, natr_bps, range_trend, thin_l1, RangeTrend};
use crate::core::types::Snapshot;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct FeatureEngineConfig {
    pub bar: BarBuilderConfig,
    pub atr_period: usize,
    pub trend_horizon: usize,
}

impl Default for FeatureEngineConfig {
    fn default() -> Self {
        Self {
            bar: BarBuilderConfig::default(),
            atr_period: 14,
            trend_horizon: 20,
        }
    }
}

/// Derived per-tick view, purely computed from past bars + the current
/// snapshot. Has no identity of its own (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureSnapshot {
    pub ts_ms: i64,
    pub mid_price: Decimal,
    pub spread_bps: i64,
    pub imbalance_l1_bps: i64,
    pub thin_l1: Decimal,
    pub natr_bps: i64,
    pub atr: Option<Decimal>,
    pub warmup_bars: usize,
    pub range_trend: RangeTrend,
    pub is_warmed_up: bool,
}

struct SymbolState {
    bars: BarBuilder,
    last_ts: Option<i64>,
}

/// Isolated per-symbol feature assembly.
pub struct FeatureEngine {
    config: FeatureEngineConfig,
    symbols: HashMap<String, SymbolState>,
}

impl FeatureEngine {
    pub fn new(config: FeatureEngineConfig) -> Result<Self, BarBuilderConfigError> {
        config.bar.validate()?;
        Ok(Self {
            config,
            symbols: HashMap::new(),
        })
    }

    fn warmup_threshold(&self) -> usize {
        (self.config.atr_period + 1).max(self.config.trend_horizon + 1)
    }

    pub fn process_snapshot(&mut self, snap: &Snapshot) -> Option<FeatureSnapshot> {
        if let Some(state) = self.symbols.get(&snap.symbol) {
            if let Some(last) = state.last_ts {
                if snap.ts_ms < last {
                    return None;
                }
            }
        }

        let state = self.symbols.entry(snap.symbol.clone()).or_insert_with(|| SymbolState {
            bars: BarBuilder::new(self.config.bar).expect("validated at engine construction"),
            last_ts: None,
        });
        state.last_ts = Some(snap.ts_ms);

        let mid = snap.mid_price();
        state.bars.process_tick(snap.ts_ms, mid);

        let warmup_bars = state.bars.completed_count();
        let threshold = self.warmup_threshold();
        let is_warmed_up = warmup_bars >= threshold;

        let completed = state.bars.get_bars(warmup_bars.max(self.config.trend_horizon + 1));
        let atr_value = if is_warmed_up {
            atr(&completed, self.config.atr_period)
        } else {
            None
        };
        let last_close = completed.last().map(|b| b.close).unwrap_or(mid);
        let natr = natr_bps(atr_value, last_close);
        let trend = if is_warmed_up {
            range_trend(&completed, self.config.trend_horizon)
        } else {
            RangeTrend::default()
        };

        let spread_bps = if mid.is_zero() {
            0
        } else {
            use rust_decimal::prelude::ToPrimitive;
            (snap.spread() / mid * Decimal::from(10_000))
                .round()
                .to_i64()
                .unwrap_or(0)
        };

        Some(FeatureSnapshot {
            ts_ms: snap.ts_ms,
            mid_price: mid,
            spread_bps,
            imbalance_l1_bps: imbalance_l1_bps(snap.best_bid_qty, snap.best_ask_qty),
            thin_l1: thin_l1(snap.best_bid_qty, snap.best_ask_qty),
            natr_bps: natr,
            atr: atr_value,
            warmup_bars,
            range_trend: trend,
            is_warmed_up,
        })
    }

    pub fn reset(&mut self) {
        self.symbols.clear();
    }

    pub fn reset_symbol(&mut self, symbol: &str) {
        self.symbols.remove(symbol);
    }
}
