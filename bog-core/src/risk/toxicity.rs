//! Price-impact / toxicity measurement (spec.md §4.D).
//!
//! This gate only measures; it never decides. Callers convert the raw
//! `price_impact_bps`/spread numerics into FSM toxicity signals — the
//! lifecycle FSM owns the thresholds (spec.md §4.C).

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToxicityGateConfig {
    /// How far back (ms) a price sample remains eligible for impact lookup.
    pub lookback_ms: i64,
    pub max_samples_per_symbol: usize,
}

impl Default for ToxicityGateConfig {
    fn default() -> Self {
        Self {
            lookback_ms: 5_000,
            max_samples_per_symbol: 256,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PriceSample {
    ts_ms: i64,
    mid: Decimal,
}

/// Per-symbol bounded price history used to compute price impact over a
/// lookback window.
pub struct ToxicityGate {
    config: ToxicityGateConfig,
    history: HashMap<String, VecDeque<PriceSample>>,
}

impl ToxicityGate {
    pub fn new(config: ToxicityGateConfig) -> Self {
        Self {
            config,
            history: HashMap::new(),
        }
    }

    /// Record a mid-price observation for `symbol` at `ts_ms`.
    pub fn record(&mut self, symbol: &str, ts_ms: i64, mid: Decimal) {
        let entry = self
            .history
            .entry(symbol.to_string())
            .or_insert_with(VecDeque::new);
        entry.push_back(PriceSample { ts_ms, mid });
        while entry.len() > self.config.max_samples_per_symbol {
            entry.pop_front();
        }
    }

    /// Signed price move in bps from the oldest in-window sample to `mid` at
    /// `ts_ms`, i.e. how much the market has moved against a resting quote
    /// over the lookback window. Returns `None` with no prior samples for
    /// `symbol` within the window.
    pub fn price_impact_bps(&self, symbol: &str, ts_ms: i64, mid: Decimal) -> Option<i64> {
        let entry = self.history.get(symbol)?;
        let cutoff = ts_ms - self.config.lookback_ms;
        let reference = entry.iter().find(|s| s.ts_ms >= cutoff)?;
        if reference.mid.is_zero() {
            return None;
        }
        let delta_bps = (mid - reference.mid) / reference.mid * Decimal::from(10_000);
        delta_bps.round().to_i64()
    }

    /// Spread in bps exceeds `threshold_bps`.
    pub fn spread_exceeds(&self, spread_bps: i64, threshold_bps: i64) -> bool {
        spread_bps > threshold_bps
    }

    pub fn reset(&mut self, symbol: &str) {
        self.history.remove(symbol);
    }

    pub fn reset_all(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn gate() -> ToxicityGate {
        ToxicityGate::new(ToxicityGateConfig {
            lookback_ms: 5_000,
            max_samples_per_symbol: 256,
        })
    }

    #[test]
    fn no_samples_returns_none() {
        let g = gate();
        assert_eq!(g.price_impact_bps("BTCUSDT", 1_000, dec!(100)), None);
    }

    #[test]
    fn impact_computed_against_oldest_in_window_sample() {
        let mut g = gate();
        g.record("BTCUSDT", 0, dec!(100));
        g.record("BTCUSDT", 2_000, dec!(101));
        let impact = g.price_impact_bps("BTCUSDT", 3_000, dec!(105)).unwrap();
        assert_eq!(impact, 500);
    }

    #[test]
    fn samples_outside_lookback_ignored() {
        let mut g = gate();
        g.record("BTCUSDT", 0, dec!(100));
        let impact = g.price_impact_bps("BTCUSDT", 10_000, dec!(105));
        assert_eq!(impact, None);
    }

    #[test]
    fn ring_buffer_bounded_per_symbol() {
        let mut g = ToxicityGate::new(ToxicityGateConfig {
            lookback_ms: 100_000,
            max_samples_per_symbol: 3,
        });
        for i in 0..10 {
            g.record("BTCUSDT", i * 10, dec!(100));
        }
        assert_eq!(g.history.get("BTCUSDT").unwrap().len(), 3);
    }

    #[test]
    fn spread_exceeds_threshold() {
        let g = gate();
        assert!(g.spread_exceeds(51, 50));
        assert!(!g.spread_exceeds(50, 50));
    }

    #[test]
    fn symbols_are_isolated() {
        let mut g = gate();
        g.record("BTCUSDT", 0, dec!(100));
        assert_eq!(g.price_impact_bps("ETHUSDT", 1_000, dec!(50)), None);
    }
}
