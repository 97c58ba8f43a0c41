//! Rolling bar construction from tick snapshots (spec.md §4.B, §3 `MidBar`).
//! Grounded on `examples/original_source/tests/unit/test_bar_builder.py`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A completed OHLC bar. Bar boundaries are aligned by floor division of
/// `ts_ms` against `interval_ms` (spec.md §3 invariant: `bar_ts % interval_ms == 0`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MidBar {
    pub bar_ts: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub tick_count: u32,
}

#[derive(Debug, Clone, Copy, thiserror::Error)]
pub enum BarBuilderConfigError {
    #[error("bar_interval_ms must be positive")]
    NonPositiveInterval,
    #[error("max_bars must be positive")]
    NonPositiveMaxBars,
}

#[derive(Debug, Clone, Copy)]
pub struct BarBuilderConfig {
    pub bar_interval_ms: i64,
    pub max_bars: usize,
}

impl Default for BarBuilderConfig {
    fn default() -> Self {
        Self {
            bar_interval_ms: 60_000,
            max_bars: 1000,
        }
    }
}

impl BarBuilderConfig {
    pub fn validate(&self) -> Result<(), BarBuilderConfigError> {
        if self.bar_interval_ms <= 0 {
            return Err(BarBuilderConfigError::NonPositiveInterval);
        }
        if self.max_bars == 0 {
            return Err(BarBuilderConfigError::NonPositiveMaxBars);
        }
        Ok(())
    }
}

/// Per-symbol bar assembler: a mutable "current bar" plus a bounded ring of
/// completed bars. Never consumes ticks with `ts_ms < last_seen_ts`.
pub struct BarBuilder {
    config: BarBuilderConfig,
    current: Option<MidBar>,
    bars: VecDeque<MidBar>,
    last_seen_ts: Option<i64>,
}

impl BarBuilder {
    pub fn new(config: BarBuilderConfig) -> Result<Self, BarBuilderConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            current: None,
            bars: VecDeque::with_capacity(config.max_bars),
            last_seen_ts: None,
        })
    }

    fn bar_ts_for(&self, ts_ms: i64) -> i64 {
        ts_ms.div_euclid(self.config.bar_interval_ms) * self.config.bar_interval_ms
    }

    /// Feed one tick. Returns `Some(bar)` exactly when this tick crosses a
    /// bar boundary, carrying the bar that just froze; otherwise `None`.
    pub fn process_tick(&mut self, ts_ms: i64, mid_price: Decimal) -> Option<MidBar> {
        if let Some(last) = self.last_seen_ts {
            if ts_ms < last {
                return None;
            }
        }
        self.last_seen_ts = Some(ts_ms);

        let bar_ts = self.bar_ts_for(ts_ms);

        match self.current {
            None => {
                self.current = Some(MidBar {
                    bar_ts,
                    open: mid_price,
                    high: mid_price,
                    low: mid_price,
                    close: mid_price,
                    tick_count: 1,
                });
                None
            }
            Some(ref mut bar) if bar.bar_ts == bar_ts => {
                bar.high = bar.high.max(mid_price);
                bar.low = bar.low.min(mid_price);
                bar.close = mid_price;
                bar.tick_count += 1;
                None
            }
            Some(frozen) => {
                self.push_bar(frozen);
                self.current = Some(MidBar {
                    bar_ts,
                    open: mid_price,
                    high: mid_price,
                    low: mid_price,
                    close: mid_price,
                    tick_count: 1,
                });
                Some(frozen)
            }
        }
    }

    fn push_bar(&mut self, bar: MidBar) {
        if self.bars.len() >= self.config.max_bars {
            self.bars.pop_front();
        }
        self.bars.push_back(bar);
    }

    /// Last `count` completed bars, oldest first.
    pub fn get_bars(&self, count: usize) -> Vec<MidBar> {
        let len = self.bars.len();
        let skip = len.saturating_sub(count);
        self.bars.iter().skip(skip).copied().collect()
    }

    pub fn current_bar(&self) -> Option<MidBar> {
        self.current
    }

    pub fn completed_count(&self) -> usize {
        self.bars.len()
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.bars.clear();
        self.last_seen_ts = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn builder() -> BarBuilder {
        BarBuilder::new(BarBuilderConfig {
            bar_interval_ms: 1000,
            max_bars: 3,
        })
        .unwrap()
    }

    #[test]
    fn invalid_config_rejected() {
        let err = BarBuilderConfig {
            bar_interval_ms: 0,
            max_bars: 10,
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, BarBuilderConfigError::NonPositiveInterval));

        let err = BarBuilderConfig {
            bar_interval_ms: 1000,
            max_bars: 0,
        }
        .validate()
        .unwrap_err();
        assert!(matches!(err, BarBuilderConfigError::NonPositiveMaxBars));
    }

    #[test]
    fn first_tick_does_not_freeze() {
        let mut b = builder();
        assert_eq!(b.process_tick(0, dec!(100)), None);
        assert_eq!(b.completed_count(), 0);
    }

    #[test]
    fn same_bar_ticks_update_ohlc() {
        let mut b = builder();
        b.process_tick(0, dec!(100));
        assert_eq!(b.process_tick(100, dec!(105)), None);
        assert_eq!(b.process_tick(500, dec!(95)), None);
        let cur = b.current_bar().unwrap();
        assert_eq!(cur.open, dec!(100));
        assert_eq!(cur.high, dec!(105));
        assert_eq!(cur.low, dec!(95));
        assert_eq!(cur.close, dec!(95));
        assert_eq!(cur.tick_count, 3);
    }

    #[test]
    fn boundary_crossing_freezes_and_starts_new_bar() {
        let mut b = builder();
        b.process_tick(0, dec!(100));
        b.process_tick(500, dec!(110));
        let frozen = b.process_tick(1000, dec!(120)).unwrap();
        assert_eq!(frozen.bar_ts, 0);
        assert_eq!(frozen.close, dec!(110));
        assert_eq!(frozen.tick_count, 2);

        let cur = b.current_bar().unwrap();
        assert_eq!(cur.bar_ts, 1000);
        assert_eq!(cur.open, dec!(120));
        assert_eq!(cur.tick_count, 1);
    }

    #[test]
    fn out_of_order_tick_is_skipped() {
        let mut b = builder();
        b.process_tick(1000, dec!(100));
        assert_eq!(b.process_tick(999, dec!(50)), None);
        let cur = b.current_bar().unwrap();
        // unaffected by the skipped regression
        assert_eq!(cur.open, dec!(100));
        assert_eq!(cur.tick_count, 1);
    }

    #[test]
    fn max_bars_evicts_oldest() {
        let mut b = builder();
        b.process_tick(0, dec!(1));
        for i in 1..=4 {
            b.process_tick(i * 1000, dec!(1));
        }
        assert_eq!(b.completed_count(), 3);
        let bars = b.get_bars(10);
        assert_eq!(bars.first().unwrap().bar_ts, 1000);
    }

    #[test]
    fn reset_clears_state() {
        let mut b = builder();
        b.process_tick(0, dec!(1));
        b.process_tick(1000, dec!(1));
        b.reset();
        assert_eq!(b.completed_count(), 0);
        assert!(b.current_bar().is_none());
    }
}
