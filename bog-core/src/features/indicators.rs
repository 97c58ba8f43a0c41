//! Volatility and microstructure indicators computed from completed bars
//! plus the current snapshot (spec.md §4.B).

use super::bar::MidBar;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const BPS_SCALE: i64 = 10_000;

/// True range of one bar against the previous bar's close.
pub fn true_range(bar: &MidBar, prev_close: Decimal) -> Decimal {
    let hl = bar.high - bar.low;
    let hc = (bar.high - prev_close).abs();
    let lc = (bar.low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// ATR over the last `period` true ranges. Requires at least `period + 1`
/// bars (one extra for the leading previous-close); `None` otherwise.
pub fn atr(bars: &[MidBar], period: usize) -> Option<Decimal> {
    if period == 0 || bars.len() < period + 1 {
        return None;
    }
    let start = bars.len() - period;
    let mut sum = Decimal::ZERO;
    for i in start..bars.len() {
        sum += true_range(&bars[i], bars[i - 1].close);
    }
    Some(sum / Decimal::from(period as u64))
}

/// NATR in integer bps: `round(atr / last_close * 10000)`. Zero on missing
/// data or a zero close (spec.md §4.B).
pub fn natr_bps(atr_value: Option<Decimal>, last_close: Decimal) -> i64 {
    match atr_value {
        Some(a) if !last_close.is_zero() => {
            let bps = a / last_close * Decimal::from(BPS_SCALE);
            bps.round().to_i64().unwrap_or(0)
        }
        _ => 0,
    }
}

/// L1 order-book imbalance in bps: `(bid_qty - ask_qty) / (bid_qty + ask_qty + eps) * 10000`.
pub fn imbalance_l1_bps(bid_qty: Decimal, ask_qty: Decimal) -> i64 {
    let eps = Decimal::new(1, 8);
    let denom = bid_qty + ask_qty + eps;
    if denom.is_zero() {
        return 0;
    }
    ((bid_qty - ask_qty) / denom * Decimal::from(BPS_SCALE))
        .round()
        .to_i64()
        .unwrap_or(0)
}

pub fn thin_l1(bid_qty: Decimal, ask_qty: Decimal) -> Decimal {
    bid_qty.min(ask_qty)
}

/// Range/trend statistics over the last `horizon` bars of closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RangeTrend {
    pub sum_abs_returns_bps: i64,
    pub net_return_bps: i64,
    pub range_score: i64,
}

fn return_bps(from: Decimal, to: Decimal) -> i64 {
    if from.is_zero() {
        return 0;
    }
    ((to - from) / from * Decimal::from(BPS_SCALE))
        .round()
        .to_i64()
        .unwrap_or(0)
}

/// Computes sum of absolute per-step returns, net return, and
/// `range_score = sum_abs / (|net_ret| + 1)` over the trailing `horizon` bars.
pub fn range_trend(bars: &[MidBar], horizon: usize) -> RangeTrend {
    if horizon == 0 || bars.len() < horizon + 1 {
        return RangeTrend::default();
    }
    let start = bars.len() - horizon;
    let mut sum_abs = 0i64;
    for i in start..bars.len() {
        sum_abs += return_bps(bars[i - 1].close, bars[i].close).abs();
    }
    let net = return_bps(bars[start - 1].close, bars[bars.len() - 1].close);
    let range_score = sum_abs / (net.abs() + 1);
    RangeTrend {
        sum_abs_returns_bps: sum_abs,
        net_return_bps: net,
        range_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bar(bar_ts: i64, o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> MidBar {
        MidBar {
            bar_ts,
            open: o,
            high: h,
            low: l,
            close: c,
            tick_count: 1,
        }
    }

    #[test]
    fn true_range_picks_the_max_component() {
        let b = bar(0, dec!(100), dec!(110), dec!(95), dec!(105));
        // high-low=15, |high-prev|=|110-90|=20, |low-prev|=|95-90|=5
        assert_eq!(true_range(&b, dec!(90)), dec!(20));
    }

    #[test]
    fn atr_requires_period_plus_one_bars() {
        let bars = vec![
            bar(0, dec!(100), dec!(101), dec!(99), dec!(100)),
            bar(1000, dec!(100), dec!(102), dec!(98), dec!(101)),
        ];
        assert_eq!(atr(&bars, 2), None);
        assert!(atr(&bars, 1).is_some());
    }

    #[test]
    fn natr_bps_zero_on_missing_atr_or_zero_close() {
        assert_eq!(natr_bps(None, dec!(100)), 0);
        assert_eq!(natr_bps(Some(dec!(1)), Decimal::ZERO), 0);
        assert_eq!(natr_bps(Some(dec!(1)), dec!(100)), 100);
    }

    #[test]
    fn imbalance_symmetric_at_equal_depth() {
        assert_eq!(imbalance_l1_bps(dec!(10), dec!(10)), 0);
        assert!(imbalance_l1_bps(dec!(20), dec!(10)) > 0);
    }

    #[test]
    fn range_trend_warmup_returns_default() {
        let bars = vec![bar(0, dec!(1), dec!(1), dec!(1), dec!(1))];
        assert_eq!(range_trend(&bars, 2), RangeTrend::default());
    }
}
