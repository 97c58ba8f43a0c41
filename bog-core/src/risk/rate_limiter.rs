//! Timestamp-based cooldown and sliding-window order rate limiter
//! (spec.md §4.D). No system clock is read; `ts_ms` is always an explicit
//! parameter so the gate stays deterministic and testable.

use parking_lot::Mutex;
use std::collections::VecDeque;

use super::types::{AllowDecision, AllowReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    pub cooldown_ms: i64,
    pub max_per_minute: usize,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 100,
            max_per_minute: 5,
        }
    }
}

const WINDOW_MS: i64 = 60_000;

struct State {
    window: VecDeque<i64>,
}

/// Sliding-window order limiter with an additional per-order cooldown.
/// `check` is pure with respect to its argument but reads/prunes the
/// internal window; `record_order` is the only mutation that adds an order.
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<State>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                window: VecDeque::new(),
            }),
        }
    }

    fn evict(window: &mut VecDeque<i64>, ts_ms: i64) {
        while let Some(&front) = window.front() {
            if ts_ms - front > WINDOW_MS {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Rate-limit count takes priority over cooldown: a full window blocks
    /// with `RATE_LIMIT_EXCEEDED` even when the gap since the last order
    /// would otherwise also trip the cooldown (spec.md §8 scenario S5).
    pub fn check(&self, ts_ms: i64) -> AllowDecision {
        let mut guard = self.state.lock();
        Self::evict(&mut guard.window, ts_ms);

        if guard.window.len() >= self.config.max_per_minute {
            return AllowDecision::block(
                AllowReason::RateLimitExceeded,
                format!("current_count={}", guard.window.len()),
            );
        }

        if let Some(&last) = guard.window.back() {
            let elapsed = ts_ms - last;
            if elapsed < self.config.cooldown_ms {
                let remaining_ms = self.config.cooldown_ms - elapsed;
                return AllowDecision::block(
                    AllowReason::CooldownActive,
                    format!("remaining_ms={remaining_ms}"),
                );
            }
        }

        AllowDecision::allow()
    }

    /// Records that an order was actually placed at `ts_ms`.
    pub fn record_order(&self, ts_ms: i64) {
        let mut guard = self.state.lock();
        Self::evict(&mut guard.window, ts_ms);
        guard.window.push_back(ts_ms);
    }

    pub fn reset(&self) {
        self.state.lock().window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            cooldown_ms: 100,
            max_per_minute: 5,
        })
    }

    /// S5 — rate limiter (spec.md §8).
    #[test]
    fn s5_rate_limiter_scenario() {
        let rl = limiter();

        let d = rl.check(1000);
        assert!(d.allowed);
        rl.record_order(1000);

        let d = rl.check(1050);
        assert!(!d.allowed);
        assert_eq!(d.reason, AllowReason::CooldownActive);
        assert_eq!(d.details, "remaining_ms=50");

        for ts in [1100, 1200, 1300, 1400] {
            let d = rl.check(ts);
            assert!(d.allowed, "ts={ts} should be allowed");
            rl.record_order(ts);
        }

        let d = rl.check(1401);
        assert!(!d.allowed);
        assert_eq!(d.reason, AllowReason::RateLimitExceeded);
        assert_eq!(d.details, "current_count=5");
    }

    #[test]
    fn window_evicts_entries_older_than_60s() {
        let rl = limiter();
        rl.record_order(0);
        rl.record_order(100);
        rl.record_order(200);
        rl.record_order(300);
        rl.record_order(400);

        let d = rl.check(60_401);
        assert!(d.allowed, "all five entries are now older than 60s");
    }

    #[test]
    fn reset_clears_window() {
        let rl = limiter();
        rl.record_order(0);
        rl.reset();
        let d = rl.check(10);
        assert!(d.allowed);
    }
}
