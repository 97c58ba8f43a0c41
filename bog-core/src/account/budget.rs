//! Daily remediation budget (spec.md §4.I gate 7, §6 persisted state).
//!
//! No wall-clock reads here: the caller supplies today's UTC date string
//! (`"YYYY-MM-DD"`) explicitly, matching spec.md §5's "no component reads
//! wall-clock time directly". Persistence uses atomic tmp-file + rename,
//! the same pattern the teacher guards shared state with before touching
//! the filesystem.

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub date: String,
    pub calls_today: u64,
    pub notional_today: Decimal,
}

impl BudgetState {
    pub fn fresh(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            calls_today: 0,
            notional_today: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetBlockReason {
    PerRunCalls,
    PerRunNotional,
    PerDayCalls,
    PerDayNotional,
}

impl BudgetBlockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            BudgetBlockReason::PerRunCalls => "budget_per_run_calls",
            BudgetBlockReason::PerRunNotional => "budget_per_run_notional",
            BudgetBlockReason::PerDayCalls => "budget_per_day_calls",
            BudgetBlockReason::PerDayNotional => "budget_per_day_notional",
        }
    }
}

/// Tracks both per-process-run and per-UTC-day remediation spend. A run's
/// counters reset when the tracker is constructed (one per orchestrator
/// process lifetime); the day's counters persist to `state_path` across
/// restarts and roll over on the first call after UTC midnight.
pub struct BudgetTracker {
    state_path: String,
    max_calls_per_day: u64,
    max_notional_per_day: Decimal,
    max_calls_per_run: u64,
    max_notional_per_run: Decimal,
    state: Mutex<BudgetState>,
    run_calls: Mutex<u64>,
    run_notional: Mutex<Decimal>,
}

impl BudgetTracker {
    pub fn new(config: &crate::config::BudgetConfig, today: &str) -> Self {
        let state = Self::load(&config.state_path, today);
        Self {
            state_path: config.state_path.clone(),
            max_calls_per_day: config.max_calls_per_day,
            max_notional_per_day: config.max_notional_per_day,
            max_calls_per_run: config.max_calls_per_run,
            max_notional_per_run: config.max_notional_per_run,
            state: Mutex::new(state),
            run_calls: Mutex::new(0),
            run_notional: Mutex::new(Decimal::ZERO),
        }
    }

    fn load(path: &str, today: &str) -> BudgetState {
        let loaded = fs::read_to_string(path)
            .ok()
            .and_then(|raw| serde_json::from_str::<BudgetState>(&raw).ok());
        match loaded {
            Some(state) if state.date == today => state,
            _ => BudgetState::fresh(today),
        }
    }

    fn persist(&self, state: &BudgetState) -> io::Result<()> {
        let tmp_path = format!("{}.tmp", self.state_path);
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &self.state_path)?;
        Ok(())
    }

    /// Returns the first budget limit `notional` would exceed, if any.
    /// Does not mutate any counter — call `record` only after the
    /// remediation call itself has actually succeeded.
    pub fn check(&self, notional: Decimal, today: &str) -> Option<BudgetBlockReason> {
        let run_calls = *self.run_calls.lock();
        let run_notional = *self.run_notional.lock();
        if run_calls + 1 > self.max_calls_per_run {
            return Some(BudgetBlockReason::PerRunCalls);
        }
        if run_notional + notional > self.max_notional_per_run {
            return Some(BudgetBlockReason::PerRunNotional);
        }

        let state = self.state.lock();
        let (calls_today, notional_today) = if state.date == today {
            (state.calls_today, state.notional_today)
        } else {
            (0, Decimal::ZERO)
        };
        if calls_today + 1 > self.max_calls_per_day {
            return Some(BudgetBlockReason::PerDayCalls);
        }
        if notional_today + notional > self.max_notional_per_day {
            return Some(BudgetBlockReason::PerDayNotional);
        }
        None
    }

    /// Records a successful remediation call: increments the run counters,
    /// rolls the persisted day forward if `today` differs from the stored
    /// date, then persists atomically.
    pub fn record(&self, notional: Decimal, today: &str) -> io::Result<()> {
        *self.run_calls.lock() += 1;
        *self.run_notional.lock() += notional;

        let mut state = self.state.lock();
        if state.date != today {
            *state = BudgetState::fresh(today);
        }
        state.calls_today += 1;
        state.notional_today += notional;
        self.persist(&state)
    }

    pub fn state_snapshot(&self) -> BudgetState {
        self.state.lock().clone()
    }

    pub fn run_calls_used(&self) -> u64 {
        *self.run_calls.lock()
    }
}
