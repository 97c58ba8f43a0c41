//! Consecutive-loss circuit gate (spec.md §4.D).
//! Grounded on `examples/original_source/src/grinder/risk/` consecutive-loss
//! guard and `.../tests/test_consecutive_loss_guard.py`.

use serde::{Deserialize, Serialize};

/// Realized outcome of one closed trade. `Breakeven` and `Unknown` are
/// no-ops: they neither extend nor reset the loss streak (REQ-003/004).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeOutcome {
    Win,
    Loss,
    Breakeven,
    /// Outcome could not be determined (e.g. an empty/missing PnL field).
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsecutiveLossConfig {
    pub enabled: bool,
    pub max_consecutive_losses: u32,
}

impl Default for ConsecutiveLossConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_consecutive_losses: 3,
        }
    }
}

/// Persisted state; round-trips through `serde_json` for the account
/// syncer's periodic snapshot (spec.md §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsecutiveLossState {
    pub streak: u32,
    pub tripped: bool,
    pub last_row_id: Option<i64>,
    pub last_ts_ms: Option<i64>,
}

impl Default for ConsecutiveLossState {
    fn default() -> Self {
        Self {
            streak: 0,
            tripped: false,
            last_row_id: None,
            last_ts_ms: None,
        }
    }
}

/// Trips once the loss streak reaches the configured threshold and stays
/// tripped until `reset()`. A win resets the streak but not a trip already
/// latched. A disabled guard never trips and its streak stays at 0
/// regardless of what outcomes it is fed (REQ-004).
pub struct ConsecutiveLossGuard {
    config: ConsecutiveLossConfig,
    state: ConsecutiveLossState,
}

impl ConsecutiveLossGuard {
    pub fn new(config: ConsecutiveLossConfig) -> Self {
        Self {
            config,
            state: ConsecutiveLossState::default(),
        }
    }

    pub fn from_state(config: ConsecutiveLossConfig, state: ConsecutiveLossState) -> Self {
        Self { config, state }
    }

    pub fn state(&self) -> ConsecutiveLossState {
        self.state
    }

    pub fn is_tripped(&self) -> bool {
        self.config.enabled && self.state.tripped
    }

    /// Feed one realized trade outcome. `row_id` is the source ledger row,
    /// used to reject duplicate/out-of-order replays; `ts_ms` is recorded
    /// alongside it for the persisted snapshot. Returns `true` if this call
    /// caused a fresh trip.
    ///
    /// `Breakeven` and `Unknown` outcomes are no-ops: they are still subject
    /// to the row-id ordering check (so a replay doesn't re-apply a prior
    /// outcome) but never touch the streak or trip state (REQ-003).
    pub fn update(&mut self, outcome: TradeOutcome, row_id: i64, ts_ms: i64) -> bool {
        if !self.config.enabled {
            return false;
        }
        if let Some(last) = self.state.last_row_id {
            if row_id <= last {
                return false;
            }
        }
        self.state.last_row_id = Some(row_id);
        self.state.last_ts_ms = Some(ts_ms);

        match outcome {
            TradeOutcome::Win => {
                self.state.streak = 0;
                false
            }
            TradeOutcome::Loss => {
                self.state.streak += 1;
                if !self.state.tripped && self.state.streak >= self.config.max_consecutive_losses
                {
                    self.state.tripped = true;
                    true
                } else {
                    false
                }
            }
            TradeOutcome::Breakeven | TradeOutcome::Unknown => false,
        }
    }

    pub fn reset(&mut self) {
        self.state = ConsecutiveLossState::default();
    }
}
