//! Portfolio + per-symbol drawdown guard (spec.md §4.D).
//! Grounded on `examples/original_source/src/grinder/risk/drawdown_guard_v1.py`.

use super::types::{AllowDecision, AllowReason};
use crate::fsm::OrderIntent;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Normal,
    Drawdown,
}

#[derive(Debug, Clone)]
pub struct DrawdownGuardConfig {
    pub portfolio_dd_limit: Decimal,
    /// Per-symbol loss budget; a symbol absent here has no per-symbol limit.
    pub symbol_dd_budgets: HashMap<String, Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardSnapshot {
    pub state: GuardState,
    pub portfolio_dd_pct: Decimal,
}

/// Portfolio + per-symbol drawdown latch. `DRAWDOWN` only clears via an
/// explicit `reset()` — it never auto-recovers (spec.md §3 invariant).
pub struct DrawdownGuard {
    config: DrawdownGuardConfig,
    state: GuardState,
    portfolio_dd_pct: Decimal,
    breached_symbols: HashSet<String>,
}

impl DrawdownGuard {
    pub fn new(config: DrawdownGuardConfig) -> Self {
        Self {
            config,
            state: GuardState::Normal,
            portfolio_dd_pct: Decimal::ZERO,
            breached_symbols: HashSet::new(),
        }
    }

    pub fn state(&self) -> GuardState {
        self.state
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        GuardSnapshot {
            state: self.state,
            portfolio_dd_pct: self.portfolio_dd_pct,
        }
    }

    /// Recompute drawdown from equity and per-symbol losses. Latches to
    /// `DRAWDOWN` the first time any limit is breached; never un-latches here.
    pub fn update(
        &mut self,
        equity_current: Decimal,
        equity_start: Decimal,
        symbol_losses: &HashMap<String, Decimal>,
    ) {
        self.portfolio_dd_pct = if equity_start.is_zero() {
            Decimal::ZERO
        } else {
            ((equity_start - equity_current) / equity_start).max(Decimal::ZERO)
        };

        let portfolio_breached = self.portfolio_dd_pct >= self.config.portfolio_dd_limit;

        for (symbol, loss) in symbol_losses {
            if let Some(budget) = self.config.symbol_dd_budgets.get(symbol) {
                if *loss >= *budget {
                    self.breached_symbols.insert(symbol.clone());
                }
            }
        }

        if self.state == GuardState::Normal
            && (portfolio_breached || !self.breached_symbols.is_empty())
        {
            self.state = GuardState::Drawdown;
        }
    }

    /// `CANCEL` is always allowed. In `NORMAL`, everything is allowed. In
    /// `DRAWDOWN`, only `REDUCE_RISK` (and `CANCEL`) are allowed.
    pub fn allow(&self, intent: OrderIntent, _symbol: &str) -> AllowDecision {
        if intent == OrderIntent::Cancel {
            return AllowDecision::allow();
        }
        match self.state {
            GuardState::Normal => AllowDecision::allow(),
            GuardState::Drawdown => match intent {
                OrderIntent::ReduceRisk => AllowDecision::allow(),
                OrderIntent::IncreaseRisk => AllowDecision::block(
                    AllowReason::DrawdownGateActive,
                    "portfolio or symbol drawdown limit breached",
                ),
                OrderIntent::Cancel => unreachable!("handled above"),
            },
        }
    }

    /// Only path back to `NORMAL`.
    pub fn reset(&mut self) {
        self.state = GuardState::Normal;
        self.breached_symbols.clear();
    }
}
