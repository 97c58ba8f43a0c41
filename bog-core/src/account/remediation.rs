//! Remediation executor (spec.md §4.I): turns a [`ReconcileMismatch`] into at
//! most one exchange write, gated by eight checks run in a fixed order so a
//! blocked attempt always reports the first gate it failed, not the last.
//!
//! Gate order: remediation mode (`DETECT_ONLY`/`PLAN_ONLY`/`BLOCKED` all
//! short-circuit here with distinct, non-executing outcomes; only the two
//! execute modes continue), armed + `ALLOW_MAINNET_TRADE`, HA leadership,
//! kill switch, symbol/strategy allowlist, action-type-vs-mode match,
//! budget, per-call notional cap.

use crate::account::budget::{BudgetBlockReason, BudgetTracker};
use crate::account::ha::HaRole;
use crate::account::reconciler::{ReconcileMismatch, ReconcileMismatchType};
use crate::config::{RemediationConfig, RemediationMode, SafetyConfig};
use crate::core::{ConnectorError, Side};
use crate::ports::ExchangePort;
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationAction {
    CancelOrder,
    FlattenPosition,
}

impl RemediationAction {
    pub fn as_str(self) -> &'static str {
        match self {
            RemediationAction::CancelOrder => "cancel_all",
            RemediationAction::FlattenPosition => "flatten",
        }
    }

    fn from_mismatch(mismatch_type: ReconcileMismatchType) -> Option<RemediationAction> {
        match mismatch_type {
            ReconcileMismatchType::OrderExistsUnexpected => Some(RemediationAction::CancelOrder),
            ReconcileMismatchType::PositionNonzeroUnexpected => {
                Some(RemediationAction::FlattenPosition)
            }
            ReconcileMismatchType::OrderMissingOnExchange
            | ReconcileMismatchType::OrderStatusDivergence => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationBlockReason {
    ModeDisallows,
    NotArmed,
    NotLeader,
    KillSwitchActive,
    NotAllowlisted,
    ActionModeMismatch,
    Budget(BudgetBlockReason),
    NotionalCapExceeded,
    NoActionForMismatch,
}

impl RemediationBlockReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RemediationBlockReason::ModeDisallows => "mode_disallows",
            RemediationBlockReason::NotArmed => "not_armed",
            RemediationBlockReason::NotLeader => "not_leader",
            RemediationBlockReason::KillSwitchActive => "kill_switch_active",
            RemediationBlockReason::NotAllowlisted => "not_allowlisted",
            RemediationBlockReason::ActionModeMismatch => "action_mode_mismatch",
            RemediationBlockReason::Budget(reason) => reason.as_str(),
            RemediationBlockReason::NotionalCapExceeded => "notional_cap_exceeded",
            RemediationBlockReason::NoActionForMismatch => "no_action_for_mismatch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationStatus {
    Executed,
    Blocked,
    Planned,
    /// `REMEDIATION_MODE=detect_only`: a mismatch was detected and an action
    /// would apply, but the mode emits neither a port call nor a
    /// planned/blocked counter increment (spec.md §4.I gate 1).
    Detected,
}

#[derive(Debug, Clone)]
pub struct RemediationResult {
    pub status: RemediationStatus,
    pub action: Option<RemediationAction>,
    pub block_reason: Option<RemediationBlockReason>,
    pub detail: String,
}

impl RemediationResult {
    fn blocked(action: Option<RemediationAction>, reason: RemediationBlockReason) -> Self {
        Self {
            status: RemediationStatus::Blocked,
            action,
            block_reason: Some(reason),
            detail: reason.as_str().to_string(),
        }
    }

    fn planned(action: RemediationAction, detail: String) -> Self {
        Self {
            status: RemediationStatus::Planned,
            action: Some(action),
            block_reason: None,
            detail,
        }
    }

    fn executed(action: RemediationAction, detail: String) -> Self {
        Self {
            status: RemediationStatus::Executed,
            action: Some(action),
            block_reason: None,
            detail,
        }
    }

    fn detected(action: RemediationAction, detail: String) -> Self {
        Self {
            status: RemediationStatus::Detected,
            action: Some(action),
            block_reason: None,
            detail,
        }
    }
}

/// Drives at most one remediation write per [`ReconcileMismatch`]. Holds no
/// state of its own beyond the budget tracker; leadership, kill switch, and
/// strategy are all supplied fresh on every call so the executor never goes
/// stale between polls.
pub struct RemediationExecutor {
    port: Arc<dyn ExchangePort>,
    budget: BudgetTracker,
}

impl RemediationExecutor {
    pub fn new(port: Arc<dyn ExchangePort>, budget: BudgetTracker) -> Self {
        Self { port, budget }
    }

    /// Evaluates and, if every gate passes, executes one remediation action
    /// for `mismatch`. `position_qty` is the absolute base-asset quantity a
    /// flatten market order would close; `position_notional` is that same
    /// position's notional value (`qty * mark_price`), used for the budget
    /// and per-call cap checks. Both are ignored for a cancel action.
    #[allow(clippy::too_many_arguments)]
    pub async fn remediate(
        &self,
        mismatch: &ReconcileMismatch,
        remediation: &RemediationConfig,
        safety: &SafetyConfig,
        ha_role: HaRole,
        kill_switch_active: bool,
        strategy: &str,
        position_side: Side,
        position_qty: Decimal,
        position_notional: Decimal,
        today: &str,
    ) -> RemediationResult {
        let Some(action) = RemediationAction::from_mismatch(mismatch.mismatch_type) else {
            return RemediationResult::blocked(None, RemediationBlockReason::NoActionForMismatch);
        };

        // Gate 1: remediation mode. Only EXECUTE_CANCEL_ALL/EXECUTE_FLATTEN
        // continue past this gate. DETECT_ONLY and PLAN_ONLY never emit a
        // port call either, but are distinct outcomes from BLOCKED: PLAN_ONLY
        // reports Planned (counted as `planned_total`), DETECT_ONLY reports
        // Detected (counted as neither), and only BLOCKED reports Blocked
        // with the mode reason (spec.md §4.I gate 1).
        match remediation.mode {
            RemediationMode::ExecuteCancelAll | RemediationMode::ExecuteFlatten => {}
            RemediationMode::PlanOnly => {
                return RemediationResult::planned(
                    action,
                    format!("would {} for {}", action.as_str(), mismatch.symbol),
                );
            }
            RemediationMode::DetectOnly => {
                return RemediationResult::detected(
                    action,
                    format!("detected {} for {}", action.as_str(), mismatch.symbol),
                );
            }
            RemediationMode::Blocked => {
                return RemediationResult::blocked(
                    Some(action),
                    RemediationBlockReason::ModeDisallows,
                );
            }
        }

        // Gate 2: armed + ALLOW_MAINNET_TRADE. Testnet writes are a separate
        // concern gated by `SafeMode`, not a substitute for the mainnet
        // trade permit (spec.md §4.I gate 2 / §6).
        if !(safety.armed && safety.allow_mainnet_trade) {
            return RemediationResult::blocked(Some(action), RemediationBlockReason::NotArmed);
        }

        // Gate 3: only the elected leader remediates in a multi-instance
        // deployment. Standby and Unknown are both treated as non-leader.
        if !ha_role.is_leader() {
            return RemediationResult::blocked(Some(action), RemediationBlockReason::NotLeader);
        }

        // Gate 4: kill switch.
        if kill_switch_active {
            return RemediationResult::blocked(
                Some(action),
                RemediationBlockReason::KillSwitchActive,
            );
        }

        // Gate 5: symbol and strategy allowlists.
        let symbol_allowed = remediation.symbol_allowlist.is_empty()
            || remediation
                .symbol_allowlist
                .iter()
                .any(|s| s == &mismatch.symbol);
        let strategy_allowed = remediation.strategy_allowlist.is_empty()
            || remediation.strategy_allowlist.iter().any(|s| s == strategy);
        if !symbol_allowed || !strategy_allowed {
            return RemediationResult::blocked(
                Some(action),
                RemediationBlockReason::NotAllowlisted,
            );
        }

        // Gate 6: the action type this mismatch calls for must match what
        // the configured mode is scoped to run.
        let mode_permits = match (remediation.mode, action) {
            (RemediationMode::ExecuteCancelAll, RemediationAction::CancelOrder) => true,
            (RemediationMode::ExecuteFlatten, RemediationAction::FlattenPosition) => true,
            _ => false,
        };
        if !mode_permits {
            return RemediationResult::blocked(
                Some(action),
                RemediationBlockReason::ActionModeMismatch,
            );
        }

        // Gate 7: per-run and per-UTC-day call/notional budget.
        let call_notional = match action {
            RemediationAction::CancelOrder => Decimal::ZERO,
            RemediationAction::FlattenPosition => position_notional,
        };
        if let Some(reason) = self.budget.check(call_notional, today) {
            return RemediationResult::blocked(
                Some(action),
                RemediationBlockReason::Budget(reason),
            );
        }

        // Gate 8: per-call flatten notional cap (cancels have no notional).
        if action == RemediationAction::FlattenPosition
            && position_notional > remediation.flatten_max_notional_per_call
        {
            return RemediationResult::blocked(
                Some(action),
                RemediationBlockReason::NotionalCapExceeded,
            );
        }

        if !safety.safe_mode.permits_writes() {
            return RemediationResult::planned(
                action,
                format!("would {} for {}", action.as_str(), mismatch.symbol),
            );
        }

        let outcome = match action {
            RemediationAction::CancelOrder => {
                let Some(order_id) = mismatch.order_id.as_deref() else {
                    return RemediationResult::blocked(
                        Some(action),
                        RemediationBlockReason::NoActionForMismatch,
                    );
                };
                self.port.cancel_order(order_id).await.map(|_| ())
            }
            RemediationAction::FlattenPosition => self
                .port
                .place_market_order(&mismatch.symbol, position_side.opposite(), position_qty, true)
                .await
                .map(|_| ()),
        };

        match outcome {
            Ok(()) => {
                let _ = self.budget.record(call_notional, today);
                RemediationResult::executed(
                    action,
                    format!("{} executed for {}", action.as_str(), mismatch.symbol),
                )
            }
            Err(err) => RemediationResult {
                status: RemediationStatus::Blocked,
                action: Some(action),
                block_reason: None,
                detail: connector_error_detail(&err),
            },
        }
    }
}

fn connector_error_detail(err: &ConnectorError) -> String {
    format!("exchange call failed: {err}")
}
