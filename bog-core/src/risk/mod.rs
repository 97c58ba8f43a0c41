//! Risk gates (spec.md §4.D).
//!
//! Each gate is pure and returns a structured [`types::AllowDecision`]
//! instead of raising an error; gates compose by short-circuit on the first
//! block. See [`crate::fsm`] for the lifecycle state machine these gates sit
//! alongside — the FSM governs which intents are reachable at all, the gates
//! here further narrow an already-permitted intent.

pub mod consecutive_loss;
pub mod drawdown;
pub mod fill_prob;
pub mod rate_limiter;
pub mod toxicity;
pub mod types;

pub use consecutive_loss::{ConsecutiveLossConfig, ConsecutiveLossGuard, ConsecutiveLossState, TradeOutcome};
pub use drawdown::{DrawdownGuard, DrawdownGuardConfig, GuardSnapshot, GuardState};
pub use fill_prob::FillProbGateConfig;
pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use toxicity::{ToxicityGate, ToxicityGateConfig};
pub use types::{AllowDecision, AllowReason};

/// Runs the gates in the fixed priority order of spec.md §4.D and returns the
/// first block, or `AllowDecision::allow()` if every gate passes.
pub fn compose(decisions: impl IntoIterator<Item = AllowDecision>) -> AllowDecision {
    for decision in decisions {
        if !decision.allowed {
            return decision;
        }
    }
    AllowDecision::allow()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_short_circuits_on_first_block() {
        let blocked = AllowDecision::block(AllowReason::CooldownActive, "remaining_ms=10");
        let decision = compose([AllowDecision::allow(), blocked.clone(), AllowDecision::allow()]);
        assert_eq!(decision, blocked);
    }

    #[test]
    fn compose_allows_when_all_pass() {
        let decision = compose([AllowDecision::allow(), AllowDecision::allow()]);
        assert!(decision.allowed);
    }
}
