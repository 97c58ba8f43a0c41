//! Shared risk-gate vocabulary (spec.md §4.D). Every gate is pure and
//! returns a structured `AllowDecision` rather than raising an error —
//! guard rejections are not errors (spec.md §7).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllowReason {
    Ok,
    DrawdownGateActive,
    ConsecutiveLossTripped,
    FillProbLow,
    CooldownActive,
    RateLimitExceeded,
    ToxicSpread,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowDecision {
    pub allowed: bool,
    pub reason: AllowReason,
    /// Free-form low-cardinality details (e.g. `"remaining_ms=50"`); never a
    /// symbol, order id, or other high-cardinality value — this is logged,
    /// never used as a metric label (spec.md §6 label hygiene).
    pub details: String,
}

impl AllowDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: AllowReason::Ok,
            details: String::new(),
        }
    }

    pub fn block(reason: AllowReason, details: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason,
            details: details.into(),
        }
    }
}
