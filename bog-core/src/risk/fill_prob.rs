//! Fill-probability gate (spec.md §4.D).
//! Grounded on `examples/original_source/src/grinder/risk/` fill-prob gate
//! and `.../tests/test_fill_prob_gate.py`.

use super::types::{AllowDecision, AllowReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillProbGateConfig {
    pub enforce: bool,
    pub min_prob_bps: i64,
}

impl Default for FillProbGateConfig {
    fn default() -> Self {
        Self {
            enforce: false,
            min_prob_bps: 3_000,
        }
    }
}

/// Pure function per spec.md §4.D: no model bound means ALLOW unconditionally;
/// a bound model in shadow mode (`enforce=false`) always ALLOWs but records
/// what it would have done; in enforce mode it blocks sub-threshold fills.
pub fn evaluate(
    config: &FillProbGateConfig,
    model_prob_bps: Option<i64>,
) -> AllowDecision {
    let Some(prob_bps) = model_prob_bps else {
        return AllowDecision::allow();
    };

    if !config.enforce {
        return AllowDecision::allow();
    }

    if prob_bps < config.min_prob_bps {
        AllowDecision::block(
            AllowReason::FillProbLow,
            format!("prob_bps={prob_bps} min_prob_bps={}", config.min_prob_bps),
        )
    } else {
        AllowDecision::allow()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_model_allows() {
        let config = FillProbGateConfig {
            enforce: true,
            min_prob_bps: 3_000,
        };
        assert!(evaluate(&config, None).allowed);
    }

    #[test]
    fn shadow_mode_allows_regardless_of_prob() {
        let config = FillProbGateConfig {
            enforce: false,
            min_prob_bps: 3_000,
        };
        assert!(evaluate(&config, Some(100)).allowed);
    }

    #[test]
    fn enforce_blocks_below_threshold() {
        let config = FillProbGateConfig {
            enforce: true,
            min_prob_bps: 3_000,
        };
        let decision = evaluate(&config, Some(1_000));
        assert!(!decision.allowed);
        assert_eq!(decision.reason, AllowReason::FillProbLow);
    }

    #[test]
    fn enforce_allows_at_or_above_threshold() {
        let config = FillProbGateConfig {
            enforce: true,
            min_prob_bps: 3_000,
        };
        assert!(evaluate(&config, Some(3_000)).allowed);
        assert!(evaluate(&config, Some(5_000)).allowed);
    }
}
