//! Closed configuration record (spec.md §6, §9).
//!
//! Every component here takes a plain, fully-populated `Config` value; there
//! is no environment reading in this crate. A thin adapter outside the core
//! (the `grinder` binary) is responsible for turning `std::env` into one of
//! these, so the decision/reconciliation pipeline stays deterministic and
//! testable without process environment in the loop.

use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemediationMode {
    DetectOnly,
    PlanOnly,
    Blocked,
    ExecuteCancelAll,
    ExecuteFlatten,
}

impl RemediationMode {
    /// Whether this mode is permitted to issue live exchange writes.
    pub fn is_executing(self) -> bool {
        matches!(
            self,
            RemediationMode::ExecuteCancelAll | RemediationMode::ExecuteFlatten
        )
    }
}

#[derive(Debug, Clone)]
pub struct RemediationConfig {
    pub mode: RemediationMode,
    pub strategy_allowlist: Vec<String>,
    pub symbol_allowlist: Vec<String>,
    pub flatten_max_notional_per_call: rust_decimal::Decimal,
}

#[derive(Debug, Clone)]
pub struct BudgetConfig {
    pub max_calls_per_day: u64,
    pub max_notional_per_day: rust_decimal::Decimal,
    pub max_calls_per_run: u64,
    pub max_notional_per_run: rust_decimal::Decimal,
    pub state_path: String,
}

#[derive(Debug, Clone)]
pub struct ArtifactsConfig {
    pub dir: String,
    pub ttl_days: u32,
}

/// Trading-permission gates. `ALLOW_MAINNET_TRADE` must equal the exact
/// string `"1"` upstream for an execute mode to run against mainnet; the
/// adapter layer enforces the string match and hands this crate a plain bool.
#[derive(Debug, Clone, Copy)]
pub struct SafetyConfig {
    pub allow_mainnet_trade: bool,
    pub allow_testnet_trade: bool,
    pub armed: bool,
    pub safe_mode: SafeMode,
}

impl SafetyConfig {
    pub fn permits_live_trading(self) -> bool {
        self.armed
            && self.safe_mode == SafeMode::LiveTrade
            && (self.allow_mainnet_trade || self.allow_testnet_trade)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FillProbConfig {
    pub min_prob_bps: i64,
    pub enforce: bool,
    pub eval_max_age_hours: u32,
}

impl Default for FillProbConfig {
    fn default() -> Self {
        Self {
            min_prob_bps: 3000,
            enforce: false,
            eval_max_age_hours: 24,
        }
    }
}

/// Known HTTP operation kinds; the label set is closed so metrics
/// cardinality stays bounded regardless of what exchange we talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpOp {
    PlaceOrder,
    CancelOrder,
    ReplaceOrder,
    FetchOpenOrders,
    FetchPositions,
    FetchAccountSnapshot,
    PlaceMarketOrder,
    SetLeverage,
    GetPositionMode,
}

impl HttpOp {
    /// Label value for the `op` dimension of the `grinder_http_*` metric
    /// family (spec.md §6). Closed set, so cardinality never depends on
    /// which venue adapter is plugged in.
    pub fn as_str(self) -> &'static str {
        match self {
            HttpOp::PlaceOrder => "place_order",
            HttpOp::CancelOrder => "cancel_order",
            HttpOp::ReplaceOrder => "replace_order",
            HttpOp::FetchOpenOrders => "fetch_open_orders",
            HttpOp::FetchPositions => "fetch_positions",
            HttpOp::FetchAccountSnapshot => "fetch_account_snapshot",
            HttpOp::PlaceMarketOrder => "place_market_order",
            HttpOp::SetLeverage => "set_leverage",
            HttpOp::GetPositionMode => "get_position_mode",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub deadlines: HashMap<HttpOp, Duration>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        use HttpOp::*;
        let mut deadlines = HashMap::new();
        for (op, ms) in [
            (PlaceOrder, 2_000),
            (CancelOrder, 2_000),
            (ReplaceOrder, 2_000),
            (FetchOpenOrders, 3_000),
            (FetchPositions, 3_000),
            (FetchAccountSnapshot, 3_000),
            (PlaceMarketOrder, 2_000),
            (SetLeverage, 3_000),
            (GetPositionMode, 3_000),
        ] {
            deadlines.insert(op, Duration::from_millis(ms));
        }
        Self { deadlines }
    }
}

impl HttpConfig {
    pub fn deadline(&self, op: HttpOp) -> Duration {
        self.deadlines
            .get(&op)
            .copied()
            .unwrap_or(Duration::from_millis(2_000))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FeedConfig {
    pub stale_ms: i64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self { stale_ms: 5_000 }
    }
}

/// FSM threshold overrides; `None` means "use the lifecycle module's
/// built-in default" (see [`crate::fsm::types::FsmConfig`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct FsmOverrides {
    pub drawdown_limit_bps: Option<i64>,
    pub consecutive_loss_max: Option<u32>,
    pub cooldown_ms: Option<i64>,
}

/// Totally ordered trading permission level (GLOSSARY). `ReadOnly` permits no
/// write calls at all; `Paper` permits writes against a simulated port;
/// `LiveTrade` permits writes against a real exchange. Ordering matters:
/// a gate that requires "at least Paper" accepts `LiveTrade` too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SafeMode {
    ReadOnly,
    Paper,
    LiveTrade,
}

impl SafeMode {
    /// Whether this mode permits a write call to reach the `ExchangePort` at
    /// all (a `Paper` implementation still receives the call; it just never
    /// talks to a real venue).
    pub fn permits_writes(self) -> bool {
        self >= SafeMode::Paper
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub remediation: RemediationConfig,
    pub budget: BudgetConfig,
    pub artifacts: ArtifactsConfig,
    pub safety: SafetyConfig,
    pub fill_prob: FillProbConfig,
    pub http: HttpConfig,
    pub feed: FeedConfig,
    pub fsm_overrides: FsmOverrides,
}

impl Config {
    /// A conservative, non-trading configuration useful for tests and for
    /// an adapter that fails to parse an expected environment variable.
    pub fn safe_default() -> Self {
        Self {
            remediation: RemediationConfig {
                mode: RemediationMode::DetectOnly,
                strategy_allowlist: Vec::new(),
                symbol_allowlist: Vec::new(),
                flatten_max_notional_per_call: rust_decimal::Decimal::ZERO,
            },
            budget: BudgetConfig {
                max_calls_per_day: 0,
                max_notional_per_day: rust_decimal::Decimal::ZERO,
                max_calls_per_run: 0,
                max_notional_per_run: rust_decimal::Decimal::ZERO,
                state_path: "budget_state.json".to_string(),
            },
            artifacts: ArtifactsConfig {
                dir: "artifacts".to_string(),
                ttl_days: 7,
            },
            safety: SafetyConfig {
                allow_mainnet_trade: false,
                allow_testnet_trade: false,
                armed: false,
                safe_mode: SafeMode::ReadOnly,
            },
            fill_prob: FillProbConfig::default(),
            http: HttpConfig::default(),
            feed: FeedConfig::default(),
            fsm_overrides: FsmOverrides::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_default_never_permits_live_trading() {
        let cfg = Config::safe_default();
        assert!(!cfg.safety.permits_live_trading());
        assert!(!cfg.remediation.mode.is_executing());
    }

    #[test]
    fn http_config_falls_back_to_default_for_unknown_op() {
        let mut http = HttpConfig::default();
        http.deadlines.remove(&HttpOp::SetLeverage);
        assert_eq!(http.deadline(HttpOp::SetLeverage), Duration::from_millis(2_000));
    }

    #[test]
    fn safe_mode_is_totally_ordered_and_gates_writes() {
        assert!(SafeMode::ReadOnly < SafeMode::Paper);
        assert!(SafeMode::Paper < SafeMode::LiveTrade);
        assert!(!SafeMode::ReadOnly.permits_writes());
        assert!(SafeMode::Paper.permits_writes());
        assert!(SafeMode::LiveTrade.permits_writes());
    }

    #[test]
    fn execute_modes_are_flagged_executing() {
        assert!(RemediationMode::ExecuteCancelAll.is_executing());
        assert!(RemediationMode::ExecuteFlatten.is_executing());
        assert!(!RemediationMode::PlanOnly.is_executing());
        assert!(!RemediationMode::Blocked.is_executing());
    }
}
