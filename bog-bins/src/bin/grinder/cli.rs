//! Env/CLI adapter (spec.md §6): turns `std::env` + flags into the closed
//! [`bog_core::config::Config`] record plus the handful of settings that
//! only make sense at the thin-adapter layer (symbols, strategy knobs,
//! artifact root, metrics port, paper-mode seed). Grounded on the teacher's
//! `bog-bins/src/common.rs` `CommonArgs`.

use anyhow::{bail, Context, Result};
use bog_core::config::{
    ArtifactsConfig, BudgetConfig, Config, FeedConfig, FillProbConfig, FsmOverrides, HttpConfig,
    RemediationConfig, RemediationMode, SafeMode, SafetyConfig,
};
use bog_strategies::StrategyConfig;
use clap::Parser;
use rust_decimal::Decimal;
use std::str::FromStr;

#[derive(Parser, Debug)]
#[command(author, version, about = "Grid-trading decision loop")]
pub struct CliArgs {
    /// Comma-separated symbols to trade, e.g. "BTCUSDT,ETHUSDT".
    #[arg(long, env = "GRINDER_SYMBOLS", default_value = "BTCUSDT")]
    pub symbols: String,

    /// "read_only", "paper", or "live_trade". Only "paper" has a concrete
    /// exchange adapter in this binary; "live_trade" refuses to start.
    #[arg(long, env = "GRINDER_SAFE_MODE", default_value = "paper")]
    pub safe_mode: String,

    #[arg(long, env = "GRINDER_ARMED")]
    pub armed: bool,

    #[arg(long, env = "ALLOW_MAINNET_TRADE", default_value = "0")]
    pub allow_mainnet_trade: String,

    #[arg(long, env = "GRINDER_ALLOW_TESTNET_TRADE")]
    pub allow_testnet_trade: bool,

    /// Remediation mode: "detect_only", "plan_only", "blocked",
    /// "execute_cancel_all", "execute_flatten".
    #[arg(long, env = "GRINDER_REMEDIATION_MODE", default_value = "detect_only")]
    pub remediation_mode: String,

    #[arg(long, env = "GRINDER_SYMBOL_ALLOWLIST", default_value = "")]
    pub symbol_allowlist: String,

    #[arg(long, env = "GRINDER_STRATEGY_ALLOWLIST", default_value = "")]
    pub strategy_allowlist: String,

    #[arg(long, env = "GRINDER_FLATTEN_MAX_NOTIONAL_PER_CALL", default_value = "1000")]
    pub flatten_max_notional_per_call: String,

    #[arg(long, env = "GRINDER_BUDGET_MAX_CALLS_PER_DAY", default_value = "200")]
    pub budget_max_calls_per_day: u64,

    #[arg(long, env = "GRINDER_BUDGET_MAX_NOTIONAL_PER_DAY", default_value = "50000")]
    pub budget_max_notional_per_day: String,

    #[arg(long, env = "GRINDER_BUDGET_MAX_CALLS_PER_RUN", default_value = "50")]
    pub budget_max_calls_per_run: u64,

    #[arg(long, env = "GRINDER_BUDGET_MAX_NOTIONAL_PER_RUN", default_value = "10000")]
    pub budget_max_notional_per_run: String,

    #[arg(long, env = "GRINDER_BUDGET_STATE_PATH", default_value = "budget_state.json")]
    pub budget_state_path: String,

    #[arg(long, env = "GRINDER_ARTIFACTS_DIR", default_value = "artifacts")]
    pub artifacts_dir: String,

    #[arg(long, env = "GRINDER_ARTIFACTS_TTL_DAYS", default_value = "14")]
    pub artifacts_ttl_days: u32,

    #[arg(long, env = "GRINDER_FEED_STALE_MS", default_value = "5000")]
    pub feed_stale_ms: i64,

    #[arg(long, env = "GRINDER_FILL_PROB_MIN_BPS", default_value = "3000")]
    pub fill_prob_min_bps: i64,

    #[arg(long, env = "GRINDER_FILL_PROB_ENFORCE")]
    pub fill_prob_enforce: bool,

    #[arg(long, env = "GRINDER_PORTFOLIO_DD_LIMIT", default_value = "0.20")]
    pub portfolio_dd_limit: String,

    #[arg(long, env = "GRINDER_LEVELS_UP", default_value = "5")]
    pub levels_up: u32,

    #[arg(long, env = "GRINDER_LEVELS_DOWN", default_value = "5")]
    pub levels_down: u32,

    #[arg(long, env = "GRINDER_LEVEL_SIZE", default_value = "0.01")]
    pub level_size: String,

    #[arg(long, env = "GRINDER_MIN_SPACING_BPS", default_value = "10")]
    pub min_spacing_bps: i64,

    #[arg(long, env = "GRINDER_MAX_SPACING_BPS", default_value = "200")]
    pub max_spacing_bps: i64,

    #[arg(long, env = "GRINDER_STRATEGY_ID", default_value = "grid_v1")]
    pub strategy_id: String,

    /// Seed for the paper-mode synthetic feed/exchange RNG. Fixed by
    /// default so a paper run is reproducible unless the operator asks
    /// for variety.
    #[arg(long, env = "GRINDER_PAPER_SEED", default_value = "1")]
    pub paper_seed: u64,

    #[arg(long, env = "GRINDER_TICK_INTERVAL_MS", default_value = "1000")]
    pub tick_interval_ms: u64,

    #[arg(long, env = "GRINDER_RECONCILE_INTERVAL_MS", default_value = "10000")]
    pub reconcile_interval_ms: u64,

    #[arg(long, env = "GRINDER_METRICS_PORT", default_value = "9898")]
    pub metrics_port: u16,

    #[arg(long, env = "GRINDER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "GRINDER_JSON_LOGS")]
    pub json_logs: bool,
}

fn parse_decimal(name: &str, value: &str) -> Result<Decimal> {
    Decimal::from_str(value).with_context(|| format!("invalid value for {name}: {value}"))
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_safe_mode(value: &str) -> Result<SafeMode> {
    match value {
        "read_only" | "readonly" => Ok(SafeMode::ReadOnly),
        "paper" => Ok(SafeMode::Paper),
        "live_trade" | "live" => Ok(SafeMode::LiveTrade),
        other => bail!("invalid GRINDER_SAFE_MODE: {other}"),
    }
}

fn parse_remediation_mode(value: &str) -> Result<RemediationMode> {
    match value {
        "detect_only" => Ok(RemediationMode::DetectOnly),
        "plan_only" => Ok(RemediationMode::PlanOnly),
        "blocked" => Ok(RemediationMode::Blocked),
        "execute_cancel_all" => Ok(RemediationMode::ExecuteCancelAll),
        "execute_flatten" => Ok(RemediationMode::ExecuteFlatten),
        other => bail!("invalid GRINDER_REMEDIATION_MODE: {other}"),
    }
}

/// Everything the binary needs beyond `bog_core::config::Config`: the
/// symbol list, per-symbol strategy knobs, and adapter-layer settings that
/// have no business living inside the pure decision crate.
pub struct RuntimeSettings {
    pub config: Config,
    pub symbols: Vec<String>,
    pub strategy: StrategyConfig,
    pub strategy_id: String,
    pub paper_seed: u64,
    pub tick_interval_ms: u64,
    pub reconcile_interval_ms: u64,
    pub metrics_port: u16,
    pub log_level: String,
    pub json_logs: bool,
}

impl CliArgs {
    pub fn into_runtime_settings(self) -> Result<RuntimeSettings> {
        let safe_mode = parse_safe_mode(&self.safe_mode)?;
        let remediation_mode = parse_remediation_mode(&self.remediation_mode)?;

        let config = Config {
            remediation: RemediationConfig {
                mode: remediation_mode,
                strategy_allowlist: parse_list(&self.strategy_allowlist),
                symbol_allowlist: parse_list(&self.symbol_allowlist),
                flatten_max_notional_per_call: parse_decimal(
                    "GRINDER_FLATTEN_MAX_NOTIONAL_PER_CALL",
                    &self.flatten_max_notional_per_call,
                )?,
            },
            budget: BudgetConfig {
                max_calls_per_day: self.budget_max_calls_per_day,
                max_notional_per_day: parse_decimal(
                    "GRINDER_BUDGET_MAX_NOTIONAL_PER_DAY",
                    &self.budget_max_notional_per_day,
                )?,
                max_calls_per_run: self.budget_max_calls_per_run,
                max_notional_per_run: parse_decimal(
                    "GRINDER_BUDGET_MAX_NOTIONAL_PER_RUN",
                    &self.budget_max_notional_per_run,
                )?,
                state_path: self.budget_state_path,
            },
            artifacts: ArtifactsConfig {
                dir: self.artifacts_dir,
                ttl_days: self.artifacts_ttl_days,
            },
            safety: SafetyConfig {
                allow_mainnet_trade: self.allow_mainnet_trade == "1",
                allow_testnet_trade: self.allow_testnet_trade,
                armed: self.armed,
                safe_mode,
            },
            fill_prob: FillProbConfig {
                min_prob_bps: self.fill_prob_min_bps,
                enforce: self.fill_prob_enforce,
                eval_max_age_hours: FillProbConfig::default().eval_max_age_hours,
            },
            http: HttpConfig::default(),
            feed: FeedConfig {
                stale_ms: self.feed_stale_ms,
            },
            fsm_overrides: FsmOverrides::default(),
        };

        if safe_mode == SafeMode::LiveTrade {
            bail!(
                "GRINDER_SAFE_MODE=live_trade requires a real ExchangePort/DataConnector \
                 implementation, which this binary does not compile in; run with \
                 read_only or paper"
            );
        }

        let symbols = parse_list(&self.symbols);
        if symbols.is_empty() {
            bail!("GRINDER_SYMBOLS must list at least one symbol");
        }

        let strategy = StrategyConfig {
            levels_up: self.levels_up,
            levels_down: self.levels_down,
            size_schedule: vec![parse_decimal("GRINDER_LEVEL_SIZE", &self.level_size)?],
            min_spacing_bps: self.min_spacing_bps,
            max_spacing_bps: self.max_spacing_bps,
            natr_spacing_multiplier: StrategyConfig::default().natr_spacing_multiplier,
            max_skew_bps: StrategyConfig::default().max_skew_bps,
            soft_reset_spacing_delta_bps: StrategyConfig::default().soft_reset_spacing_delta_bps,
        };

        Ok(RuntimeSettings {
            config,
            symbols,
            strategy,
            strategy_id: self.strategy_id,
            paper_seed: self.paper_seed,
            tick_interval_ms: self.tick_interval_ms,
            reconcile_interval_ms: self.reconcile_interval_ms,
            metrics_port: self.metrics_port,
            log_level: self.log_level,
            json_logs: self.json_logs,
        })
    }

    pub fn portfolio_dd_limit(&self) -> Result<Decimal> {
        parse_decimal("GRINDER_PORTFOLIO_DD_LIMIT", &self.portfolio_dd_limit)
    }
}
