//! `grinder`: the thin adapter binary that turns `std::env`/CLI flags, real
//! wall-clock time, and a concrete `ExchangePort`/`DataConnector` pair into
//! calls against `bog-core`'s pure decision pipeline (spec.md §6, §9).
//!
//! Only `paper`/`read_only` safe modes are wired here — `bog-core` ships no
//! real venue integration by design, so this binary's only concrete port is
//! the synthetic one in `paper.rs` (see `cli.rs::into_runtime_settings` for
//! why `live_trade` refuses to start). Grounded on the teacher's deleted
//! `src/bin/*_live.rs` startup-glue shape: parse args, init logging, install
//! signal handlers, hand off to the engine, shut down gracefully.

mod cli;
mod kill_switch;
mod metrics_server;
mod paper;

use bog_core::account::{
    reconciler::{reconcile, ReconcileConfig},
    AccountSyncer, BudgetTracker, ExpectedStore, HaRole, ObservedOrder, ObservedPosition,
    ObservedStore, RemediationExecutor,
};
use bog_core::execution::{EngineConfig, ExchangeFilters, UpdateBudgets, VenueCaps};
use bog_core::fsm::{FsmConfig, LifecycleFsm};
use bog_core::http::{CircuitBreakerConfig, MeasuredClient, RetryPolicy};
use bog_core::observability::artifacts::ArtifactRunDir;
use bog_core::observability::metrics::MetricsRegistry;
use bog_core::orchestrator::{Orchestrator, OperatorOverrideCell, SymbolRuntime};
use bog_core::ports::DataConnector;
use bog_core::risk::{
    ConsecutiveLossConfig, ConsecutiveLossGuard, DrawdownGuard, DrawdownGuardConfig, RateLimiter,
    RateLimiterConfig, ToxicityGate, ToxicityGateConfig,
};
use bog_strategies::{GridPlanBuilder, StrategyConfig};

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Per-symbol static venue facts this demo binary assumes. A real deployment
/// would source these from the exchange's `exchangeInfo`-style endpoint; the
/// paper port has no filter concept of its own, so a single conservative set
/// is used across every traded symbol.
fn default_symbol_runtime(strategy_id: &str) -> SymbolRuntime {
    SymbolRuntime {
        strategy_id: strategy_id.to_string(),
        filters: ExchangeFilters {
            tick_size: dec!(0.01),
            step_size: dec!(0.001),
            min_qty: dec!(0.001),
            min_notional: dec!(5),
        },
        venue_caps: VenueCaps {
            supports_amend_price: true,
            supports_amend_qty: true,
        },
        engine: EngineConfig::default(),
        budgets: UpdateBudgets::default(),
    }
}

fn today_utc() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Converts a paper-port `ExchangeOrder` into the syncer's `ObservedOrder`
/// shape. The paper port carries no `client_order_id`, so system-owned
/// detection in the reconciler (`ClientOrderId::is_system_owned`) degrades
/// to "unknown" for orders this binary didn't place itself, which is fine
/// for a paper run where every order on the book is ours.
fn to_observed_order(order: &bog_core::ports::ExchangeOrder, ts_ms: i64) -> ObservedOrder {
    ObservedOrder {
        client_order_id: String::new(),
        symbol: order.symbol.clone(),
        order_id: order.order_id.clone(),
        side: order.side,
        status: order.status,
        price: order.price,
        orig_qty: order.quantity,
        executed_qty: order.filled_quantity,
        avg_price: order.price,
        ts_observed: ts_ms,
        source: "rest".to_string(),
    }
}

#[tokio::main]
async fn main() {
    let args = cli::CliArgs::parse();
    let portfolio_dd_limit = match args.portfolio_dd_limit() {
        Ok(v) => v,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            std::process::exit(2);
        }
    };

    let settings = match args.into_runtime_settings() {
        Ok(s) => s,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            std::process::exit(2);
        }
    };

    bog_core::utils::logger::init_logger(&settings.log_level, settings.json_logs);

    match run(settings, portfolio_dd_limit).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!(error = %err, "fatal error");
            std::process::exit(1);
        }
    }
}

async fn run(settings: cli::RuntimeSettings, portfolio_dd_limit: rust_decimal::Decimal) -> Result<i32> {
    info!(
        symbols = ?settings.symbols,
        safe_mode = ?settings.config.safety.safe_mode,
        remediation_mode = ?settings.config.remediation.mode,
        "grinder starting"
    );

    let metrics = Arc::new(MetricsRegistry::new()?);
    metrics_server::spawn(metrics.clone(), settings.metrics_port);
    metrics.system().up.set(1);

    let start_ts = now_ms();
    let artifacts = ArtifactRunDir::open(&settings.config.artifacts.dir, settings.config.artifacts.ttl_days, start_ts)?;
    artifacts.copy_budget_state(&settings.config.budget.state_path)?;

    let operator_override = Arc::new(OperatorOverrideCell::default());
    let orchestrator_kill = Arc::new(AtomicBool::new(false));
    let switch = kill_switch::KillSwitch::install(orchestrator_kill.clone(), operator_override.clone())?;

    // Shared synthetic market + one port across every traded symbol — a
    // single paper venue, many instruments.
    let mut markets = HashMap::new();
    for symbol in &settings.symbols {
        markets.insert(
            symbol.clone(),
            Arc::new(paper::SyntheticMarket::new(dec!(50000), dec!(1))),
        );
    }
    let port: Arc<dyn bog_core::ports::ExchangePort> =
        Arc::new(paper::PaperExchangePort::new(markets.clone()));

    let mut feeds: HashMap<String, paper::SyntheticFeed> = HashMap::new();
    for (i, symbol) in settings.symbols.iter().enumerate() {
        let market = markets.get(symbol).expect("market seeded above").clone();
        let mut feed = paper::SyntheticFeed::new(
            symbol.clone(),
            market,
            settings.paper_seed.wrapping_add(i as u64),
            start_ts,
            settings.tick_interval_ms as i64,
        );
        DataConnector::connect(&mut feed).await.ok();
        feeds.insert(symbol.clone(), feed);
    }

    let http = MeasuredClient::new(
        settings.config.http.clone(),
        RetryPolicy::default(),
        CircuitBreakerConfig::default(),
    );

    let mut fsm_config = FsmConfig::default();
    if let Some(ms) = settings.config.fsm_overrides.cooldown_ms {
        fsm_config.cooldown_ms = ms;
    }
    if let Some(bps) = settings.config.fsm_overrides.drawdown_limit_bps {
        fsm_config.drawdown_threshold_pct = rust_decimal::Decimal::new(bps, 4);
    }

    let mut orchestrator = Orchestrator::new(
        settings.config.clone(),
        port.clone(),
        http,
        bog_core::features::FeatureEngine::new(bog_core::features::FeatureEngineConfig::default())?,
        LifecycleFsm::new(fsm_config),
        DrawdownGuard::new(DrawdownGuardConfig {
            portfolio_dd_limit,
            symbol_dd_budgets: HashMap::new(),
        }),
        ConsecutiveLossGuard::new(ConsecutiveLossConfig {
            enabled: true,
            max_consecutive_losses: if let Some(n) = settings.config.fsm_overrides.consecutive_loss_max {
                n
            } else {
                ConsecutiveLossConfig::default().max_consecutive_losses
            },
        }),
        RateLimiter::new(RateLimiterConfig {
            cooldown_ms: 200,
            max_per_window: 60,
            window_ms: 60_000,
        }),
        ToxicityGate::new(ToxicityGateConfig::default()),
        operator_override.clone(),
        orchestrator_kill.clone(),
    );

    let mut plan_builders: HashMap<String, GridPlanBuilder> = settings
        .symbols
        .iter()
        .map(|s| (s.clone(), GridPlanBuilder::new()))
        .collect();
    let strategy_cfg = settings.strategy.clone();
    let runtime = default_symbol_runtime(&settings.strategy_id);

    // The orchestrator computes its own authoritative `FeatureSnapshot`
    // internally and hands it back on `TickReport`; the grid plan for tick
    // N+1 is built from the features observed on tick N, rather than this
    // binary re-deriving a second, divergent feature read of its own. The
    // very first tick for a symbol plans off a flat, unwarmed snapshot so
    // the first grid comes in paused at the floor spacing until real
    // features arrive.
    let mut last_features: HashMap<String, bog_core::features::FeatureSnapshot> = HashMap::new();

    let mut expected = ExpectedStore::new(86_400_000, 4096);
    let mut observed = ObservedStore::new();
    let syncer = AccountSyncer::new(port.clone());
    let budget = BudgetTracker::new(&settings.config.budget, &today_utc());
    let remediation = RemediationExecutor::new(port.clone(), budget);
    let reconcile_cfg = ReconcileConfig::default();

    let mut tick_interval = tokio::time::interval(std::time::Duration::from_millis(settings.tick_interval_ms));
    let mut reconcile_interval =
        tokio::time::interval(std::time::Duration::from_millis(settings.reconcile_interval_ms));

    info!("entering live loop");
    loop {
        if switch.should_stop() {
            warn!("kill switch requested shutdown");
            break;
        }

        tokio::select! {
            _ = tick_interval.tick() => {
                for symbol in settings.symbols.clone() {
                    let Some(feed) = feeds.get_mut(&symbol) else { continue };
                    let snapshots = match feed.poll_snapshots().await {
                        Ok(s) => s,
                        Err(err) => {
                            warn!(%symbol, %err, "feed poll failed");
                            continue;
                        }
                    };
                    for snap in snapshots {
                        let builder = plan_builders.get_mut(&symbol).expect("builder seeded per symbol");
                        let plan_features = last_features.get(&symbol).cloned().unwrap_or(bog_core::features::FeatureSnapshot {
                            ts_ms: snap.ts_ms,
                            mid_price: snap.mid_price(),
                            spread_bps: 0,
                            imbalance_l1_bps: 0,
                            thin_l1: snap.best_bid_qty.min(snap.best_ask_qty),
                            natr_bps: 0,
                            atr: None,
                            warmup_bars: 0,
                            range_trend: bog_core::features::indicators::RangeTrend::default(),
                            is_warmed_up: false,
                        });
                        let plan = builder.build(&symbol, &plan_features, orchestrator.fsm_state(), &strategy_cfg);
                        let report = orchestrator.process_snapshot(&snap, &plan, &runtime, &mut expected).await;
                        if let Some(features) = &report.features {
                            last_features.insert(symbol.clone(), features.clone());
                        }

                        metrics.system().drawdown_pct.set(0.0);
                        metrics.system().kill_switch_triggered.set(if orchestrator_kill.load(Ordering::SeqCst) { 1 } else { 0 });
                        if let Some(transition) = &report.transition {
                            info!(symbol = %symbol, from = ?transition.from_state, to = ?transition.to_state, reason = ?transition.reason, "fsm transition");
                        }
                        for outcome in &report.routed {
                            if outcome.dispatched {
                                info!(symbol = %symbol, side = ?outcome.side, level_id = outcome.level_id, "dispatched");
                            } else if let Some(err) = &outcome.error {
                                warn!(symbol = %symbol, side = ?outcome.side, level_id = outcome.level_id, %err, "dispatch failed");
                            }
                        }
                    }
                }
            }
            _ = reconcile_interval.tick() => {
                let known: HashSet<String> = expected
                    .get_active_orders(now_ms())
                    .into_iter()
                    .map(|o| o.order_id.clone())
                    .collect();
                let sync_result = syncer.sync(Some(&known)).await;
                metrics.reconcile().runs_total.inc();

                if let Some(err) = &sync_result.error {
                    warn!(%err, "account sync failed");
                    continue;
                }
                let Some(snapshot) = &sync_result.snapshot else { continue };
                let ts = snapshot.ts_ms;
                for order in &snapshot.open_orders {
                    observed.ingest_order(to_observed_order(order, ts));
                }
                for position in &snapshot.positions {
                    observed.ingest_position(
                        &position.symbol,
                        ObservedPosition {
                            position_amt: position.quantity,
                            entry_price: position.entry_price,
                            unrealized_pnl: position.unrealized_pnl,
                            ts_observed: ts,
                        },
                    );
                }
                for mismatch in &sync_result.mismatches {
                    warn!(rule = %mismatch.rule, detail = %mismatch.detail, "account invariant violation");
                }

                let mut any_mismatch = false;
                for symbol in &settings.symbols {
                    let mismatches = reconcile(symbol, &expected, &observed, &reconcile_cfg, ts);
                    for mismatch in &mismatches {
                        any_mismatch = true;
                        metrics.reconcile().mismatch_total.with_label_values(&[mismatch.mismatch_type.as_str()]).inc();
                        warn!(
                            symbol = %symbol,
                            mismatch_type = mismatch.mismatch_type.as_str(),
                            action_plan = %mismatch.action_plan,
                            "reconcile mismatch"
                        );

                        let position_notional = observed
                            .get_position(symbol)
                            .map(|p| p.position_amt.abs() * p.entry_price)
                            .unwrap_or_default();
                        let position_side = observed
                            .get_position(symbol)
                            .map(|p| if p.position_amt.is_sign_negative() { bog_core::core::Side::Sell } else { bog_core::core::Side::Buy })
                            .unwrap_or(bog_core::core::Side::Buy);
                        let position_qty = observed.get_position(symbol).map(|p| p.position_amt.abs()).unwrap_or_default();

                        let result = remediation
                            .remediate(
                                mismatch,
                                &settings.config.remediation,
                                &settings.config.safety,
                                HaRole::Active,
                                orchestrator_kill.load(Ordering::SeqCst),
                                &settings.strategy_id,
                                position_side,
                                position_qty,
                                position_notional,
                                &today_utc(),
                            )
                            .await;

                        match result.status {
                            bog_core::account::RemediationStatus::Executed => {
                                if let Some(action) = result.action {
                                    metrics.reconcile().action_executed_total.with_label_values(&[action.as_str()]).inc();
                                    metrics.reconcile().runs_with_remediation_total.with_label_values(&[action.as_str()]).inc();
                                }
                                info!(symbol = %symbol, detail = %result.detail, "remediation executed");
                            }
                            bog_core::account::RemediationStatus::Planned => {
                                if let Some(action) = result.action {
                                    metrics.reconcile().action_planned_total.with_label_values(&[action.as_str()]).inc();
                                }
                                info!(symbol = %symbol, detail = %result.detail, "remediation planned");
                            }
                            bog_core::account::RemediationStatus::Blocked => {
                                if let Some(reason) = result.block_reason {
                                    metrics.reconcile().action_blocked_total.with_label_values(&[reason.as_str()]).inc();
                                }
                            }
                            bog_core::account::RemediationStatus::Detected => {
                                info!(symbol = %symbol, detail = %result.detail, "remediation detect-only");
                            }
                        }
                    }
                }
                if any_mismatch {
                    metrics.reconcile().runs_with_mismatch_total.inc();
                }
                metrics.reconcile().last_snapshot_ts_ms.set(ts);
            }
        }
    }

    info!("shutting down");
    let cutoff = now_ms();
    let cleanup = artifacts.cleanup_expired(cutoff);
    if cleanup.dirs_deleted > 0 {
        info!(deleted = cleanup.dirs_deleted, "artifact TTL cleanup removed old run directories");
    }
    artifacts.write_stdout_summary(
        &[
            ("symbols", settings.symbols.join(",")),
            ("safe_mode", format!("{:?}", settings.config.safety.safe_mode)),
            ("remediation_mode", format!("{:?}", settings.config.remediation.mode)),
        ],
        0,
    )?;

    Ok(0)
}
