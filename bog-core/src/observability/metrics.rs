//! Prometheus metrics for the reconciliation/remediation pipeline
//! (spec.md §6). One struct per component area registering its own families
//! against a shared [`Registry`], mirroring the teacher's
//! `MetricsRegistry::{trading,performance,risk,system}` split — generalized
//! here to the grinder label contract (`type`, `action`, `reason`, `role`),
//! which carries no per-order or per-key labels so cardinality stays bounded
//! regardless of trading volume.

use prometheus::{
    Gauge, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Central registry for every metric this crate exports. Construction can
/// only fail if two families collide on the same fully-qualified name,
/// which would be a programming error in this module, not a runtime
/// condition — callers are expected to treat `new()` failing as fatal.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    reconcile: Arc<ReconcileMetrics>,
    budget: Arc<BudgetMetrics>,
    ha: Arc<HaMetrics>,
    system: Arc<SystemMetrics>,
    http: Arc<HttpMetrics>,
    router: Arc<RouterMetrics>,
    data: Arc<DataMetrics>,
    ml: Arc<MlMetrics>,
    started_at: Instant,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());
        let reconcile = Arc::new(ReconcileMetrics::new(&registry)?);
        let budget = Arc::new(BudgetMetrics::new(&registry)?);
        let ha = Arc::new(HaMetrics::new(&registry)?);
        let system = Arc::new(SystemMetrics::new(&registry)?);
        let http = Arc::new(HttpMetrics::new(&registry)?);
        let router = Arc::new(RouterMetrics::new(&registry)?);
        let data = Arc::new(DataMetrics::new(&registry)?);
        let ml = Arc::new(MlMetrics::new(&registry)?);
        system.up.set(1);
        info!("reconciliation metrics registry initialized");
        Ok(Self {
            registry,
            reconcile,
            budget,
            ha,
            system,
            http,
            router,
            data,
            ml,
            started_at: Instant::now(),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn reconcile(&self) -> &ReconcileMetrics {
        &self.reconcile
    }

    pub fn budget(&self) -> &BudgetMetrics {
        &self.budget
    }

    pub fn ha(&self) -> &HaMetrics {
        &self.ha
    }

    pub fn system(&self) -> &SystemMetrics {
        &self.system
    }

    pub fn http(&self) -> &HttpMetrics {
        &self.http
    }

    pub fn router(&self) -> &RouterMetrics {
        &self.router
    }

    pub fn data(&self) -> &DataMetrics {
        &self.data
    }

    pub fn ml(&self) -> &MlMetrics {
        &self.ml
    }

    /// Refreshes `grinder_uptime_seconds` from the registry's construction
    /// time. Call this just before a scrape is rendered, not on every tick.
    pub fn refresh_uptime(&self) {
        self.system.uptime_seconds.set(self.started_at.elapsed().as_secs_f64());
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            tracing::error!("failed to create metrics registry: {e}");
            panic!("cannot create metrics registry")
        })
    }
}

/// Reconcile-loop metric family, grounded on `reconcile/metrics.py`'s
/// exact name and label contract.
pub struct ReconcileMetrics {
    pub mismatch_total: IntCounterVec,
    pub last_snapshot_age_seconds: Gauge,
    pub last_snapshot_ts_ms: IntGauge,
    pub runs_total: IntCounter,
    pub runs_with_mismatch_total: IntCounter,
    pub action_planned_total: IntCounterVec,
    pub action_executed_total: IntCounterVec,
    pub action_blocked_total: IntCounterVec,
    pub runs_with_remediation_total: IntCounterVec,
    pub last_remediation_ts_ms: IntGauge,
}

impl ReconcileMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let mismatch_total = IntCounterVec::new(
            Opts::new("reconcile_mismatch_total", "Reconcile mismatches by type").namespace("grinder"),
            &["type"],
        )?;
        registry.register(Box::new(mismatch_total.clone()))?;

        let last_snapshot_age_seconds = Gauge::new(
            "grinder_reconcile_last_snapshot_age_seconds",
            "Age of the most recent account snapshot used by reconcile",
        )?;
        registry.register(Box::new(last_snapshot_age_seconds.clone()))?;

        let last_snapshot_ts_ms = IntGauge::new(
            "grinder_reconcile_last_snapshot_ts_ms",
            "Timestamp of the most recent account snapshot used by reconcile",
        )?;
        registry.register(Box::new(last_snapshot_ts_ms.clone()))?;

        let runs_total = IntCounter::new("grinder_reconcile_runs_total", "Total reconcile runs")?;
        registry.register(Box::new(runs_total.clone()))?;

        let runs_with_mismatch_total = IntCounter::new(
            "grinder_reconcile_runs_with_mismatch_total",
            "Reconcile runs that produced at least one mismatch",
        )?;
        registry.register(Box::new(runs_with_mismatch_total.clone()))?;

        let action_planned_total = IntCounterVec::new(
            Opts::new("reconcile_action_planned_total", "Remediation actions planned").namespace("grinder"),
            &["action"],
        )?;
        registry.register(Box::new(action_planned_total.clone()))?;

        let action_executed_total = IntCounterVec::new(
            Opts::new("reconcile_action_executed_total", "Remediation actions executed").namespace("grinder"),
            &["action"],
        )?;
        registry.register(Box::new(action_executed_total.clone()))?;

        let action_blocked_total = IntCounterVec::new(
            Opts::new("reconcile_action_blocked_total", "Remediation actions blocked").namespace("grinder"),
            &["reason"],
        )?;
        registry.register(Box::new(action_blocked_total.clone()))?;

        let runs_with_remediation_total = IntCounterVec::new(
            Opts::new(
                "reconcile_runs_with_remediation_total",
                "Reconcile runs where remediation ran at least once",
            )
            .namespace("grinder"),
            &["action"],
        )?;
        registry.register(Box::new(runs_with_remediation_total.clone()))?;

        let last_remediation_ts_ms = IntGauge::new(
            "grinder_reconcile_last_remediation_ts_ms",
            "Timestamp of the last executed remediation action",
        )?;
        registry.register(Box::new(last_remediation_ts_ms.clone()))?;

        Ok(Self {
            mismatch_total,
            last_snapshot_age_seconds,
            last_snapshot_ts_ms,
            runs_total,
            runs_with_mismatch_total,
            action_planned_total,
            action_executed_total,
            action_blocked_total,
            runs_with_remediation_total,
            last_remediation_ts_ms,
        })
    }
}

/// Daily remediation budget gauges.
pub struct BudgetMetrics {
    pub calls_used_day: IntGauge,
    pub notional_used_day: Gauge,
    pub calls_remaining_day: IntGauge,
    pub notional_remaining_day: Gauge,
    pub configured: IntGaugeVec,
}

impl BudgetMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let calls_used_day = IntGauge::new(
            "grinder_reconcile_budget_calls_used_day",
            "Remediation calls used so far today",
        )?;
        registry.register(Box::new(calls_used_day.clone()))?;

        let notional_used_day = Gauge::new(
            "grinder_reconcile_budget_notional_used_day",
            "Remediation notional spent so far today",
        )?;
        registry.register(Box::new(notional_used_day.clone()))?;

        let calls_remaining_day = IntGauge::new(
            "grinder_reconcile_budget_calls_remaining_day",
            "Remediation calls remaining today",
        )?;
        registry.register(Box::new(calls_remaining_day.clone()))?;

        let notional_remaining_day = Gauge::new(
            "grinder_reconcile_budget_notional_remaining_day",
            "Remediation notional remaining today",
        )?;
        registry.register(Box::new(notional_remaining_day.clone()))?;

        let configured = IntGaugeVec::new(
            Opts::new(
                "reconcile_budget_configured",
                "Configured daily/run remediation limits",
            )
            .namespace("grinder"),
            &["limit"],
        )?;
        registry.register(Box::new(configured.clone()))?;

        Ok(Self {
            calls_used_day,
            notional_used_day,
            calls_remaining_day,
            notional_remaining_day,
            configured,
        })
    }
}

/// High-availability role gauges.
pub struct HaMetrics {
    pub role: IntGaugeVec,
    pub is_leader: IntGauge,
}

impl HaMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let role = IntGaugeVec::new(
            Opts::new("ha_role", "Current HA role (1 for the active role, 0 otherwise)").namespace("grinder"),
            &["role"],
        )?;
        registry.register(Box::new(role.clone()))?;

        let is_leader = IntGauge::new("grinder_ha_is_leader", "Whether this instance is the HA leader")?;
        registry.register(Box::new(is_leader.clone()))?;

        Ok(Self { role, is_leader })
    }

    /// Sets `role`'s one-hot gauge and the leader flag together, so the two
    /// series are never observed out of sync with each other.
    pub fn set_role(&self, role: crate::account::HaRole) {
        for candidate in [
            crate::account::HaRole::Active,
            crate::account::HaRole::Standby,
            crate::account::HaRole::Unknown,
        ] {
            let value = if candidate == role { 1 } else { 0 };
            self.role.with_label_values(&[candidate.as_str()]).set(value);
        }
        self.is_leader.set(if role.is_leader() { 1 } else { 0 });
    }
}

/// Process-level liveness gauges (spec.md §6: `grinder_up`,
/// `grinder_uptime_seconds`, `grinder_kill_switch_triggered`,
/// `grinder_drawdown_pct`).
pub struct SystemMetrics {
    pub up: IntGauge,
    pub uptime_seconds: Gauge,
    pub kill_switch_triggered: IntGauge,
    pub drawdown_pct: Gauge,
}

impl SystemMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let up = IntGauge::new("grinder_up", "1 once the process has finished start-up")?;
        registry.register(Box::new(up.clone()))?;

        let uptime_seconds = Gauge::new("grinder_uptime_seconds", "Seconds since the process started")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let kill_switch_triggered =
            IntGauge::new("grinder_kill_switch_triggered", "1 while the kill switch is latched")?;
        registry.register(Box::new(kill_switch_triggered.clone()))?;

        let drawdown_pct = Gauge::new("grinder_drawdown_pct", "Current drawdown as a fraction of peak equity")?;
        registry.register(Box::new(drawdown_pct.clone()))?;

        Ok(Self {
            up,
            uptime_seconds,
            kill_switch_triggered,
            drawdown_pct,
        })
    }
}

/// Measured-HTTP-layer metrics (spec.md §6: `grinder_http_*` by `op`),
/// grounded on `bog-core/src/http/measured.rs`'s retry/circuit-breaker
/// wrapper. No `order_id`/`key`/`client_id` label is ever attached here —
/// `op` is drawn from the closed [`crate::config::HttpOp`] set.
pub struct HttpMetrics {
    pub requests_total: IntCounterVec,
    pub retries_total: IntCounterVec,
    pub fails_total: IntCounterVec,
    pub latency_ms: HistogramVec,
}

impl HttpMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Exchange HTTP calls by op and outcome").namespace("grinder"),
            &["op", "outcome_class"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let retries_total = IntCounterVec::new(
            Opts::new("http_retries_total", "Exchange HTTP retries by op and failure reason").namespace("grinder"),
            &["op", "reason_class"],
        )?;
        registry.register(Box::new(retries_total.clone()))?;

        let fails_total = IntCounterVec::new(
            Opts::new("http_fails_total", "Exchange HTTP calls that failed after all retries").namespace("grinder"),
            &["op", "class"],
        )?;
        registry.register(Box::new(fails_total.clone()))?;

        let latency_ms = HistogramVec::new(
            HistogramOpts::new("http_latency_ms", "Exchange HTTP call latency in milliseconds")
                .namespace("grinder")
                .buckets(vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0]),
            &["op"],
        )?;
        registry.register(Box::new(latency_ms.clone()))?;

        Ok(Self {
            requests_total,
            retries_total,
            fails_total,
            latency_ms,
        })
    }

    /// Records one outcome for a completed call (spec.md §4.G): `outcome`
    /// is `"ok"` or `"err"`; `elapsed_ms` feeds the latency histogram
    /// regardless of outcome.
    pub fn observe_call(&self, op: &str, outcome: &str, elapsed_ms: f64) {
        self.requests_total.with_label_values(&[op, outcome]).inc();
        self.latency_ms.with_label_values(&[op]).observe(elapsed_ms);
    }

    pub fn record_retry(&self, op: &str, reason_class: &str) {
        self.retries_total.with_label_values(&[op, reason_class]).inc();
    }

    pub fn record_fail(&self, op: &str, class: &str) {
        self.fails_total.with_label_values(&[op, class]).inc();
    }
}

/// Smart-order-router metrics (spec.md §6: fill-probability enforcement).
pub struct RouterMetrics {
    pub fill_prob_blocks_total: IntCounter,
    pub fill_prob_enforce_enabled: IntGauge,
}

impl RouterMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let fill_prob_blocks_total = IntCounter::new(
            "grinder_router_fill_prob_blocks_total",
            "Router decisions blocked by the fill-probability gate",
        )?;
        registry.register(Box::new(fill_prob_blocks_total.clone()))?;

        let fill_prob_enforce_enabled = IntGauge::new(
            "grinder_router_fill_prob_enforce_enabled",
            "1 when the fill-probability gate blocks rather than only observes",
        )?;
        registry.register(Box::new(fill_prob_enforce_enabled.clone()))?;

        Ok(Self {
            fill_prob_blocks_total,
            fill_prob_enforce_enabled,
        })
    }
}

/// Data-quality metrics (spec.md §6: stale/gap/outlier detection on the
/// feature engine's ingest path).
pub struct DataMetrics {
    pub stale_total: IntCounterVec,
    pub gap_total: IntCounterVec,
    pub outlier_total: IntCounterVec,
}

impl DataMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let stale_total = IntCounterVec::new(
            Opts::new("data_stale_total", "Snapshots rejected as stale by stream").namespace("grinder"),
            &["stream"],
        )?;
        registry.register(Box::new(stale_total.clone()))?;

        let gap_total = IntCounterVec::new(
            Opts::new("data_gap_total", "Bar-series gaps detected by bucket").namespace("grinder"),
            &["bucket"],
        )?;
        registry.register(Box::new(gap_total.clone()))?;

        let outlier_total = IntCounterVec::new(
            Opts::new("data_outlier_total", "Outlier ticks rejected by kind").namespace("grinder"),
            &["kind"],
        )?;
        registry.register(Box::new(outlier_total.clone()))?;

        Ok(Self {
            stale_total,
            gap_total,
            outlier_total,
        })
    }
}

/// ML-gate metrics (spec.md §6). The core ships the gauges/counters the
/// gate contract requires; no model inference lives in this crate (out of
/// scope per spec.md §1) — a `bog-bins` adapter would feed these.
pub struct MlMetrics {
    pub active_on: IntGauge,
    pub block_total: IntCounterVec,
    pub inference_latency_ms: Histogram,
}

impl MlMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let active_on = IntGauge::new("grinder_ml_active_on", "1 while the ML gate is actively enforcing")?;
        registry.register(Box::new(active_on.clone()))?;

        let block_total = IntCounterVec::new(
            Opts::new("ml_block_total", "Orders blocked by the ML gate by reason").namespace("grinder"),
            &["reason"],
        )?;
        registry.register(Box::new(block_total.clone()))?;

        let inference_latency_ms = Histogram::with_opts(
            HistogramOpts::new("grinder_ml_inference_latency_ms", "ML gate inference latency in milliseconds")
                .buckets(vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]),
        )?;
        registry.register(Box::new(inference_latency_ms.clone()))?;

        Ok(Self {
            active_on,
            block_total,
            inference_latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::HaRole;

    #[test]
    fn registry_construction_registers_every_family() {
        let registry = MetricsRegistry::new().unwrap();
        assert!(!registry.registry().gather().is_empty());
    }

    #[test]
    fn reconcile_metrics_accept_labels() {
        let registry = MetricsRegistry::new().unwrap();
        registry
            .reconcile()
            .mismatch_total
            .with_label_values(&["ORDER_MISSING_ON_EXCHANGE"])
            .inc();
        registry
            .reconcile()
            .action_blocked_total
            .with_label_values(&["not_leader"])
            .inc();
        let families = registry.registry().gather();
        assert!(families.iter().any(|f| f.name() == "grinder_reconcile_mismatch_total"));
    }

    #[test]
    fn ha_metrics_set_role_is_one_hot() {
        let registry = MetricsRegistry::new().unwrap();
        registry.ha().set_role(HaRole::Active);
        assert_eq!(registry.ha().role.with_label_values(&["active"]).get(), 1);
        assert_eq!(registry.ha().role.with_label_values(&["standby"]).get(), 0);
        assert_eq!(registry.ha().is_leader.get(), 1);

        registry.ha().set_role(HaRole::Standby);
        assert_eq!(registry.ha().role.with_label_values(&["active"]).get(), 0);
        assert_eq!(registry.ha().is_leader.get(), 0);
    }

    #[test]
    fn system_metrics_are_up_after_construction() {
        let registry = MetricsRegistry::new().unwrap();
        assert_eq!(registry.system().up.get(), 1);
        registry.refresh_uptime();
        assert!(registry.system().uptime_seconds.get() >= 0.0);
    }

    #[test]
    fn http_metrics_record_requests_and_latency() {
        let registry = MetricsRegistry::new().unwrap();
        registry.http().observe_call("place_order", "ok", 12.5);
        registry.http().record_retry("place_order", "transient");
        registry.http().record_fail("cancel_order", "timeout");
        assert_eq!(
            registry.http().requests_total.with_label_values(&["place_order", "ok"]).get(),
            1
        );
        assert_eq!(
            registry.http().retries_total.with_label_values(&["place_order", "transient"]).get(),
            1
        );
        assert_eq!(
            registry.http().fails_total.with_label_values(&["cancel_order", "timeout"]).get(),
            1
        );
    }

    #[test]
    fn router_and_data_and_ml_families_register_without_collision() {
        let registry = MetricsRegistry::new().unwrap();
        registry.router().fill_prob_blocks_total.inc();
        registry.router().fill_prob_enforce_enabled.set(1);
        registry.data().stale_total.with_label_values(&["mid_feed"]).inc();
        registry.ml().active_on.set(1);
        registry.ml().block_total.with_label_values(&["low_confidence"]).inc();
        registry.ml().inference_latency_ms.observe(3.0);
        let families = registry.registry().gather();
        assert!(families.iter().any(|f| f.name() == "grinder_ml_inference_latency_ms"));
        assert!(families.iter().any(|f| f.name() == "grinder_http_latency_ms"));
    }
}
