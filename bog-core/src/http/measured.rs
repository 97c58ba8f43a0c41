//! Retry-with-backoff and a per-operation circuit breaker wrapping every
//! exchange call (spec.md §4.G), generalizing the teacher's
//! `resilience/circuit_breaker.rs` three-state breaker from a single global
//! instance to one breaker per [`HttpOp`] so a `fetch_positions` outage
//! doesn't fast-fail unrelated `place_order` calls.

use crate::config::{HttpConfig, HttpOp};
use crate::core::ConnectorError;
use crate::http::deadlines::with_deadline;
use crate::observability::metrics::HttpMetrics;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            _ => CircuitState::HalfOpen,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

/// One breaker per `HttpOp`. Closed passes every call through; Open fails
/// fast until `reset_timeout` elapses, then allows one probe (HalfOpen);
/// `success_threshold` consecutive probe successes close it again, any
/// probe failure reopens it immediately.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: AtomicU8,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            opened_at: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn is_call_permitted(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .lock()
                    .unwrap()
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.config.reset_timeout {
                    self.transition_to_half_open();
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::Release);
            }
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.transition_to_closed();
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition_to_open();
                }
            }
            CircuitState::HalfOpen => self.transition_to_open(),
            CircuitState::Open => {}
        }
    }

    fn transition_to_closed(&self) {
        self.state.store(CircuitState::Closed as u8, Ordering::Release);
        self.failure_count.store(0, Ordering::Release);
        self.success_count.store(0, Ordering::Release);
        *self.opened_at.lock().unwrap() = None;
    }

    fn transition_to_open(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        self.success_count.store(0, Ordering::Release);
        *self.opened_at.lock().unwrap() = Some(Instant::now());
    }

    fn transition_to_half_open(&self) {
        self.state.store(CircuitState::HalfOpen as u8, Ordering::Release);
        self.failure_count.store(0, Ordering::Release);
        self.success_count.store(0, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff, capped at `max_delay`. `attempt` is 1-indexed
    /// (the delay before the *second* attempt is `backoff(1)`).
    fn backoff(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.saturating_mul(1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX));
        scaled.min(self.max_delay)
    }
}

/// Wraps every `ExchangePort` call an adapter makes to a real venue with a
/// deadline, a bounded retry loop, and a per-op circuit breaker.
pub struct MeasuredClient {
    http: HttpConfig,
    retry: RetryPolicy,
    breaker_config: CircuitBreakerConfig,
    breakers: DashMap<HttpOp, CircuitBreaker>,
    metrics: Option<Arc<HttpMetrics>>,
}

impl MeasuredClient {
    pub fn new(http: HttpConfig, retry: RetryPolicy, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            http,
            retry,
            breaker_config,
            breakers: DashMap::new(),
            metrics: None,
        }
    }

    /// Attaches the `grinder_http_*` metric family (spec.md §6) so every
    /// call this client makes is observed. Optional: tests and internal
    /// call sites that don't care about metrics use [`Self::new`] alone.
    pub fn with_metrics(mut self, metrics: Arc<HttpMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn breaker_for(&self, op: HttpOp) -> dashmap::mapref::one::Ref<'_, HttpOp, CircuitBreaker> {
        if !self.breakers.contains_key(&op) {
            self.breakers
                .entry(op)
                .or_insert_with(|| CircuitBreaker::new(self.breaker_config.clone()));
        }
        self.breakers.get(&op).unwrap()
    }

    pub fn circuit_state(&self, op: HttpOp) -> CircuitState {
        self.breaker_for(op).state()
    }

    /// Calls `make_call` (a factory producing a fresh future per attempt,
    /// since a `Future` can't be polled twice) under `op`'s configured
    /// deadline, retrying transient/timeout failures up to
    /// `retry.max_attempts` times with exponential backoff. A tripped
    /// circuit fails fast with [`ConnectorError::CircuitOpen`] without
    /// attempting the call at all.
    pub async fn call<F, Fut, T>(&self, op: HttpOp, mut make_call: F) -> Result<T, ConnectorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ConnectorError>>,
    {
        let deadline = self.http.deadline(op);
        let mut last_err = None;
        let op_label = op.as_str();
        let started = Instant::now();

        for attempt in 0..self.retry.max_attempts {
            if !self.breaker_for(op).is_call_permitted() {
                if let Some(metrics) = &self.metrics {
                    metrics.observe_call(op_label, "err", started.elapsed().as_secs_f64() * 1_000.0);
                    metrics.record_fail(op_label, "circuit_open");
                }
                return Err(ConnectorError::CircuitOpen {
                    op: format!("{op:?}"),
                });
            }

            match with_deadline(deadline, make_call()).await {
                Ok(value) => {
                    self.breaker_for(op).record_success();
                    if let Some(metrics) = &self.metrics {
                        metrics.observe_call(op_label, "ok", started.elapsed().as_secs_f64() * 1_000.0);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    self.breaker_for(op).record_failure();
                    if !err.is_retryable() || attempt + 1 >= self.retry.max_attempts {
                        if let Some(metrics) = &self.metrics {
                            metrics.observe_call(op_label, "err", started.elapsed().as_secs_f64() * 1_000.0);
                            metrics.record_fail(op_label, err.class());
                        }
                        return Err(err);
                    }
                    if let Some(metrics) = &self.metrics {
                        metrics.record_retry(op_label, err.class());
                    }
                    last_err = Some(err);
                    tokio::time::sleep(self.retry.backoff(attempt)).await;
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.observe_call(op_label, "err", started.elapsed().as_secs_f64() * 1_000.0);
        }
        Err(last_err.unwrap_or(ConnectorError::NonRetryable("retry loop exhausted".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32 as Counter;
    use std::sync::Arc;

    #[test]
    fn breaker_opens_after_threshold_failures() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 3,
            ..Default::default()
        });
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.is_call_permitted());
    }

    #[test]
    fn breaker_half_opens_after_timeout_and_closes_on_success() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_millis(5),
            success_threshold: 1,
        });
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(10));
        assert!(cb.is_call_permitted());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let cb = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_millis(5),
            success_threshold: 2,
        });
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(10));
        assert!(cb.is_call_permitted());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn client_retries_transient_failures_then_succeeds() {
        let client = MeasuredClient::new(
            HttpConfig::default(),
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
            CircuitBreakerConfig::default(),
        );
        let attempts = Arc::new(Counter::new(0));
        let attempts_clone = attempts.clone();
        let result = client
            .call(HttpOp::PlaceOrder, move || {
                let attempts = attempts_clone.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(ConnectorError::Transient("flaky".to_string()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_does_not_retry_non_retryable_errors() {
        let client = MeasuredClient::new(
            HttpConfig::default(),
            RetryPolicy::default(),
            CircuitBreakerConfig::default(),
        );
        let attempts = Arc::new(Counter::new(0));
        let attempts_clone = attempts.clone();
        let result: Result<(), _> = client
            .call(HttpOp::CancelOrder, move || {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(ConnectorError::NonRetryable("bad request".to_string()))
                }
            })
            .await;
        assert!(matches!(result, Err(ConnectorError::NonRetryable(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn open_circuit_fails_fast_without_calling() {
        let client = MeasuredClient::new(
            HttpConfig::default(),
            RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
            CircuitBreakerConfig {
                failure_threshold: 1,
                reset_timeout: Duration::from_secs(60),
                success_threshold: 1,
            },
        );
        let _ = client
            .call(HttpOp::SetLeverage, || async {
                Err::<(), _>(ConnectorError::Transient("down".to_string()))
            })
            .await;
        assert_eq!(client.circuit_state(HttpOp::SetLeverage), CircuitState::Open);

        let attempts = Arc::new(Counter::new(0));
        let attempts_clone = attempts.clone();
        let result: Result<(), _> = client
            .call(HttpOp::SetLeverage, move || {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;
        assert!(matches!(result, Err(ConnectorError::CircuitOpen { .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
    }
}
