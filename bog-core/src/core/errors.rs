//! Error taxonomy (spec.md §7): transient / non-retryable / timeout / closed /
//! circuit-open for connector calls, plus configuration errors for the thin
//! adapter layer. Guard rejections are never errors — they are structured
//! `AllowDecision` values (see `risk::types`).

use thiserror::Error;

/// Errors surfaced by an `ExchangePort` implementation (spec.md §6).
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("transient connector error: {0}")]
    Transient(String),

    #[error("non-retryable connector error: {0}")]
    NonRetryable(String),

    #[error("connector operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("connector is closed")]
    Closed,

    #[error("circuit breaker open for op {op}")]
    CircuitOpen { op: String },
}

impl ConnectorError {
    /// Whether the measured HTTP layer should retry this failure
    /// (spec.md §4.G/§7).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectorError::Transient(_) | ConnectorError::Timeout { .. })
    }

    /// Closed label value for the `grinder_http_fails_total{class}` /
    /// `grinder_http_retries_total{reason_class}` families (spec.md §6).
    pub fn class(&self) -> &'static str {
        match self {
            ConnectorError::Transient(_) => "transient",
            ConnectorError::NonRetryable(_) => "non_retryable",
            ConnectorError::Timeout { .. } => "timeout",
            ConnectorError::Closed => "closed",
            ConnectorError::CircuitOpen { .. } => "circuit_open",
        }
    }
}

/// Errors constructing a `Config` from environment variables (spec.md §6).
/// Raised only in the thin adapter layer (`bog-bins`), never inside `bog-core`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {var}: {value} ({reason})")]
    InvalidValue {
        var: String,
        value: String,
        reason: String,
    },
}

/// Errors from idempotency store operations that represent a correctness
/// hazard rather than an ordinary cache outcome (spec.md §4.A).
#[derive(Debug, Error)]
pub enum IdempotencyError {
    #[error("request fingerprint drift for key {key}: expected {expected}, got {actual}")]
    FingerprintDrift {
        key: String,
        expected: String,
        actual: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_timeout_are_retryable() {
        assert!(ConnectorError::Transient("reset".into()).is_retryable());
        assert!(ConnectorError::Timeout { elapsed_ms: 600 }.is_retryable());
    }

    #[test]
    fn non_retryable_and_closed_are_not_retryable() {
        assert!(!ConnectorError::NonRetryable("bad request".into()).is_retryable());
        assert!(!ConnectorError::Closed.is_retryable());
        assert!(!ConnectorError::CircuitOpen { op: "place_order".into() }.is_retryable());
    }
}
