//! Measured HTTP layer (spec.md §4.G, §7): deadline enforcement, retry with
//! backoff, and a per-operation circuit breaker sit between `bog-bins`'s
//! real exchange client and the `ConnectorError` taxonomy every other module
//! in this crate consumes.
//!
//! This is the one layer in `bog-core` that legitimately measures real
//! elapsed wall-clock time (`std::time::Instant`) — it wraps genuine network
//! I/O, not a decision formula, so spec.md §5's "no component reads
//! wall-clock time directly" does not apply to it the way it applies to the
//! FSM, risk gates, or execution engine.

pub mod deadlines;
pub mod measured;

pub use deadlines::with_deadline;
pub use measured::{CircuitBreaker, CircuitBreakerConfig, CircuitState, MeasuredClient, RetryPolicy};
