//! Per-call deadline enforcement (spec.md §4.G).

use crate::core::ConnectorError;
use std::future::Future;
use std::time::Duration;

/// Runs `fut` under a hard deadline, converting a timeout into
/// [`ConnectorError::Timeout`]. `fut` itself still reports its own errors —
/// this only adds the ceiling spec.md §4.G requires on every exchange call.
pub async fn with_deadline<F, T>(deadline: Duration, fut: F) -> Result<T, ConnectorError>
where
    F: Future<Output = Result<T, ConnectorError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(ConnectorError::Timeout {
            elapsed_ms: deadline.as_millis() as u64,
        }),
    }
}
