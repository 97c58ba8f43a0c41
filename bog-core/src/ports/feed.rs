//! Data connector port: streams `Snapshot`s into the feature engine
//! (spec.md §6).

use crate::core::{ConnectorError, Snapshot};
use async_trait::async_trait;

/// Abstract market-data feed. Implementations must yield snapshots sorted
/// by `ts_ms` and be idempotent across a `reconnect` via `last_seen_ts` so a
/// dropped connection never replays or skips ticks silently.
#[async_trait]
pub trait DataConnector: Send + Sync {
    async fn connect(&mut self) -> Result<(), ConnectorError>;

    async fn close(&mut self) -> Result<(), ConnectorError>;

    /// Reconnects, resuming from just after `last_seen_ts` where the feed
    /// supports replay; feeds without replay simply resume live.
    async fn reconnect(&mut self, last_seen_ts: i64) -> Result<(), ConnectorError>;

    /// Pulls whatever snapshots are currently buffered, oldest first.
    async fn poll_snapshots(&mut self) -> Result<Vec<Snapshot>, ConnectorError>;
}
