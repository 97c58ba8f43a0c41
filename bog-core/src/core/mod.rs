//! Shared vocabulary: sides, statuses, snapshots, client-order-ids, and the
//! error taxonomy every other module builds on.

pub mod errors;
pub mod types;

pub use errors::{ConfigError, ConnectorError, IdempotencyError};
pub use types::{ClientOrderId, OrderStatus, OrderType, Side, Snapshot, TimeInForce};
