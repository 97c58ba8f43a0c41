//! Abstract boundaries between the pure decision pipeline and the outside
//! world (spec.md §6). Nothing in `core`, `features`, `fsm`, `risk`, or
//! `execution` depends on these traits; only the orchestrator does.

pub mod exchange;
pub mod feed;

pub use exchange::{AccountSnapshot, ExchangeOrder, ExchangePort, ExchangePosition, PositionMode};
pub use feed::DataConnector;
