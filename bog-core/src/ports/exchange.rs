//! Exchange port: the abstract boundary between the decision pipeline and a
//! live venue (spec.md §6).
//!
//! The core never talks to an exchange directly; the orchestrator holds a
//! `dyn ExchangePort` and drives it after every SOR decision. All methods are
//! async so a real implementation can sit behind the measured HTTP layer
//! without the core knowing about retries, deadlines, or backoff.

use crate::core::{ConnectorError, OrderStatus, Side};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub symbol: String,
    pub side: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Account state as of a single exchange poll (spec.md §4.H, §6): the
/// syncer validates this before the reconciler diffs it against the
/// expected store. `source` distinguishes a live REST fetch from a stub
/// (e.g. a no-op port used in dry-run configurations).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub positions: Vec<ExchangePosition>,
    pub open_orders: Vec<ExchangeOrder>,
    pub ts_ms: i64,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionMode {
    Hedge,
    OneWay,
}

/// Abstract exchange boundary (spec.md §6). Every method maps one-to-one to
/// a measured HTTP call in a real implementation; `ConnectorError` is the
/// closed error taxonomy the measured HTTP layer classifies into.
#[async_trait]
pub trait ExchangePort: Send + Sync {
    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        level_id: u32,
        ts_ms: i64,
    ) -> Result<String, ConnectorError>;

    async fn cancel_order(&self, order_id: &str) -> Result<bool, ConnectorError>;

    async fn cancel_order_by_exchange_id(
        &self,
        symbol: &str,
        id: &str,
    ) -> Result<bool, ConnectorError>;

    async fn replace_order(
        &self,
        order_id: &str,
        price: Option<Decimal>,
        quantity: Option<Decimal>,
    ) -> Result<String, ConnectorError>;

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ConnectorError>;

    async fn fetch_positions(&self) -> Result<Vec<ExchangePosition>, ConnectorError>;

    async fn fetch_account_snapshot(&self) -> Result<AccountSnapshot, ConnectorError>;

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        reduce_only: bool,
    ) -> Result<String, ConnectorError>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<u32, ConnectorError>;

    async fn get_position_mode(&self) -> Result<PositionMode, ConnectorError>;
}
