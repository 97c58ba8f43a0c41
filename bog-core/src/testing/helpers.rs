//! `FakeClock` drives every timestamp a test needs instead of the system
//! clock; `MockExchangePort` is a scriptable [`crate::ports::ExchangePort`]
//! for orchestrator and syncer tests.

use crate::core::{ConnectorError, OrderStatus, Side};
use crate::ports::{AccountSnapshot, ExchangeOrder, ExchangePort, ExchangePosition, PositionMode};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Monotonic millisecond clock a test advances explicitly. Never reads
/// `Instant::now()`.
#[derive(Debug, Default)]
pub struct FakeClock {
    now_ms: Mutex<i64>,
}

impl FakeClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: Mutex::new(start_ms),
        }
    }

    pub fn now_ms(&self) -> i64 {
        *self.now_ms.lock()
    }

    /// Advances the clock and returns the new value; panics on a negative
    /// step since timestamps in this system are never allowed to regress.
    pub fn advance(&self, delta_ms: i64) -> i64 {
        assert!(delta_ms >= 0, "FakeClock cannot move backwards");
        let mut now = self.now_ms.lock();
        *now += delta_ms;
        *now
    }

    pub fn set(&self, ts_ms: i64) {
        let mut now = self.now_ms.lock();
        assert!(ts_ms >= *now, "FakeClock cannot move backwards");
        *now = ts_ms;
    }
}

#[derive(Debug, Clone)]
struct ScriptedFailure {
    error: MockFailure,
}

#[derive(Debug, Clone)]
pub enum MockFailure {
    Transient,
    NonRetryable,
    Timeout,
    Closed,
    CircuitOpen,
}

impl MockFailure {
    fn into_error(self, op: &str) -> ConnectorError {
        match self {
            MockFailure::Transient => ConnectorError::Transient(op.to_string()),
            MockFailure::NonRetryable => ConnectorError::NonRetryable(op.to_string()),
            MockFailure::Timeout => ConnectorError::Timeout { elapsed_ms: 0 },
            MockFailure::Closed => ConnectorError::Closed,
            MockFailure::CircuitOpen => ConnectorError::CircuitOpen { op: op.to_string() },
        }
    }
}

/// In-memory [`ExchangePort`] double. Orders are assigned sequential ids;
/// a test can pre-arm a one-shot failure for any op via `fail_next`.
pub struct MockExchangePort {
    inner: Mutex<MockState>,
}

struct MockState {
    next_id: u64,
    orders: HashMap<String, ExchangeOrder>,
    positions: Vec<ExchangePosition>,
    account: AccountSnapshot,
    position_mode: PositionMode,
    pending_failures: HashMap<&'static str, ScriptedFailure>,
}

impl Default for MockExchangePort {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExchangePort {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockState {
                next_id: 1,
                orders: HashMap::new(),
                positions: Vec::new(),
                account: AccountSnapshot {
                    positions: Vec::new(),
                    open_orders: Vec::new(),
                    ts_ms: 0,
                    source: "mock".to_string(),
                },
                position_mode: PositionMode::OneWay,
                pending_failures: HashMap::new(),
            }),
        }
    }

    pub fn set_account_snapshot(&self, snapshot: AccountSnapshot) {
        self.inner.lock().account = snapshot;
    }

    pub fn set_positions(&self, positions: Vec<ExchangePosition>) {
        self.inner.lock().positions = positions;
    }

    /// Arms a one-shot failure the next call to `op` returns instead of
    /// succeeding.
    pub fn fail_next(&self, op: &'static str, failure: MockFailure) {
        self.inner
            .lock()
            .pending_failures
            .insert(op, ScriptedFailure { error: failure });
    }

    pub fn open_order_count(&self) -> usize {
        self.inner
            .lock()
            .orders
            .values()
            .filter(|o| matches!(o.status, OrderStatus::Open | OrderStatus::PartiallyFilled))
            .count()
    }

    fn take_failure(state: &mut MockState, op: &'static str) -> Option<ConnectorError> {
        state
            .pending_failures
            .remove(op)
            .map(|f| f.error.into_error(op))
    }
}

#[async_trait]
impl ExchangePort for MockExchangePort {
    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        _level_id: u32,
        _ts_ms: i64,
    ) -> Result<String, ConnectorError> {
        let mut state = self.inner.lock();
        if let Some(e) = Self::take_failure(&mut state, "place_order") {
            return Err(e);
        }
        let id = format!("mock-{}", state.next_id);
        state.next_id += 1;
        state.orders.insert(
            id.clone(),
            ExchangeOrder {
                order_id: id.clone(),
                symbol: symbol.to_string(),
                side,
                price,
                quantity,
                filled_quantity: Decimal::ZERO,
                status: OrderStatus::Open,
            },
        );
        Ok(id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, ConnectorError> {
        let mut state = self.inner.lock();
        if let Some(e) = Self::take_failure(&mut state, "cancel_order") {
            return Err(e);
        }
        if let Some(order) = state.orders.get_mut(order_id) {
            order.status = OrderStatus::Cancelled;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn cancel_order_by_exchange_id(
        &self,
        _symbol: &str,
        id: &str,
    ) -> Result<bool, ConnectorError> {
        self.cancel_order(id).await
    }

    async fn replace_order(
        &self,
        order_id: &str,
        price: Option<Decimal>,
        quantity: Option<Decimal>,
    ) -> Result<String, ConnectorError> {
        let mut state = self.inner.lock();
        if let Some(e) = Self::take_failure(&mut state, "replace_order") {
            return Err(e);
        }
        let existing = state
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| ConnectorError::NonRetryable(format!("unknown order {order_id}")))?;
        let new_id = format!("mock-{}", state.next_id);
        state.next_id += 1;
        let mut replaced = existing;
        replaced.order_id = new_id.clone();
        if let Some(p) = price {
            replaced.price = p;
        }
        if let Some(q) = quantity {
            replaced.quantity = q;
        }
        state.orders.remove(order_id);
        state.orders.insert(new_id.clone(), replaced);
        Ok(new_id)
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ConnectorError> {
        let mut state = self.inner.lock();
        if let Some(e) = Self::take_failure(&mut state, "fetch_open_orders") {
            return Err(e);
        }
        Ok(state
            .orders
            .values()
            .filter(|o| o.symbol == symbol && matches!(o.status, OrderStatus::Open | OrderStatus::PartiallyFilled))
            .cloned()
            .collect())
    }

    async fn fetch_positions(&self) -> Result<Vec<ExchangePosition>, ConnectorError> {
        let mut state = self.inner.lock();
        if let Some(e) = Self::take_failure(&mut state, "fetch_positions") {
            return Err(e);
        }
        Ok(state.positions.clone())
    }

    async fn fetch_account_snapshot(&self) -> Result<AccountSnapshot, ConnectorError> {
        let mut state = self.inner.lock();
        if let Some(e) = Self::take_failure(&mut state, "fetch_account_snapshot") {
            return Err(e);
        }
        Ok(state.account.clone())
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        _reduce_only: bool,
    ) -> Result<String, ConnectorError> {
        self.place_order(symbol, side, Decimal::ZERO, quantity, 0, 0)
            .await
    }

    async fn set_leverage(&self, _symbol: &str, leverage: u32) -> Result<u32, ConnectorError> {
        let mut state = self.inner.lock();
        if let Some(e) = Self::take_failure(&mut state, "set_leverage") {
            return Err(e);
        }
        Ok(leverage)
    }

    async fn get_position_mode(&self) -> Result<PositionMode, ConnectorError> {
        let mut state = self.inner.lock();
        if let Some(e) = Self::take_failure(&mut state, "get_position_mode") {
            return Err(e);
        }
        Ok(state.position_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_and_rejects_regression() {
        let clock = FakeClock::new(1_000);
        assert_eq!(clock.advance(500), 1_500);
        assert_eq!(clock.now_ms(), 1_500);
    }

    #[test]
    #[should_panic(expected = "cannot move backwards")]
    fn fake_clock_panics_on_regression() {
        let clock = FakeClock::new(1_000);
        clock.set(500);
    }

    #[tokio::test]
    async fn mock_port_places_and_cancels_orders() {
        let port = MockExchangePort::new();
        let id = port
            .place_order("BTCUSDT", Side::Buy, Decimal::from(100), Decimal::from(1), 0, 0)
            .await
            .unwrap();
        assert_eq!(port.open_order_count(), 1);
        assert!(port.cancel_order(&id).await.unwrap());
        assert_eq!(port.open_order_count(), 0);
    }

    #[tokio::test]
    async fn mock_port_honors_scripted_failure_once() {
        let port = MockExchangePort::new();
        port.fail_next("place_order", MockFailure::Transient);
        let err = port
            .place_order("BTCUSDT", Side::Buy, Decimal::from(100), Decimal::from(1), 0, 0)
            .await;
        assert!(err.is_err());
        let id = port
            .place_order("BTCUSDT", Side::Buy, Decimal::from(100), Decimal::from(1), 0, 0)
            .await
            .unwrap();
        assert!(!id.is_empty());
    }
}
