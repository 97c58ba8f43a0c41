//! Paper-mode market data feed and exchange port: the thin adapter layer's
//! concrete implementation of [`DataConnector`]/[`ExchangePort`] for
//! `SafeMode::ReadOnly`/`Paper` runs, since `bog-core` ships no real venue
//! integration by design (spec.md §6 — only the trait boundary is
//! specified).
//!
//! Grounded on the teacher's `bog-bins/src/bin/simple_spread_simulated.rs`
//! synthetic-tick generator and `bog-core/src/execution/simulated.rs`'s
//! instant-fill `SimulatedExecutor`. The synthetic price path is a seeded
//! random walk (`rand::rngs::StdRng`, injected, never `thread_rng`) rather
//! than the teacher's deterministic modulo-ramp, so a paper run exercises
//! the fill-probability and drawdown gates with two-sided movement; the
//! instant-fill-at-rest-price rule is the teacher's.

use async_trait::async_trait;
use bog_core::core::{ConnectorError, OrderStatus, Side, Snapshot};
use bog_core::ports::{AccountSnapshot, ExchangeOrder, ExchangePort, ExchangePosition, PositionMode};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Shared synthetic market state the feed advances and the exchange port
/// reads to decide resting-order fills.
pub struct SyntheticMarket {
    mid: Mutex<Decimal>,
    half_spread: Decimal,
}

impl SyntheticMarket {
    pub fn new(start_mid: Decimal, half_spread: Decimal) -> Self {
        Self {
            mid: Mutex::new(start_mid),
            half_spread,
        }
    }

    pub fn best_bid(&self) -> Decimal {
        *self.mid.lock() - self.half_spread
    }

    pub fn best_ask(&self) -> Decimal {
        *self.mid.lock() + self.half_spread
    }

    fn step(&self, delta: Decimal) {
        let mut mid = self.mid.lock();
        let next = *mid + delta;
        *mid = if next > Decimal::ZERO { next } else { *mid };
    }
}

/// Synthetic tick generator for one symbol: a seeded random walk around a
/// starting mid price, ticking every `poll_snapshots` call.
pub struct SyntheticFeed {
    symbol: String,
    market: Arc<SyntheticMarket>,
    rng: StdRng,
    step_bps: i64,
    ts_ms: i64,
    tick_interval_ms: i64,
    connected: bool,
}

impl SyntheticFeed {
    pub fn new(symbol: impl Into<String>, market: Arc<SyntheticMarket>, seed: u64, start_ts_ms: i64, tick_interval_ms: i64) -> Self {
        Self {
            symbol: symbol.into(),
            market,
            rng: StdRng::seed_from_u64(seed),
            step_bps: 5,
            ts_ms: start_ts_ms,
            tick_interval_ms,
            connected: false,
        }
    }
}

#[async_trait]
impl bog_core::ports::DataConnector for SyntheticFeed {
    async fn connect(&mut self) -> Result<(), ConnectorError> {
        self.connected = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ConnectorError> {
        self.connected = false;
        Ok(())
    }

    async fn reconnect(&mut self, last_seen_ts: i64) -> Result<(), ConnectorError> {
        self.ts_ms = self.ts_ms.max(last_seen_ts);
        self.connected = true;
        Ok(())
    }

    async fn poll_snapshots(&mut self) -> Result<Vec<Snapshot>, ConnectorError> {
        if !self.connected {
            return Err(ConnectorError::Closed);
        }

        let mid = *self.market.mid.lock();
        let bps: i64 = self.rng.gen_range(-self.step_bps..=self.step_bps);
        let delta = mid * Decimal::from(bps) / dec!(10000);
        self.market.step(delta);

        self.ts_ms += self.tick_interval_ms;
        let snapshot = Snapshot {
            symbol: self.symbol.clone(),
            ts_ms: self.ts_ms,
            best_bid_price: self.market.best_bid(),
            best_bid_qty: dec!(1),
            best_ask_price: self.market.best_ask(),
            best_ask_qty: dec!(1),
            last_trade_price: None,
            last_trade_qty: None,
        };
        Ok(vec![snapshot])
    }
}

#[derive(Debug, Clone)]
struct PaperOrder {
    exchange: ExchangeOrder,
}

struct PaperState {
    next_id: u64,
    orders: HashMap<String, PaperOrder>,
    positions: HashMap<(String, Side), ExchangePosition>,
}

/// In-memory [`ExchangePort`]: places resting limit orders instantly,
/// marks them filled the moment the synthetic mid price crosses their
/// price, and tracks positions from fills — the teacher's
/// `SimulatedExecutor` instant-fill rule, applied at the touch rather than
/// unconditionally so paper orders behave like resting maker orders.
pub struct PaperExchangePort {
    markets: HashMap<String, Arc<SyntheticMarket>>,
    state: Mutex<PaperState>,
}

impl PaperExchangePort {
    pub fn new(markets: HashMap<String, Arc<SyntheticMarket>>) -> Self {
        Self {
            markets,
            state: Mutex::new(PaperState {
                next_id: 1,
                orders: HashMap::new(),
                positions: HashMap::new(),
            }),
        }
    }

    fn mark_price(&self, symbol: &str) -> Option<Decimal> {
        self.markets.get(symbol).map(|m| *m.mid.lock())
    }

    /// Runs `check_fills` against every symbol's current mark price. Cheap
    /// for the handful of symbols this binary trades at once.
    fn check_all_fills(&self, state: &mut PaperState) {
        for (symbol, market) in &self.markets {
            Self::check_fills_for_symbol(state, symbol, *market.mid.lock());
        }
    }

    fn check_fills_for_symbol(state: &mut PaperState, symbol: &str, mark_price: Decimal) {
        let mut newly_filled: Vec<(String, Side, Decimal, Decimal)> = Vec::new();
        for order in state.orders.values_mut() {
            let o = &mut order.exchange;
            if o.symbol != symbol || o.status.is_terminal() {
                continue;
            }
            let crosses = match o.side {
                Side::Buy => mark_price <= o.price,
                Side::Sell => mark_price >= o.price,
            };
            if crosses {
                o.filled_quantity = o.quantity;
                o.status = OrderStatus::Filled;
                newly_filled.push((o.symbol.clone(), o.side, o.quantity, o.price));
                debug!(order_id = %o.order_id, symbol = %o.symbol, "paper order filled");
            }
        }

        for (symbol, side, qty, price) in newly_filled {
            Self::apply_fill(state, &symbol, side, qty, price, mark_price);
        }
    }

    /// Folds one fill into the running weighted-average-entry position for
    /// `(symbol, side)`.
    fn apply_fill(state: &mut PaperState, symbol: &str, side: Side, qty: Decimal, price: Decimal, mark_price: Decimal) {
        let position = state
            .positions
            .entry((symbol.to_string(), side))
            .or_insert_with(|| ExchangePosition {
                symbol: symbol.to_string(),
                side,
                quantity: Decimal::ZERO,
                entry_price: price,
                mark_price,
                unrealized_pnl: Decimal::ZERO,
            });
        let total_qty = position.quantity + qty;
        if total_qty > Decimal::ZERO {
            position.entry_price = (position.entry_price * position.quantity + price * qty) / total_qty;
        }
        position.quantity = total_qty;
        position.mark_price = mark_price;
        position.unrealized_pnl = match side {
            Side::Buy => (mark_price - position.entry_price) * position.quantity,
            Side::Sell => (position.entry_price - mark_price) * position.quantity,
        };
    }
}

#[async_trait]
impl ExchangePort for PaperExchangePort {
    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        price: Decimal,
        quantity: Decimal,
        _level_id: u32,
        ts_ms: i64,
    ) -> Result<String, ConnectorError> {
        let mut state = self.state.lock();
        let id = format!("paper-{}", state.next_id);
        state.next_id += 1;
        let order = ExchangeOrder {
            order_id: id.clone(),
            symbol: symbol.to_string(),
            side,
            price,
            quantity,
            filled_quantity: Decimal::ZERO,
            status: OrderStatus::Open,
        };
        state.orders.insert(id.clone(), PaperOrder { exchange: order });
        self.check_all_fills(&mut state);
        let _ = ts_ms;
        Ok(id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool, ConnectorError> {
        let mut state = self.state.lock();
        match state.orders.get_mut(order_id) {
            Some(order) if !order.exchange.status.is_terminal() => {
                order.exchange.status = OrderStatus::Cancelled;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    async fn cancel_order_by_exchange_id(&self, _symbol: &str, id: &str) -> Result<bool, ConnectorError> {
        self.cancel_order(id).await
    }

    async fn replace_order(
        &self,
        order_id: &str,
        price: Option<Decimal>,
        quantity: Option<Decimal>,
    ) -> Result<String, ConnectorError> {
        let mut state = self.state.lock();
        let Some(order) = state.orders.get_mut(order_id) else {
            return Err(ConnectorError::NonRetryable(format!("unknown order {order_id}")));
        };
        if order.exchange.status.is_terminal() {
            return Err(ConnectorError::NonRetryable(format!("order {order_id} is terminal")));
        }
        if let Some(price) = price {
            order.exchange.price = price;
        }
        if let Some(quantity) = quantity {
            order.exchange.quantity = quantity;
        }
        self.check_all_fills(&mut state);
        Ok(order_id.to_string())
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<ExchangeOrder>, ConnectorError> {
        let mut state = self.state.lock();
        self.check_all_fills(&mut state);
        Ok(state
            .orders
            .values()
            .map(|o| o.exchange.clone())
            .filter(|o| o.symbol == symbol)
            .collect())
    }

    async fn fetch_positions(&self) -> Result<Vec<ExchangePosition>, ConnectorError> {
        let state = self.state.lock();
        Ok(state.positions.values().cloned().collect())
    }

    async fn fetch_account_snapshot(&self) -> Result<AccountSnapshot, ConnectorError> {
        let mut state = self.state.lock();
        self.check_all_fills(&mut state);
        Ok(AccountSnapshot {
            positions: state.positions.values().cloned().collect(),
            open_orders: state.orders.values().map(|o| o.exchange.clone()).collect(),
            ts_ms: 0,
            source: "paper".to_string(),
        })
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: Side,
        quantity: Decimal,
        reduce_only: bool,
    ) -> Result<String, ConnectorError> {
        let mut state = self.state.lock();
        let mid = self.mark_price(symbol).unwrap_or(Decimal::ZERO);
        let id = format!("paper-mkt-{}", state.next_id);
        state.next_id += 1;
        let order = ExchangeOrder {
            order_id: id.clone(),
            symbol: symbol.to_string(),
            side,
            price: mid,
            quantity,
            filled_quantity: quantity,
            status: OrderStatus::Filled,
        };
        state.orders.insert(id.clone(), PaperOrder { exchange: order });
        Self::apply_fill(&mut state, symbol, side, quantity, mid, mid);
        let _ = reduce_only;
        Ok(id)
    }

    async fn set_leverage(&self, _symbol: &str, leverage: u32) -> Result<u32, ConnectorError> {
        Ok(leverage)
    }

    async fn get_position_mode(&self) -> Result<PositionMode, ConnectorError> {
        Ok(PositionMode::OneWay)
    }
}
