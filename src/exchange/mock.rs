//! Scripted in-memory exchange for tests and paper trading.

use crate::exchange::traits::{ExchangeClient, ExchangeError, Venue};
use crate::exchange::types::{OpenOrder, OrderSide, PlacedOrder};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MockState {
    prices: HashMap<String, Decimal>,
    balances: HashMap<String, Decimal>,
    open_orders: Vec<OpenOrder>,
    placed: Vec<PlacedOrder>,
    cancelled: Vec<String>,
    /// Order ids whose cancellation is scripted to fail.
    cancel_failures: HashSet<String>,
    /// When set, `create_order` fails with this message.
    create_failure: Option<String>,
}

/// Mock exchange backed by scripted prices, balances and open orders.
///
/// Orders submitted through the trait rest as open orders with zero
/// executed quantity; balances only change when a test adjusts them.
pub struct MockExchange {
    state: Arc<RwLock<MockState>>,
    order_id_counter: AtomicU64,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MockState::default())),
            order_id_counter: AtomicU64::new(1),
        }
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.state.write().await.prices.insert(symbol.to_string(), price);
    }

    pub async fn set_balance(&self, asset: &str, quantity: Decimal) {
        self.state.write().await.balances.insert(asset.to_string(), quantity);
    }

    /// Seed an open order as if it were resting on the venue.
    pub async fn push_open_order(&self, order: OpenOrder) {
        self.state.write().await.open_orders.push(order);
    }

    /// Script the next cancellation of `order_id` to fail.
    pub async fn fail_cancel(&self, order_id: &str) {
        self.state.write().await.cancel_failures.insert(order_id.to_string());
    }

    /// Script every subsequent `create_order` to fail.
    pub async fn fail_create(&self, message: &str) {
        self.state.write().await.create_failure = Some(message.to_string());
    }

    /// Orders submitted through the trait, in submission order.
    pub async fn placed_orders(&self) -> Vec<PlacedOrder> {
        self.state.read().await.placed.clone()
    }

    /// Order ids cancelled through the trait.
    pub async fn cancelled_orders(&self) -> Vec<String> {
        self.state.read().await.cancelled.clone()
    }
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    fn venue(&self) -> Venue {
        Venue::Mock
    }

    async fn current_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        self.state
            .read()
            .await
            .prices
            .get(symbol)
            .copied()
            .ok_or_else(|| ExchangeError::MissingData(format!("no price for {symbol}")))
    }

    async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<OpenOrder>, ExchangeError> {
        let state = self.state.read().await;
        Ok(state
            .open_orders
            .iter()
            .filter(|o| symbol.map_or(true, |s| o.symbol == s))
            .cloned()
            .collect())
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<(), ExchangeError> {
        let mut state = self.state.write().await;
        if state.cancel_failures.remove(order_id) {
            return Err(ExchangeError::Venue(format!(
                "cancel rejected for order {order_id}"
            )));
        }
        let before = state.open_orders.len();
        state.open_orders.retain(|o| o.order_id != order_id);
        if state.open_orders.len() == before {
            return Err(ExchangeError::MissingData(format!(
                "order {order_id} not open"
            )));
        }
        state.cancelled.push(order_id.to_string());
        Ok(())
    }

    async fn create_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<String, ExchangeError> {
        let mut state = self.state.write().await;
        if let Some(message) = &state.create_failure {
            return Err(ExchangeError::Transient(message.clone()));
        }
        let order_id = self.order_id_counter.fetch_add(1, Ordering::SeqCst).to_string();
        state.placed.push(PlacedOrder {
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
        });
        state.open_orders.push(OpenOrder {
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            side,
            price,
            orig_qty: quantity,
            executed_qty: Decimal::ZERO,
        });
        Ok(order_id)
    }

    async fn balance(&self, asset: &str) -> Result<Decimal, ExchangeError> {
        Ok(self
            .state
            .read()
            .await
            .balances
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }
}
