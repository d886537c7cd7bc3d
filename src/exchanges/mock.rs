//! Scriptable in-memory exchange for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use super::{Exchange, ExchangeError, Result};
use crate::domain::{Fees, Order, OrderStatus, PriceQuote, Trade};

/// Mock exchange with pinned quotes and controllable fills.
pub(crate) struct MockExchange {
    name: String,
    connected: AtomicBool,
    fail_connect: bool,
    fees: Fees,
    pair_fees: HashMap<String, Fees>,
    quote_delay: Option<Duration>,
    order_delay: Option<Duration>,
    quotes: Mutex<HashMap<String, PriceQuote>>,
    fill_ratio: Mutex<Decimal>,
    failing_orders: AtomicU32,
    orders: Mutex<Vec<Order>>,
}

impl MockExchange {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            connected: AtomicBool::new(false),
            fail_connect: false,
            fees: Fees::flat(Decimal::ZERO),
            pair_fees: HashMap::new(),
            quote_delay: None,
            order_delay: None,
            quotes: Mutex::new(HashMap::new()),
            fill_ratio: Mutex::new(Decimal::ONE),
            failing_orders: AtomicU32::new(0),
            orders: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_fail_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub(crate) fn with_taker_fee(mut self, taker: Decimal) -> Self {
        self.fees = Fees::flat(taker);
        self
    }

    /// Overrides the taker fee on one pair.
    pub(crate) fn with_pair_fee(mut self, pair: &str, taker: Decimal) -> Self {
        self.pair_fees.insert(pair.to_string(), Fees::flat(taker));
        self
    }

    pub(crate) fn with_quote_delay(mut self, delay: Duration) -> Self {
        self.quote_delay = Some(delay);
        self
    }

    pub(crate) fn with_order_delay(mut self, delay: Duration) -> Self {
        self.order_delay = Some(delay);
        self
    }

    pub(crate) fn with_quote(self, pair: &str, bid: i64, ask: i64) -> Self {
        self.set_quote(pair, Decimal::from(bid), Decimal::from(ask));
        self
    }

    pub(crate) fn set_quote(&self, pair: &str, bid: Decimal, ask: Decimal) {
        let quote = PriceQuote {
            exchange: self.name.clone(),
            pair: pair.to_string(),
            bid,
            ask,
            bid_size: None,
            ask_size: None,
            last: None,
            timestamp: Utc::now(),
        };
        self.quotes.lock().unwrap().insert(pair.to_string(), quote);
    }

    pub(crate) fn set_raw_quote(&self, quote: PriceQuote) {
        self.quotes
            .lock()
            .unwrap()
            .insert(quote.pair.clone(), quote);
    }

    pub(crate) fn set_fill_ratio(&self, ratio: Decimal) {
        *self.fill_ratio.lock().unwrap() = ratio;
    }

    /// Makes the next `n` orders fail with an API error.
    pub(crate) fn fail_next_orders(&self, n: u32) {
        self.failing_orders.store(n, Ordering::SeqCst);
    }

    pub(crate) fn orders(&self) -> Vec<Order> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn connect(&self) -> Result<()> {
        if self.fail_connect {
            return Err(ExchangeError::Connection("mock connection failure".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_quote(&self, pair: &str) -> Result<PriceQuote> {
        if let Some(delay) = self.quote_delay {
            tokio::time::sleep(delay).await;
        }
        self.quotes
            .lock()
            .unwrap()
            .get(pair)
            .cloned()
            .ok_or_else(|| ExchangeError::PairNotSupported(pair.to_string()))
    }

    async fn place_order(&self, order: Order) -> Result<Trade> {
        self.orders.lock().unwrap().push(order.clone());
        if let Some(delay) = self.order_delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self.failing_orders.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_orders.store(failing - 1, Ordering::SeqCst);
            return Err(ExchangeError::Api("mock order rejected".into()));
        }

        let ratio = *self.fill_ratio.lock().unwrap();
        let quantity = order.quantity * ratio;
        let fee = self.pair_fees.get(&order.pair).copied().unwrap_or(self.fees);
        let status = if quantity.is_zero() {
            OrderStatus::Cancelled
        } else if quantity < order.quantity {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Filled
        };

        Ok(Trade {
            id: format!("{}-fill", order.id),
            order_id: order.id.clone(),
            exchange: self.name.clone(),
            pair: order.pair.clone(),
            side: order.side,
            price: order.price,
            quantity,
            fee: fee.taker_cost(order.price * quantity),
            fee_currency: "USD".to_string(),
            status,
            timestamp: Utc::now(),
        })
    }

    async fn get_balances(&self) -> Result<HashMap<String, Decimal>> {
        Ok(HashMap::from([("USD".to_string(), Decimal::from(1000))]))
    }

    fn get_fees(&self, pair: &str) -> Fees {
        self.pair_fees.get(pair).copied().unwrap_or(self.fees)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supported_pairs(&self) -> Vec<String> {
        let mut pairs: Vec<String> = self.quotes.lock().unwrap().keys().cloned().collect();
        pairs.sort();
        pairs
    }
}
