//! Two-leg execution of a cross-exchange opportunity.
//!
//! The buy leg is a single immediate-or-cancel order. Whatever it fills is
//! sold on the other venue, retrying with exponential backoff until the
//! position is flat or the attempts run out. Fills are recorded as they
//! happen so a timeout after the buy leg still reports what is left open.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ExecutionConfig;
use crate::domain::{Fees, Opportunity, Order, OrderSide, OrderStatus, Trade};
use crate::exchanges::{Exchange, ExchangeError, Manager};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Execution errors.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("opportunity {0} has expired")]
    Expired(String),

    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(Decimal),

    #[error("exchange {0} is not registered")]
    UnknownExchange(String),

    #[error("buy order on {exchange} was not filled")]
    NotFilled { exchange: String },

    #[error("buy order on {exchange} failed: {source}")]
    BuyFailed {
        exchange: String,
        #[source]
        source: ExchangeError,
    },

    /// The buy leg filled but the position could not be sold in full.
    #[error("{open_quantity} left unhedged on {exchange} after {attempts} sell attempts: {reason}")]
    Unhedged {
        exchange: String,
        open_quantity: Decimal,
        attempts: u32,
        reason: String,
        position: Box<OpenPosition>,
    },

    #[error("execution timed out after {0:?}")]
    Timeout(Duration),
}

/// Exponential backoff between sell attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Delay before the given retry (1 for the first retry), capped at `max_delay`.
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

/// Cash moved by a trade whose sell leg did not complete.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub pair: String,
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub bought: Decimal,
    /// Quote spent on the buy leg before fees.
    pub cost: Decimal,
    pub buy_fee: Decimal,
    pub sold: Decimal,
    /// Quote received from partial sells before fees.
    pub proceeds: Decimal,
    pub sell_fee: Decimal,
}

impl OpenPosition {
    pub fn open_quantity(&self) -> Decimal {
        self.bought - self.sold
    }
}

/// Fills seen so far. Outlives the legs when the execution times out.
#[derive(Debug, Default)]
struct Progress {
    buy: Option<Trade>,
    sells: Vec<Trade>,
    attempts: u32,
    last_error: Option<String>,
}

impl Progress {
    fn position(&self, opportunity: &Opportunity) -> OpenPosition {
        let (bought, cost, buy_fee) = self
            .buy
            .as_ref()
            .map_or((Decimal::ZERO, Decimal::ZERO, Decimal::ZERO), |t| {
                (t.quantity, t.notional(), t.fee)
            });

        OpenPosition {
            pair: opportunity.pair.clone(),
            buy_exchange: opportunity.buy_exchange.clone(),
            sell_exchange: opportunity.sell_exchange.clone(),
            bought,
            cost,
            buy_fee,
            sold: self.sells.iter().map(|t| t.quantity).sum(),
            proceeds: self.sells.iter().map(Trade::notional).sum(),
            sell_fee: self.sells.iter().map(|t| t.fee).sum(),
        }
    }
}

fn lock(progress: &Mutex<Progress>) -> MutexGuard<'_, Progress> {
    progress.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unhedged(opportunity: &Opportunity, position: OpenPosition, attempts: u32, reason: String) -> ExecutionError {
    let open_quantity = position.open_quantity();
    error!(
        id = %opportunity.id,
        exchange = %opportunity.sell_exchange,
        open_quantity = %open_quantity,
        reason = %reason,
        "Position left unhedged"
    );
    ExecutionError::Unhedged {
        exchange: opportunity.sell_exchange.clone(),
        open_quantity,
        attempts,
        reason,
        position: Box::new(position),
    }
}

/// Outcome of a completed round trip.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub opportunity_id: String,
    pub pair: String,
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub buy_trade: Trade,
    /// Sell fills merged into one trade at their average price.
    pub sell_trade: Trade,
    /// Base quantity bought and sold.
    pub quantity: Decimal,
    /// Quote spent on the buy leg before fees.
    pub cost: Decimal,
    /// Quote received on the sell leg before fees.
    pub proceeds: Decimal,
    pub buy_fee: Decimal,
    pub sell_fee: Decimal,
    /// `proceeds - cost`.
    pub gross_profit: Decimal,
    /// Gross profit minus both fees.
    pub net_profit: Decimal,
    pub sell_attempts: u32,
    pub elapsed: Duration,
    pub dry_run: bool,
}

impl ExecutionReport {
    pub fn fees(&self) -> Decimal {
        self.buy_fee + self.sell_fee
    }
}

/// Places the two legs of an opportunity on the registered venues.
pub struct Executor {
    manager: Arc<Manager>,
    timeout: Duration,
    retry: RetryPolicy,
    dry_run: bool,
}

impl Executor {
    pub fn new(manager: Arc<Manager>, timeout: Duration, retry: RetryPolicy, dry_run: bool) -> Self {
        Self {
            manager,
            timeout,
            retry,
            dry_run,
        }
    }

    /// Builds an executor from the `execution` section, filling unset values with defaults.
    pub fn from_config(manager: Arc<Manager>, config: Option<&ExecutionConfig>, dry_run: bool) -> Self {
        let Some(config) = config else {
            return Self::new(manager, DEFAULT_TIMEOUT, RetryPolicy::default(), dry_run);
        };

        let non_zero = |d: Duration, default: Duration| if d.is_zero() { default } else { d };

        let retry = match config.retry {
            Some(ref r) => RetryPolicy {
                max_attempts: r
                    .max_attempts
                    .map(|n| n.max(1) as u32)
                    .unwrap_or(DEFAULT_MAX_ATTEMPTS),
                initial_delay: non_zero(r.initial_delay, DEFAULT_INITIAL_DELAY),
                max_delay: non_zero(r.max_delay, DEFAULT_MAX_DELAY),
                multiplier: r.multiplier.unwrap_or(DEFAULT_MULTIPLIER),
            },
            None => RetryPolicy::default(),
        };

        Self::new(manager, non_zero(config.timeout, DEFAULT_TIMEOUT), retry, dry_run)
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Buys `quantity` on the buy venue and sells what was filled on the sell venue.
    pub async fn execute(
        &self,
        opportunity: &Opportunity,
        quantity: Decimal,
    ) -> Result<ExecutionReport, ExecutionError> {
        if opportunity.is_expired() {
            return Err(ExecutionError::Expired(opportunity.id.clone()));
        }
        if quantity <= Decimal::ZERO {
            return Err(ExecutionError::InvalidQuantity(quantity));
        }

        let started = Instant::now();
        info!(
            id = %opportunity.id,
            route = %opportunity.route(),
            quantity = %quantity,
            buy_price = %opportunity.buy_price,
            sell_price = %opportunity.sell_price,
            dry_run = self.dry_run,
            "Executing opportunity"
        );

        let progress = Mutex::new(Progress::default());
        let legs = if self.dry_run {
            Ok(self.simulate(opportunity, quantity))
        } else {
            match timeout(self.timeout, self.run(opportunity, quantity, &progress)).await {
                Ok(result) => result,
                Err(_) => {
                    error!(id = %opportunity.id, timeout = ?self.timeout, "Execution timed out");
                    let progress = lock(&progress);
                    let position = progress.position(opportunity);
                    if position.open_quantity() > Decimal::ZERO {
                        let reason = format!("execution timed out after {:?}", self.timeout);
                        Err(unhedged(opportunity, position, progress.attempts, reason))
                    } else {
                        Err(ExecutionError::Timeout(self.timeout))
                    }
                }
            }
        };
        let (buy_trade, sell_trade, sell_attempts) = legs?;

        let report = build_report(
            opportunity,
            buy_trade,
            sell_trade,
            sell_attempts,
            started.elapsed(),
            self.dry_run,
        );

        info!(
            id = %opportunity.id,
            quantity = %report.quantity,
            gross_profit = %report.gross_profit,
            net_profit = %report.net_profit,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Execution completed"
        );
        Ok(report)
    }

    async fn venue(&self, name: &str) -> Result<Arc<dyn Exchange>, ExecutionError> {
        self.manager
            .get(name)
            .await
            .ok_or_else(|| ExecutionError::UnknownExchange(name.to_string()))
    }

    async fn run(
        &self,
        opportunity: &Opportunity,
        quantity: Decimal,
        progress: &Mutex<Progress>,
    ) -> Result<(Trade, Trade, u32), ExecutionError> {
        let buy_venue = self.venue(&opportunity.buy_exchange).await?;
        let sell_venue = self.venue(&opportunity.sell_exchange).await?;

        let buy_order = Order::limit(
            &opportunity.buy_exchange,
            &opportunity.pair,
            OrderSide::Buy,
            opportunity.buy_price,
            quantity,
        );
        let buy_trade = buy_venue
            .place_order(buy_order)
            .await
            .map_err(|source| ExecutionError::BuyFailed {
                exchange: opportunity.buy_exchange.clone(),
                source,
            })?;

        if !buy_trade.is_filled() {
            return Err(ExecutionError::NotFilled {
                exchange: opportunity.buy_exchange.clone(),
            });
        }
        if buy_trade.quantity < quantity {
            warn!(
                id = %opportunity.id,
                requested = %quantity,
                filled = %buy_trade.quantity,
                "Buy leg partially filled"
            );
        }
        lock(progress).buy = Some(buy_trade.clone());

        let (sell_trade, attempts) = self
            .sell_with_retry(sell_venue.as_ref(), opportunity, buy_trade.quantity, progress)
            .await?;
        Ok((buy_trade, sell_trade, attempts))
    }

    async fn sell_with_retry(
        &self,
        venue: &dyn Exchange,
        opportunity: &Opportunity,
        quantity: Decimal,
        progress: &Mutex<Progress>,
    ) -> Result<(Trade, u32), ExecutionError> {
        let mut remaining = quantity;
        let mut attempt = 0;

        while attempt < self.retry.max_attempts && remaining > Decimal::ZERO {
            if attempt > 0 {
                let delay = self.retry.delay(attempt);
                debug!(attempt, delay = ?delay, remaining = %remaining, "Retrying sell leg");
                sleep(delay).await;
            }
            attempt += 1;

            let order = Order::limit(
                &opportunity.sell_exchange,
                &opportunity.pair,
                OrderSide::Sell,
                opportunity.sell_price,
                remaining,
            );
            let outcome = venue.place_order(order).await;

            let mut progress = lock(progress);
            progress.attempts = attempt;
            match outcome {
                Ok(trade) if trade.is_filled() => {
                    remaining -= trade.quantity;
                    progress.sells.push(trade);
                }
                Ok(_) => {
                    progress.last_error = Some("sell order not filled".to_string());
                    warn!(attempt, exchange = %venue.name(), "Sell leg not filled");
                }
                Err(e) => {
                    warn!(attempt, exchange = %venue.name(), error = %e, "Sell leg failed");
                    progress.last_error = Some(e.to_string());
                }
            }
        }

        let mut progress = lock(progress);
        if remaining > Decimal::ZERO {
            let reason = progress
                .last_error
                .clone()
                .unwrap_or_else(|| "no fill".to_string());
            return Err(unhedged(opportunity, progress.position(opportunity), attempt, reason));
        }

        Ok((merge_fills(std::mem::take(&mut progress.sells)), attempt))
    }

    /// Fills both legs at the quoted prices without touching any venue.
    fn simulate(&self, opportunity: &Opportunity, quantity: Decimal) -> (Trade, Trade, u32) {
        let quantity = opportunity
            .max_quantity
            .map_or(quantity, |max| quantity.min(max));
        let buy = simulated_trade(opportunity, OrderSide::Buy, quantity, Fees::flat(opportunity.buy_fee));
        let sell = simulated_trade(opportunity, OrderSide::Sell, quantity, Fees::flat(opportunity.sell_fee));
        (buy, sell, 1)
    }
}

fn simulated_trade(opportunity: &Opportunity, side: OrderSide, quantity: Decimal, fees: Fees) -> Trade {
    let (exchange, price) = match side {
        OrderSide::Buy => (&opportunity.buy_exchange, opportunity.buy_price),
        OrderSide::Sell => (&opportunity.sell_exchange, opportunity.sell_price),
    };
    Trade {
        id: Uuid::new_v4().to_string(),
        order_id: format!("dry-run-{}", opportunity.id),
        exchange: exchange.clone(),
        pair: opportunity.pair.clone(),
        side,
        price,
        quantity,
        fee: fees.taker_cost(price * quantity),
        fee_currency: crate::exchanges::utils::quote_asset(&opportunity.pair).to_string(),
        status: OrderStatus::Filled,
        timestamp: Utc::now(),
    }
}

/// Combines partial fills into one trade priced at the volume-weighted average.
fn merge_fills(mut fills: Vec<Trade>) -> Trade {
    if fills.len() == 1 {
        return fills.remove(0);
    }

    let quantity: Decimal = fills.iter().map(|t| t.quantity).sum();
    let notional: Decimal = fills.iter().map(Trade::notional).sum();
    let fee: Decimal = fills.iter().map(|t| t.fee).sum();

    let mut merged = fills.remove(0);
    merged.price = notional / quantity;
    merged.quantity = quantity;
    merged.fee = fee;
    merged.status = OrderStatus::Filled;
    merged
}

fn build_report(
    opportunity: &Opportunity,
    buy_trade: Trade,
    sell_trade: Trade,
    sell_attempts: u32,
    elapsed: Duration,
    dry_run: bool,
) -> ExecutionReport {
    let cost = buy_trade.notional();
    let proceeds = sell_trade.notional();
    let gross_profit = proceeds - cost;

    ExecutionReport {
        opportunity_id: opportunity.id.clone(),
        pair: opportunity.pair.clone(),
        buy_exchange: opportunity.buy_exchange.clone(),
        sell_exchange: opportunity.sell_exchange.clone(),
        quantity: sell_trade.quantity,
        cost,
        proceeds,
        buy_fee: buy_trade.fee,
        sell_fee: sell_trade.fee,
        gross_profit,
        net_profit: gross_profit - buy_trade.fee - sell_trade.fee,
        buy_trade,
        sell_trade,
        sell_attempts,
        elapsed,
        dry_run,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OpportunityType;
    use crate::exchanges::mock::MockExchange;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn opportunity() -> Opportunity {
        let now = Utc::now();
        Opportunity {
            id: "opp-1".to_string(),
            opportunity_type: OpportunityType::CrossExchange,
            pair: "BTC/USD".to_string(),
            buy_exchange: "kraken".to_string(),
            sell_exchange: "binance".to_string(),
            buy_price: dec("100"),
            sell_price: dec("102"),
            buy_fee: dec("0.001"),
            sell_fee: dec("0.001"),
            gross_spread_percent: dec("2"),
            net_spread_percent: dec("1.79"),
            max_quantity: None,
            detected_at: now,
            expires_at: now + chrono::Duration::seconds(10),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    async fn venues() -> (Arc<Manager>, Arc<MockExchange>, Arc<MockExchange>) {
        let kraken = Arc::new(MockExchange::new("kraken").with_taker_fee(dec("0.001")));
        let binance = Arc::new(MockExchange::new("binance").with_taker_fee(dec("0.001")));
        let manager = Manager::new();
        manager.register(kraken.clone()).await;
        manager.register(binance.clone()).await;
        manager.connect_all().await.unwrap();
        (Arc::new(manager), kraken, binance)
    }

    #[tokio::test]
    async fn test_execute_both_legs() {
        let (manager, kraken, binance) = venues().await;
        let executor = Executor::new(manager, Duration::from_secs(1), fast_retry(), false);

        let report = executor.execute(&opportunity(), dec("2")).await.unwrap();

        assert_eq!(report.quantity, dec("2"));
        assert_eq!(report.cost, dec("200"));
        assert_eq!(report.proceeds, dec("204"));
        assert_eq!(report.gross_profit, dec("4"));
        assert_eq!(report.fees(), dec("0.404"));
        assert_eq!(report.net_profit, dec("3.596"));
        assert_eq!(report.sell_attempts, 1);
        assert!(!report.dry_run);

        let buys = kraken.orders();
        assert_eq!(buys.len(), 1);
        assert_eq!(buys[0].side, OrderSide::Buy);
        assert_eq!(buys[0].price, dec("100"));
        let sells = binance.orders();
        assert_eq!(sells.len(), 1);
        assert_eq!(sells[0].side, OrderSide::Sell);
    }

    #[tokio::test]
    async fn test_partial_fill_sells_filled_quantity() {
        let (manager, kraken, binance) = venues().await;
        kraken.set_fill_ratio(dec("0.25"));
        let executor = Executor::new(manager, Duration::from_secs(1), fast_retry(), false);

        let report = executor.execute(&opportunity(), dec("2")).await.unwrap();

        assert_eq!(report.quantity, dec("0.5"));
        assert_eq!(binance.orders()[0].quantity, dec("0.5"));
    }

    #[tokio::test]
    async fn test_zero_fill_is_not_filled() {
        let (manager, kraken, binance) = venues().await;
        kraken.set_fill_ratio(Decimal::ZERO);
        let executor = Executor::new(manager, Duration::from_secs(1), fast_retry(), false);

        let result = executor.execute(&opportunity(), dec("1")).await;

        assert!(matches!(result, Err(ExecutionError::NotFilled { .. })));
        assert!(binance.orders().is_empty());
    }

    #[tokio::test]
    async fn test_sell_retries_then_succeeds() {
        let (manager, _kraken, binance) = venues().await;
        binance.fail_next_orders(2);
        let executor = Executor::new(manager, Duration::from_secs(1), fast_retry(), false);

        let report = executor.execute(&opportunity(), dec("1")).await.unwrap();

        assert_eq!(report.sell_attempts, 3);
        assert_eq!(binance.orders().len(), 3);
    }

    #[tokio::test]
    async fn test_unhedged_after_retries() {
        let (manager, _kraken, binance) = venues().await;
        binance.fail_next_orders(10);
        let executor = Executor::new(manager, Duration::from_secs(1), fast_retry(), false);

        let result = executor.execute(&opportunity(), dec("1")).await;

        match result {
            Err(ExecutionError::Unhedged {
                open_quantity,
                attempts,
                position,
                ..
            }) => {
                assert_eq!(open_quantity, dec("1"));
                assert_eq!(attempts, 3);
                assert_eq!(position.bought, dec("1"));
                assert_eq!(position.cost, dec("100"));
                assert_eq!(position.buy_fee, dec("0.1"));
                assert_eq!(position.sold, Decimal::ZERO);
            }
            other => panic!("expected unhedged, got {:?}", other.map(|r| r.quantity)),
        }
    }

    #[tokio::test]
    async fn test_partial_sells_count_towards_open_quantity() {
        let (manager, _kraken, binance) = venues().await;
        binance.set_fill_ratio(dec("0.5"));
        let executor = Executor::new(manager, Duration::from_secs(1), fast_retry(), false);

        let result = executor.execute(&opportunity(), dec("4")).await;

        let sold: Vec<Decimal> = binance.orders().iter().map(|o| o.quantity).collect();
        assert_eq!(sold, vec![dec("4"), dec("2"), dec("1")]);
        assert!(matches!(
            result,
            Err(ExecutionError::Unhedged { open_quantity, .. }) if open_quantity == dec("0.5")
        ));
    }

    #[test]
    fn test_merge_fills_uses_average_price() {
        let fill = |price: &str, quantity: &str, fee: &str| Trade {
            id: Uuid::new_v4().to_string(),
            order_id: "o".to_string(),
            exchange: "binance".to_string(),
            pair: "BTC/USD".to_string(),
            side: OrderSide::Sell,
            price: dec(price),
            quantity: dec(quantity),
            fee: dec(fee),
            fee_currency: "USD".to_string(),
            status: OrderStatus::PartiallyFilled,
            timestamp: Utc::now(),
        };

        let merged = merge_fills(vec![fill("100", "1", "0.1"), fill("103", "2", "0.2")]);

        assert_eq!(merged.quantity, dec("3"));
        assert_eq!(merged.price, dec("102"));
        assert_eq!(merged.fee, dec("0.3"));
        assert_eq!(merged.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_expired_opportunity_rejected() {
        let (manager, kraken, _binance) = venues().await;
        let executor = Executor::new(manager, Duration::from_secs(1), fast_retry(), false);
        let mut opp = opportunity();
        opp.expires_at = Utc::now() - chrono::Duration::seconds(1);

        let result = executor.execute(&opp, dec("1")).await;

        assert!(matches!(result, Err(ExecutionError::Expired(_))));
        assert!(kraken.orders().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_exchange() {
        let executor = Executor::new(Arc::new(Manager::new()), Duration::from_secs(1), fast_retry(), false);
        let result = executor.execute(&opportunity(), dec("1")).await;
        assert!(matches!(result, Err(ExecutionError::UnknownExchange(_))));
    }

    #[tokio::test]
    async fn test_dry_run_sends_no_orders() {
        let (manager, kraken, binance) = venues().await;
        let executor = Executor::new(manager, Duration::from_secs(1), fast_retry(), true);
        let mut opp = opportunity();
        opp.max_quantity = Some(dec("0.5"));

        let report = executor.execute(&opp, dec("1")).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.quantity, dec("0.5"));
        assert_eq!(report.gross_profit, dec("1"));
        assert_eq!(report.buy_fee, dec("0.05"));
        assert_eq!(report.sell_trade.fee_currency, "USD");
        assert!(kraken.orders().is_empty());
        assert!(binance.orders().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_before_buy_fills() {
        let kraken = Arc::new(MockExchange::new("kraken").with_order_delay(Duration::from_millis(500)));
        let binance = Arc::new(MockExchange::new("binance"));
        let manager = Manager::new();
        manager.register(kraken).await;
        manager.register(binance.clone()).await;
        let executor = Executor::new(Arc::new(manager), Duration::from_millis(50), fast_retry(), false);

        let result = executor.execute(&opportunity(), dec("1")).await;

        assert!(matches!(result, Err(ExecutionError::Timeout(_))));
        assert!(binance.orders().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_during_sell_retries_is_unhedged() {
        let (manager, kraken, binance) = venues().await;
        binance.fail_next_orders(100);
        let slow_retry = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(100),
            multiplier: 1.0,
        };
        let executor = Executor::new(manager, Duration::from_millis(50), slow_retry, false);

        let result = executor.execute(&opportunity(), dec("1")).await;

        assert_eq!(kraken.orders().len(), 1);
        match result {
            Err(ExecutionError::Unhedged {
                exchange,
                open_quantity,
                attempts,
                reason,
                position,
            }) => {
                assert_eq!(exchange, "binance");
                assert_eq!(open_quantity, dec("1"));
                assert_eq!(attempts, 1);
                assert!(reason.contains("timed out"));
                assert_eq!(position.buy_exchange, "kraken");
                assert_eq!(position.cost, dec("100"));
                assert_eq!(position.buy_fee, dec("0.1"));
            }
            other => panic!("expected unhedged, got {:?}", other.map(|r| r.quantity)),
        }
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_sells() {
        let (manager, _kraken, binance) = venues().await;
        binance.set_fill_ratio(dec("0.5"));
        let slow_retry = RetryPolicy {
            max_attempts: 10,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(200),
            multiplier: 1.0,
        };
        let executor = Executor::new(manager, Duration::from_millis(50), slow_retry, false);

        let result = executor.execute(&opportunity(), dec("2")).await;

        match result {
            Err(ExecutionError::Unhedged { position, open_quantity, .. }) => {
                assert_eq!(open_quantity, dec("1"));
                assert_eq!(position.sold, dec("1"));
                assert_eq!(position.proceeds, dec("102"));
                assert_eq!(position.sell_fee, dec("0.102"));
            }
            other => panic!("expected unhedged, got {:?}", other.map(|r| r.quantity)),
        }
    }

    #[test]
    fn test_retry_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            multiplier: 2.0,
        };

        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(350));
    }

    #[test]
    fn test_retry_delay_caps_huge_multipliers() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            multiplier: 1e20,
        };
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(2));

        let nan = RetryPolicy {
            multiplier: f64::NAN,
            ..policy.clone()
        };
        assert_eq!(nan.delay(2), Duration::from_secs(2));

        let infinite = RetryPolicy {
            multiplier: f64::INFINITY,
            ..policy
        };
        assert_eq!(infinite.delay(3), Duration::from_secs(2));
    }

    #[test]
    fn test_from_config_defaults() {
        let executor = Executor::from_config(Arc::new(Manager::new()), None, true);
        assert_eq!(executor.timeout, DEFAULT_TIMEOUT);
        assert_eq!(executor.retry, RetryPolicy::default());
        assert!(executor.is_dry_run());
    }
}
