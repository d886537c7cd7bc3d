use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use super::{PriceModel, RateLimiter};
use crate::config::{ExchangeConfig, PaperConfig, decimal_or, parse_decimal};
use crate::domain::{Fees, Order, OrderSide, OrderStatus, PriceQuote, Trade};
use crate::exchanges::utils::split_pair;
use crate::exchanges::{Exchange, ExchangeError, Result};

const DEFAULT_HALF_SPREAD: Decimal = Decimal::from_parts(5, 0, 0, false, 4);
const DEFAULT_VOLATILITY: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

struct PaperState {
    model: PriceModel,
    /// Quotes fixed by the operator; served instead of the random walk.
    pinned: HashMap<String, PriceQuote>,
    /// Last quote served per pair. Orders fill against it.
    last: HashMap<String, PriceQuote>,
    /// `None` when balances are not tracked.
    balances: Option<HashMap<String, Decimal>>,
}

/// In-process venue that quotes a simulated market and fills
/// immediate-or-cancel orders against its last quote.
pub struct PaperExchange {
    name: String,
    fees: Fees,
    pairs: Vec<String>,
    limiter: RateLimiter,
    connected: AtomicBool,
    state: Mutex<PaperState>,
}

impl PaperExchange {
    /// Builds a paper venue from its configuration.
    ///
    /// Only tracked pairs with a configured reference price are listed.
    pub fn from_config(name: &str, config: &ExchangeConfig, pairs: &[String]) -> Result<Self> {
        let field = |f: &str| format!("exchanges.{}.{}", name, f);
        let parse = |f: &str, raw: &str| {
            parse_decimal(&field(f), raw).map_err(|e| ExchangeError::Internal(e.to_string()))
        };

        let taker = match config.fee_taker {
            Some(ref raw) => parse("fee_taker", raw)?,
            None => Decimal::ZERO,
        };
        let maker = decimal_or(config.fee_maker.as_ref(), taker);

        let paper = config.paper.clone().unwrap_or_default();
        let mids = Self::reference_prices(&paper, pairs, &parse)?;

        let mut supported: Vec<String> = mids.keys().cloned().collect();
        supported.sort();

        let balances = if paper.balances.is_empty() {
            None
        } else {
            let mut parsed = HashMap::new();
            for (currency, raw) in &paper.balances {
                parsed.insert(currency.clone(), parse("paper.balances", raw)?);
            }
            Some(parsed)
        };

        let model = PriceModel::new(
            mids,
            decimal_or(paper.half_spread.as_ref(), DEFAULT_HALF_SPREAD),
            decimal_or(paper.price_bias.as_ref(), Decimal::ZERO),
            decimal_or(paper.volatility.as_ref(), DEFAULT_VOLATILITY),
            match paper.depth {
                Some(ref raw) => Some(parse("paper.depth", raw)?),
                None => None,
            },
            paper.seed,
        );

        let limit = config.rate_limit.unwrap_or(0).max(0) as u32;

        Ok(Self {
            name: name.to_string(),
            fees: Fees::new(maker, taker),
            pairs: supported,
            limiter: RateLimiter::new(limit),
            connected: AtomicBool::new(false),
            state: Mutex::new(PaperState {
                model,
                pinned: HashMap::new(),
                last: HashMap::new(),
                balances,
            }),
        })
    }

    fn reference_prices<F>(
        paper: &PaperConfig,
        pairs: &[String],
        parse: &F,
    ) -> Result<HashMap<String, Decimal>>
    where
        F: Fn(&str, &str) -> Result<Decimal>,
    {
        let mut mids = HashMap::new();
        for pair in pairs {
            if let Some(raw) = paper.prices.get(pair) {
                mids.insert(pair.clone(), parse("paper.prices", raw)?);
            }
        }
        Ok(mids)
    }

    /// Pins the quote for a pair until it is pinned again.
    pub fn set_quote(&self, pair: &str, bid: Decimal, ask: Decimal, size: Option<Decimal>) -> Result<()> {
        let quote = PriceQuote {
            exchange: self.name.clone(),
            pair: pair.to_string(),
            bid,
            ask,
            bid_size: size,
            ask_size: size,
            last: None,
            timestamp: Utc::now(),
        };
        let mut state = self.lock()?;
        state.last.insert(pair.to_string(), quote.clone());
        state.pinned.insert(pair.to_string(), quote);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, PaperState>> {
        self.state
            .lock()
            .map_err(|_| ExchangeError::Internal(format!("{} state lock poisoned", self.name)))
    }

    fn ensure_ready(&self, pair: &str) -> Result<()> {
        if !self.is_connected() {
            return Err(ExchangeError::Connection(format!("{} is not connected", self.name)));
        }
        if !self.pairs.iter().any(|p| p == pair) {
            return Err(ExchangeError::PairNotSupported(pair.to_string()));
        }
        self.limiter.acquire()
    }

    fn next_quote(&self, state: &mut PaperState, pair: &str) -> Result<PriceQuote> {
        let quote = match state.pinned.get(pair) {
            Some(pinned) => PriceQuote {
                timestamp: Utc::now(),
                ..pinned.clone()
            },
            None => state
                .model
                .next_quote(&self.name, pair)
                .ok_or_else(|| ExchangeError::PairNotSupported(pair.to_string()))?,
        };
        state.last.insert(pair.to_string(), quote.clone());
        Ok(quote)
    }
}

/// Moves funds for a fill, failing without changes if the paying side is short.
fn apply_fill(
    balances: &mut HashMap<String, Decimal>,
    side: OrderSide,
    base: &str,
    quote: &str,
    quantity: Decimal,
    notional: Decimal,
    fee: Decimal,
) -> Result<()> {
    let (pay_currency, pay, receive_currency, receive) = match side {
        OrderSide::Buy => (quote, notional + fee, base, quantity),
        OrderSide::Sell => (base, quantity, quote, notional - fee),
    };

    let available = balances.get(pay_currency).copied().unwrap_or_default();
    if available < pay {
        return Err(ExchangeError::InsufficientFunds {
            currency: pay_currency.to_string(),
            required: pay,
            available,
        });
    }

    balances.insert(pay_currency.to_string(), available - pay);
    *balances.entry(receive_currency.to_string()).or_default() += receive;
    Ok(())
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        info!(exchange = %self.name, pairs = ?self.pairs, "connected to paper venue");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        debug!(exchange = %self.name, "disconnected from paper venue");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_quote(&self, pair: &str) -> Result<PriceQuote> {
        self.ensure_ready(pair)?;
        let mut state = self.lock()?;
        self.next_quote(&mut state, pair)
    }

    async fn place_order(&self, order: Order) -> Result<Trade> {
        self.ensure_ready(&order.pair)?;
        let (base, quote_currency) = split_pair(&order.pair)
            .ok_or_else(|| ExchangeError::PairNotSupported(order.pair.clone()))?;

        let mut state = self.lock()?;
        let cached = state.last.get(&order.pair).cloned();
        let book = match cached {
            Some(q) => q,
            None => self.next_quote(&mut state, &order.pair)?,
        };

        let (crosses, price, size) = match order.side {
            OrderSide::Buy => (order.price >= book.ask, book.ask, book.ask_size),
            OrderSide::Sell => (order.price <= book.bid, book.bid, book.bid_size),
        };

        let quantity = if crosses {
            size.map_or(order.quantity, |s| order.quantity.min(s))
        } else {
            Decimal::ZERO
        };
        let notional = price * quantity;
        let fee = self.fees.taker_cost(notional);

        if quantity > Decimal::ZERO {
            if let Some(ref mut balances) = state.balances {
                apply_fill(balances, order.side, base, quote_currency, quantity, notional, fee)?;
            }
        }

        let status = if quantity.is_zero() {
            OrderStatus::Cancelled
        } else if quantity < order.quantity {
            OrderStatus::PartiallyFilled
        } else {
            OrderStatus::Filled
        };

        debug!(
            exchange = %self.name,
            pair = %order.pair,
            side = %order.side,
            limit = %order.price,
            price = %price,
            quantity = %quantity,
            "paper order executed"
        );

        Ok(Trade {
            id: Uuid::new_v4().to_string(),
            order_id: order.id,
            exchange: self.name.clone(),
            pair: order.pair.clone(),
            side: order.side,
            price,
            quantity,
            fee,
            fee_currency: quote_currency.to_string(),
            status,
            timestamp: Utc::now(),
        })
    }

    async fn get_balances(&self) -> Result<HashMap<String, Decimal>> {
        let state = self.lock()?;
        Ok(state
            .balances
            .as_ref()
            .map(|b| {
                b.iter()
                    .filter(|(_, amount)| **amount > Decimal::ZERO)
                    .map(|(c, a)| (c.clone(), *a))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_fees(&self, _pair: &str) -> Fees {
        self.fees
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supported_pairs(&self) -> Vec<String> {
        self.pairs.clone()
    }
}
