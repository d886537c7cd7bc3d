//! Exchange integration abstractions and implementations.

mod manager;
pub mod paper;
pub mod utils;

#[cfg(test)]
pub(crate) mod mock;

use crate::domain::{Fees, Order, PriceQuote, Trade};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

pub use manager::Manager;
pub use paper::PaperExchange;

/// Exchange errors.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Trading pair is not supported by this exchange.
    #[error("pair {0} is not supported")]
    PairNotSupported(String),

    /// Insufficient funds for the operation.
    #[error("insufficient {currency}: need {required}, have {available}")]
    InsufficientFunds {
        currency: String,
        required: Decimal,
        available: Decimal,
    },

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Request budget for the current window is spent.
    #[error("rate limit exceeded: {current}/{limit} per minute")]
    RateLimited { current: u32, limit: u32 },

    /// API error from the exchange.
    #[error("API error: {0}")]
    Api(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for exchange operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Exchange trait defines the interface every trading venue implements.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Establishes the connection to the venue. Safe to call repeatedly.
    async fn connect(&self) -> Result<()>;

    /// Closes the connection. Safe to call multiple times.
    async fn disconnect(&self) -> Result<()>;

    /// Returns true if the connection is active and healthy.
    fn is_connected(&self) -> bool;

    /// Fetches the current best bid and ask for a "BASE/QUOTE" pair.
    /// Returns `PairNotSupported` if the pair is not listed on this venue.
    async fn get_quote(&self, pair: &str) -> Result<PriceQuote>;

    /// Submits an immediate-or-cancel order.
    /// The returned trade carries the executed quantity, which is zero when
    /// the limit price did not cross the book.
    /// Returns `InsufficientFunds` if the balance cannot cover the fill.
    async fn place_order(&self, order: Order) -> Result<Trade>;

    /// Returns available balances keyed by asset symbol (e.g., "BTC", "USD").
    /// Only positive balances are included.
    async fn get_balances(&self) -> Result<HashMap<String, Decimal>>;

    /// Returns the maker and taker fees for a trading pair.
    fn get_fees(&self, pair: &str) -> Fees;

    /// Unique identifier of this exchange (e.g., "kraken").
    fn name(&self) -> &str;

    /// Trading pairs available on this exchange, in "BASE/QUOTE" format.
    fn supported_pairs(&self) -> Vec<String>;
}
