//! Top-of-book price quotes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Best bid and ask for a pair on one exchange at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// The exchange name this quote belongs to.
    pub exchange: String,
    /// The trading pair in "BASE/QUOTE" format (e.g., "BTC/USD").
    pub pair: String,
    /// Highest price a buyer is currently paying.
    pub bid: Decimal,
    /// Lowest price a seller is currently asking.
    pub ask: Decimal,
    /// Base quantity available at the bid, if the venue reports it.
    pub bid_size: Option<Decimal>,
    /// Base quantity available at the ask, if the venue reports it.
    pub ask_size: Option<Decimal>,
    /// Last traded price, if known.
    pub last: Option<Decimal>,
    /// When the quote was captured.
    pub timestamp: DateTime<Utc>,
}

impl PriceQuote {
    /// Returns the midpoint between bid and ask.
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    /// Returns the absolute spread between ask and bid.
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }

    /// A quote is tradable only when both sides are positive and not crossed.
    pub fn is_valid(&self) -> bool {
        self.bid > Decimal::ZERO && self.ask > Decimal::ZERO && self.bid <= self.ask
    }

    /// Returns true if the quote is older than `max_age` at `now`.
    /// A zero `max_age` disables the check.
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        if max_age.is_zero() {
            return false;
        }
        let age = now.signed_duration_since(self.timestamp);
        age.to_std().map(|age| age > max_age).unwrap_or(false)
    }
}
