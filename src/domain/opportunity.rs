//! Arbitrage opportunity domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Width of the time bucket used when fingerprinting opportunities.
const FINGERPRINT_WINDOW_SECS: i64 = 300;

/// OpportunityType indicates the type of arbitrage opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityType {
    /// Cross-exchange arbitrage between two different exchanges.
    CrossExchange,
}

impl fmt::Display for OpportunityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpportunityType::CrossExchange => write!(f, "cross_exchange"),
        }
    }
}

/// A directed trading route: buy `pair` on one exchange, sell it on another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub pair: String,
    pub buy_exchange: String,
    pub sell_exchange: String,
}

impl Route {
    pub fn new(
        pair: impl Into<String>,
        buy_exchange: impl Into<String>,
        sell_exchange: impl Into<String>,
    ) -> Self {
        Self {
            pair: pair.into(),
            buy_exchange: buy_exchange.into(),
            sell_exchange: sell_exchange.into(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}->{}",
            self.pair, self.buy_exchange, self.sell_exchange
        )
    }
}

/// Opportunity represents a detected arbitrage opportunity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    /// Unique identifier for this opportunity.
    pub id: String,
    #[serde(rename = "type")]
    pub opportunity_type: OpportunityType,
    /// Trading pair (e.g., "BTC/USD").
    pub pair: String,
    /// Exchange where to buy.
    pub buy_exchange: String,
    /// Exchange where to sell.
    pub sell_exchange: String,
    /// Ask price on the buy exchange.
    pub buy_price: Decimal,
    /// Bid price on the sell exchange.
    pub sell_price: Decimal,
    /// Taker fee on the buy exchange.
    pub buy_fee: Decimal,
    /// Taker fee on the sell exchange.
    pub sell_fee: Decimal,
    /// Price difference before fees, in percent of the buy price.
    pub gross_spread_percent: Decimal,
    /// Price difference after both taker fees, in percent of the buy cost.
    pub net_spread_percent: Decimal,
    /// Largest quantity both books can absorb at these prices, when known.
    pub max_quantity: Option<Decimal>,
    /// When this opportunity was detected.
    pub detected_at: DateTime<Utc>,
    /// When this opportunity is considered stale.
    pub expires_at: DateTime<Utc>,
}

impl Opportunity {
    /// Returns true if the opportunity has expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Returns true if the opportunity has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Returns true if the spread survives both taker fees.
    pub fn is_profitable(&self) -> bool {
        self.net_spread_percent > Decimal::ZERO
    }

    /// Returns the route this opportunity trades.
    pub fn route(&self) -> Route {
        Route::new(&self.pair, &self.buy_exchange, &self.sell_exchange)
    }

    /// Stable identity of "the same" opportunity seen on consecutive polls.
    ///
    /// Built from pair, exchanges, net spread rounded to 2 decimals and a
    /// 5-minute time bucket, so repeated detections inside the bucket share
    /// one fingerprint.
    pub fn fingerprint(&self) -> String {
        let spread_rounded = self.net_spread_percent.round_dp(2).normalize();
        let window = self.detected_at.timestamp().div_euclid(FINGERPRINT_WINDOW_SECS);

        let data = format!(
            "{}|{}|{}|{}|{}",
            self.pair, self.buy_exchange, self.sell_exchange, spread_rounded, window
        );

        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        let hash = hasher.finalize();

        // First 16 bytes are plenty for dedup
        hex::encode(&hash[..16])
    }
}
