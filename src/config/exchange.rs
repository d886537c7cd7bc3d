//! Exchange (venue) configuration.

use serde::Deserialize;
use std::collections::HashMap;

/// Settings for a single venue.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Whether this venue should be used.
    #[serde(default)]
    pub enabled: bool,
    /// Implementation backing the venue. Only "paper" is available.
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Taker fee as a decimal string (e.g., "0.001" for 0.1%).
    pub fee_taker: Option<String>,
    /// Maker fee as a decimal string; defaults to the taker fee.
    pub fee_maker: Option<String>,
    /// Maximum API requests per minute.
    pub rate_limit: Option<i32>,
    /// Simulated market settings for paper venues.
    pub paper: Option<PaperConfig>,
}

/// Simulated market settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaperConfig {
    /// Reference mid price per pair (e.g., "BTC/USD": "60000").
    #[serde(default)]
    pub prices: HashMap<String, String>,
    /// Half of the bid/ask spread as a fraction of mid (default: "0.0005").
    pub half_spread: Option<String>,
    /// Constant premium (or discount if negative) applied to every mid price.
    pub price_bias: Option<String>,
    /// Largest fractional mid move between two quotes (default: "0.001").
    pub volatility: Option<String>,
    /// Base quantity available at the top of each side of the book.
    pub depth: Option<String>,
    /// Starting balances. When empty, fills are not limited by balance.
    #[serde(default)]
    pub balances: HashMap<String, String>,
    /// Seed for the price random walk; entropy when absent.
    pub seed: Option<u64>,
}

fn default_kind() -> String {
    "paper".to_string()
}
