//! Capital allocation configuration.

use serde::Deserialize;

/// Trade sizing and reserve settings.
///
/// All fractions are decimal strings between 0 and 1.
#[derive(Debug, Clone, Deserialize)]
pub struct CapitalConfig {
    /// Starting capital in quote currency, split evenly across venues (default: "10000").
    pub initial_capital: Option<String>,
    /// Share of principal committed to one trade (default: 1/6).
    pub principal_fraction: Option<String>,
    /// Share of accumulated profit added to each trade (default: "0.5").
    pub profit_fraction: Option<String>,
    /// Share of each venue's cash that is never deployed (default: 1/3).
    pub cash_reserve_fraction: Option<String>,
    /// Trades smaller than this quote value are skipped (default: "10").
    pub min_trade_value: Option<String>,
    /// Tax withheld from positive trade profit (default: "0.275").
    pub tax_rate: Option<String>,
    /// Redistribute cash evenly across venues after every trade (default: true).
    #[serde(default = "default_true")]
    pub rebalance_after_trade: bool,
}

fn default_true() -> bool {
    true
}
