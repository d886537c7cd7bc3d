//! Arbitrage detection configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Arbitrage detection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ArbitrageConfig {
    /// Cross-exchange arbitrage detection (optional).
    pub cross_exchange: Option<CrossExchangeConfig>,
    /// Timeout for each poll-and-detect cycle (default: 30s).
    #[serde(default, with = "duration")]
    pub detection_timeout: Duration,
}

/// Cross-exchange arbitrage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CrossExchangeConfig {
    /// Minimum net spread in percent to trigger (e.g., "0.5" for 0.5%).
    pub min_spread_percent: Option<String>,
    /// Minimum base quantity worth trading (e.g., "0.0001").
    pub min_quantity: Option<String>,
    /// How long an opportunity is considered valid (default: 10s).
    #[serde(default, with = "duration")]
    pub opportunity_ttl: Duration,
}
