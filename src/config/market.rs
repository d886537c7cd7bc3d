//! Market data polling configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// How often and how patiently venue quotes are fetched.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Interval between polling cycles (default: 60s).
    #[serde(default, with = "duration")]
    pub poll_interval: Duration,
    /// Timeout for a single quote request (default: 5s).
    #[serde(default, with = "duration")]
    pub quote_timeout: Duration,
    /// Quotes older than this are ignored (default: 30s).
    #[serde(default, with = "duration")]
    pub max_quote_age: Duration,
    /// Interval between "still running" log lines with the last prices (default: 15m).
    #[serde(default, with = "duration")]
    pub heartbeat_interval: Duration,
}
