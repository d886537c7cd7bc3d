//! Route cooldown configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Pacing between trades on the same (pair, buy venue, sell venue) route.
#[derive(Debug, Clone, Deserialize)]
pub struct CooldownConfig {
    /// Minimum interval between consecutive trades on a route (0 disables).
    #[serde(default, with = "duration")]
    pub trade_interval: Duration,
    /// Suppression after the first failed execution, escalated on repeats (0 disables).
    #[serde(default, with = "duration")]
    pub failure_backoff: Duration,
    /// Upper bound for escalated failure suppression (default: 30m).
    #[serde(default, with = "duration")]
    pub max_backoff: Duration,
}
