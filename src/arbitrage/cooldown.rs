//! Route-level cooldown.
//!
//! A route is blocked for `trade_interval` after every executed trade. A failed
//! execution blocks it with an escalating backoff: `failure_backoff`, then 5×,
//! 25×, ... capped at `max_backoff`. A successful trade resets the escalation.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::CooldownConfig;
use crate::domain::Route;

/// Escalation multiplier per consecutive failure.
const ESCALATION_FACTOR: u32 = 5;

const DEFAULT_TRADE_INTERVAL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_FAILURE_BACKOFF: Duration = Duration::from_secs(10);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30 * 60);

struct CooldownEntry {
    blocked_until: DateTime<Utc>,
    failure_count: u32,
}

/// Tracks which routes may trade again and when.
pub struct Cooldown {
    entries: HashMap<Route, CooldownEntry>,
    trade_interval: Duration,
    failure_backoff: Duration,
    max_backoff: Duration,
}

impl Cooldown {
    /// A zero `trade_interval` or `failure_backoff` disables that kind of cooldown.
    pub fn new(trade_interval: Duration, failure_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            trade_interval,
            failure_backoff,
            max_backoff,
        }
    }

    /// Builds a tracker from the `cooldown` section, falling back to defaults
    /// for the section or for an unset `max_backoff`.
    pub fn from_config(config: Option<&CooldownConfig>) -> Self {
        match config {
            Some(c) => Self::new(
                c.trade_interval,
                c.failure_backoff,
                if c.max_backoff.is_zero() {
                    DEFAULT_MAX_BACKOFF
                } else {
                    c.max_backoff
                },
            ),
            None => Self::new(DEFAULT_TRADE_INTERVAL, DEFAULT_FAILURE_BACKOFF, DEFAULT_MAX_BACKOFF),
        }
    }

    pub fn is_cooling_down(&self, route: &Route, now: DateTime<Utc>) -> bool {
        self.entries
            .get(route)
            .is_some_and(|entry| now < entry.blocked_until)
    }

    /// Time left until the route may trade again, if it is blocked.
    pub fn remaining(&self, route: &Route, now: DateTime<Utc>) -> Option<Duration> {
        let entry = self.entries.get(route)?;
        (entry.blocked_until - now).to_std().ok().filter(|d| !d.is_zero())
    }

    /// Blocks the route for the trade interval and clears its failure count.
    pub fn record_trade(&mut self, route: &Route, now: DateTime<Utc>) {
        if self.trade_interval.is_zero() {
            self.entries.remove(route);
            return;
        }

        let blocked_until = add(now, self.trade_interval);
        self.entries.insert(
            route.clone(),
            CooldownEntry {
                blocked_until,
                failure_count: 0,
            },
        );
        debug!(route = %route, until = %blocked_until, "Route cooling down after trade");
    }

    /// Blocks the route with an escalating backoff.
    pub fn record_failure(&mut self, route: &Route, now: DateTime<Utc>) {
        if self.failure_backoff.is_zero() {
            return;
        }

        let entry = self.entries.entry(route.clone()).or_insert(CooldownEntry {
            blocked_until: now,
            failure_count: 0,
        });
        entry.failure_count += 1;

        let escalation = ESCALATION_FACTOR.saturating_pow(entry.failure_count - 1);
        let backoff = self
            .failure_backoff
            .saturating_mul(escalation)
            .min(self.max_backoff);
        entry.blocked_until = add(now, backoff);

        debug!(
            route = %route,
            failures = entry.failure_count,
            backoff = ?backoff,
            "Route backing off after failure"
        );
    }

    /// Drops entries whose block has expired.
    pub fn cleanup(&mut self, now: DateTime<Utc>) {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now < entry.blocked_until);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "Route cooldown cleanup");
        }
    }

    /// Number of tracked routes, expired or not, since the last cleanup.
    pub fn active_count(&self) -> usize {
        self.entries.len()
    }
}

fn add(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
