//! Cross-exchange opportunity detection.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use super::cooldown::Cooldown;
use super::profit::{gross_spread_percent, net_spread_percent};
use crate::config::{ArbitrageConfig, decimal_or};
use crate::domain::{Fees, Opportunity, OpportunityType, PriceQuote, Route};
use crate::market::PriceBook;

const DEFAULT_MIN_SPREAD_PERCENT: &str = "0.5";
const DEFAULT_OPPORTUNITY_TTL: Duration = Duration::from_secs(10);

/// Finds pairs that can be bought on one venue and sold on another for
/// more than the configured net spread.
pub struct Detector {
    min_spread_percent: Decimal,
    min_quantity: Option<Decimal>,
    opportunity_ttl: Duration,
}

impl Detector {
    pub fn new(
        min_spread_percent: Decimal,
        min_quantity: Option<Decimal>,
        opportunity_ttl: Duration,
    ) -> Self {
        Self {
            min_spread_percent,
            min_quantity,
            opportunity_ttl,
        }
    }

    pub fn from_config(config: Option<&ArbitrageConfig>) -> Self {
        let default_spread = Decimal::from_str(DEFAULT_MIN_SPREAD_PERCENT).unwrap_or_default();
        let Some(cross) = config.and_then(|c| c.cross_exchange.as_ref()) else {
            return Self::new(default_spread, None, DEFAULT_OPPORTUNITY_TTL);
        };

        Self::new(
            decimal_or(cross.min_spread_percent.as_ref(), default_spread),
            cross
                .min_quantity
                .as_ref()
                .and_then(|q| Decimal::from_str(q.trim()).ok()),
            if cross.opportunity_ttl.is_zero() {
                DEFAULT_OPPORTUNITY_TTL
            } else {
                cross.opportunity_ttl
            },
        )
    }

    pub fn min_spread_percent(&self) -> Decimal {
        self.min_spread_percent
    }

    /// Scans every ordered pair of venues quoting the same pair.
    ///
    /// `fees` holds taker fees by venue, then by pair. Routes in cooldown are skipped. Results are sorted best first by net
    /// spread, then gross spread.
    pub fn detect(
        &self,
        book: &PriceBook,
        fees: &HashMap<String, HashMap<String, Fees>>,
        cooldown: &Cooldown,
        now: DateTime<Utc>,
    ) -> Vec<Opportunity> {
        let mut opportunities = Vec::new();

        for pair in book.pairs() {
            let quotes = book.quotes_for_pair(pair);
            for buy in &quotes {
                for sell in &quotes {
                    if buy.exchange == sell.exchange {
                        continue;
                    }

                    let route = Route::new(pair, &buy.exchange, &sell.exchange);
                    if cooldown.is_cooling_down(&route, now) {
                        debug!(route = %route, "Skipping route in cooldown");
                        continue;
                    }

                    if let Some(opportunity) = self.evaluate(buy, sell, fees, now) {
                        opportunities.push(opportunity);
                    }
                }
            }
        }

        opportunities.sort_by(|a, b| {
            b.net_spread_percent
                .cmp(&a.net_spread_percent)
                .then_with(|| b.gross_spread_percent.cmp(&a.gross_spread_percent))
        });
        opportunities
    }

    fn evaluate(
        &self,
        buy: &PriceQuote,
        sell: &PriceQuote,
        fees: &HashMap<String, HashMap<String, Fees>>,
        now: DateTime<Utc>,
    ) -> Option<Opportunity> {
        let gross = gross_spread_percent(buy.ask, sell.bid);
        if gross <= Decimal::ZERO {
            return None;
        }

        let buy_fee = taker_fee(fees, buy);
        let sell_fee = taker_fee(fees, sell);
        let net = net_spread_percent(buy.ask, sell.bid, buy_fee, sell_fee);

        if net <= self.min_spread_percent {
            debug!(
                pair = %buy.pair,
                buy_exchange = %buy.exchange,
                sell_exchange = %sell.exchange,
                gross = %gross.round_dp(4),
                net = %net.round_dp(4),
                "Spread below threshold"
            );
            return None;
        }

        let max_quantity = match (buy.ask_size, sell.bid_size) {
            (Some(ask), Some(bid)) => Some(ask.min(bid)),
            _ => None,
        };
        if let (Some(max), Some(min)) = (max_quantity, self.min_quantity) {
            if max < min {
                return None;
            }
        }

        let ttl = chrono::Duration::from_std(self.opportunity_ttl).unwrap_or_else(|_| chrono::Duration::zero());

        Some(Opportunity {
            id: Uuid::new_v4().to_string(),
            opportunity_type: OpportunityType::CrossExchange,
            pair: buy.pair.clone(),
            buy_exchange: buy.exchange.clone(),
            sell_exchange: sell.exchange.clone(),
            buy_price: buy.ask,
            sell_price: sell.bid,
            buy_fee,
            sell_fee,
            gross_spread_percent: gross,
            net_spread_percent: net,
            max_quantity,
            detected_at: now,
            expires_at: now + ttl,
        })
    }
}

fn taker_fee(fees: &HashMap<String, HashMap<String, Fees>>, quote: &PriceQuote) -> Decimal {
    fees.get(&quote.exchange)
        .and_then(|pairs| pairs.get(&quote.pair))
        .copied()
        .unwrap_or_default()
        .taker
}
