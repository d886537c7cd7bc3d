//! Random-walk price model backing a paper venue.

use std::collections::HashMap;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::domain::PriceQuote;

/// Resolution of a random step, in parts per million of the volatility.
const STEP_RESOLUTION: i64 = 1_000_000;

/// Decimal places kept on simulated prices.
const PRICE_DP: u32 = 8;

/// Per-pair mid prices that drift by a bounded random step on every quote.
pub struct PriceModel {
    rng: StdRng,
    mids: HashMap<String, Decimal>,
    half_spread: Decimal,
    bias: Decimal,
    volatility: Decimal,
    depth: Option<Decimal>,
}

impl PriceModel {
    pub fn new(
        mids: HashMap<String, Decimal>,
        half_spread: Decimal,
        bias: Decimal,
        volatility: Decimal,
        depth: Option<Decimal>,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            rng,
            mids,
            half_spread,
            bias,
            volatility,
            depth,
        }
    }

    /// Advances the pair's mid price one step and quotes around it.
    pub fn next_quote(&mut self, exchange: &str, pair: &str) -> Option<PriceQuote> {
        let volatility = self.volatility;
        let step = Decimal::new(
            self.rng.gen_range(-STEP_RESOLUTION..=STEP_RESOLUTION),
            6,
        ) * volatility;

        let mid = {
            let mid = self.mids.get_mut(pair)?;
            let moved = (*mid * (Decimal::ONE + step)).round_dp(PRICE_DP);
            if moved > Decimal::ZERO {
                *mid = moved;
            }
            *mid
        };

        Some(self.quote_around(exchange, pair, mid))
    }

    fn quote_around(&self, exchange: &str, pair: &str, mid: Decimal) -> PriceQuote {
        let biased = mid * (Decimal::ONE + self.bias);
        let bid = (biased * (Decimal::ONE - self.half_spread)).round_dp(PRICE_DP);
        let ask = (biased * (Decimal::ONE + self.half_spread)).round_dp(PRICE_DP);

        PriceQuote {
            exchange: exchange.to_string(),
            pair: pair.to_string(),
            bid,
            ask,
            bid_size: self.depth,
            ask_size: self.depth,
            last: Some(biased.round_dp(PRICE_DP)),
            timestamp: Utc::now(),
        }
    }
}
