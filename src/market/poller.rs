use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{debug, warn};

use super::PriceBook;
use crate::domain::PriceQuote;
use crate::exchanges::{Exchange, Manager};

/// Fetches top-of-book quotes for the tracked pairs from every connected venue.
pub struct Poller {
    manager: Arc<Manager>,
    pairs: Vec<String>,
    quote_timeout: Duration,
    max_quote_age: Duration,
}

impl Poller {
    pub fn new(
        manager: Arc<Manager>,
        pairs: Vec<String>,
        quote_timeout: Duration,
        max_quote_age: Duration,
    ) -> Self {
        Self {
            manager,
            pairs,
            quote_timeout,
            max_quote_age,
        }
    }

    /// Collects one round of quotes. Venues are queried concurrently and a
    /// failing request only drops that venue's pair from the book.
    pub async fn poll(&self) -> PriceBook {
        let venues: Vec<Arc<dyn Exchange>> = self
            .manager
            .all()
            .await
            .into_iter()
            .filter(|e| e.is_connected())
            .collect();

        let results = join_all(venues.iter().map(|e| self.poll_exchange(e.as_ref()))).await;

        let mut book = PriceBook::new();
        for quote in results.into_iter().flatten() {
            book.insert(quote);
        }

        debug!(
            exchanges = book.exchanges().len(),
            quotes = book.len(),
            "Polled market data"
        );
        book
    }

    async fn poll_exchange(&self, exchange: &dyn Exchange) -> Vec<PriceQuote> {
        let supported = exchange.supported_pairs();
        let pairs = self.pairs.iter().filter(|p| supported.contains(p));

        join_all(pairs.map(|pair| self.fetch_quote(exchange, pair)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn fetch_quote(&self, exchange: &dyn Exchange, pair: &str) -> Option<PriceQuote> {
        let quote = match tokio::time::timeout(self.quote_timeout, exchange.get_quote(pair)).await {
            Ok(Ok(quote)) => quote,
            Ok(Err(e)) => {
                warn!(exchange = %exchange.name(), pair = %pair, error = %e, "Failed to fetch quote");
                return None;
            }
            Err(_) => {
                warn!(
                    exchange = %exchange.name(),
                    pair = %pair,
                    timeout = ?self.quote_timeout,
                    "Quote request timed out"
                );
                return None;
            }
        };

        if !quote.is_valid() {
            debug!(
                exchange = %exchange.name(),
                pair = %pair,
                bid = %quote.bid,
                ask = %quote.ask,
                "Skipping unusable quote"
            );
            return None;
        }

        if quote.is_stale(self.max_quote_age, Utc::now()) {
            debug!(
                exchange = %exchange.name(),
                pair = %pair,
                timestamp = %quote.timestamp,
                "Skipping stale quote"
            );
            return None;
        }

        Some(quote)
    }
}
