use std::collections::HashMap;

use crate::domain::PriceQuote;

/// Quotes collected in one polling cycle, keyed by exchange then pair.
#[derive(Debug, Clone, Default)]
pub struct PriceBook {
    quotes: HashMap<String, HashMap<String, PriceQuote>>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a quote, replacing any earlier quote for the same venue and pair.
    pub fn insert(&mut self, quote: PriceQuote) {
        self.quotes
            .entry(quote.exchange.clone())
            .or_default()
            .insert(quote.pair.clone(), quote);
    }

    pub fn get(&self, exchange: &str, pair: &str) -> Option<&PriceQuote> {
        self.quotes.get(exchange).and_then(|pairs| pairs.get(pair))
    }

    /// Exchanges with at least one quote, sorted.
    pub fn exchanges(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.quotes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// All quotes for `pair`, sorted by exchange name.
    pub fn quotes_for_pair(&self, pair: &str) -> Vec<&PriceQuote> {
        let mut quotes: Vec<&PriceQuote> = self
            .quotes
            .values()
            .filter_map(|pairs| pairs.get(pair))
            .collect();
        quotes.sort_by(|a, b| a.exchange.cmp(&b.exchange));
        quotes
    }

    /// Pairs quoted on at least one exchange, sorted.
    pub fn pairs(&self) -> Vec<&str> {
        let mut pairs: Vec<&str> = self
            .quotes
            .values()
            .flat_map(|p| p.keys().map(String::as_str))
            .collect();
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }

    /// Total number of quotes.
    pub fn len(&self) -> usize {
        self.quotes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
