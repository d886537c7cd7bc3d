//! Common utilities for working with "BASE/QUOTE" pair strings.

/// Splits "BTC/USD" into ("BTC", "USD").
/// Returns None unless there is exactly one slash with text on both sides.
pub fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let (base, quote) = pair.split_once('/')?;
    if base.is_empty() || quote.is_empty() || quote.contains('/') {
        return None;
    }
    Some((base, quote))
}

/// Returns the base asset ("BTC" for "BTC/USD"), or the whole string if malformed.
pub fn base_asset(pair: &str) -> &str {
    split_pair(pair).map(|(base, _)| base).unwrap_or(pair)
}

/// Returns the quote asset ("USD" for "BTC/USD"), or the whole string if malformed.
pub fn quote_asset(pair: &str) -> &str {
    split_pair(pair).map(|(_, quote)| quote).unwrap_or(pair)
}
