//! Simulated paper-trading venue.

mod exchange;
mod limiter;
mod market;

pub use exchange::PaperExchange;
pub use limiter::RateLimiter;
pub use market::PriceModel;
