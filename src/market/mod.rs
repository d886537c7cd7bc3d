//! Market data collection across venues.

mod book;
mod poller;

pub use book::PriceBook;
pub use poller::Poller;
