//! Domain models shared by the poller, detector, executor and allocator.

mod fees;
mod opportunity;
mod order;
mod quote;

pub use fees::Fees;
pub use opportunity::{Opportunity, OpportunityType, Route};
pub use order::{Order, OrderSide, OrderStatus, Trade};
pub use quote::PriceQuote;
