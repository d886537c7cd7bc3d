//! Cross-exchange arbitrage: detection, sizing, execution and pacing.

mod allocator;
mod cooldown;
mod detector;
mod executor;
pub mod profit;

pub use allocator::Allocator;
pub use cooldown::Cooldown;
pub use detector::Detector;
pub use executor::{ExecutionError, ExecutionReport, Executor, OpenPosition};
