//! Operator notifications: event model, channels and message formatting.

mod notifier;
mod telegram;

pub use notifier::{
    ErrorData, Event, EventType, ExecutionData, LogNotifier, MultiNotifier,
    NotificationError, Notifier, OpportunityData, OverviewData, ShutdownData,
    StartupData, format_event,
};
pub use telegram::{TelegramConfig, TelegramNotifier};
