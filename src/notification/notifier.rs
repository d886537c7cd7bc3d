use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::exchanges::utils::base_asset;

/// Kind of notification event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// A spread above the threshold was detected.
    Opportunity,
    /// A trade finished, successfully or not.
    Execution,
    Error,
    Startup,
    Shutdown,
    /// Periodic statistics summary.
    Overview,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Opportunity => write!(f, "opportunity"),
            EventType::Execution => write!(f, "execution"),
            EventType::Error => write!(f, "error"),
            EventType::Startup => write!(f, "startup"),
            EventType::Shutdown => write!(f, "shutdown"),
            EventType::Overview => write!(f, "overview"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpportunityData {
    pub pair: String,
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub gross_spread_percent: Decimal,
    pub net_spread_percent: Decimal,
    /// Expected profit after fees for `quantity`.
    pub potential_profit: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone)]
pub struct ExecutionData {
    pub pair: String,
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub success: bool,
    pub dry_run: bool,
    pub quantity: Decimal,
    /// Profit after fees and taxes.
    pub net_profit: Decimal,
    pub taxes: Decimal,
    pub execution_time: Duration,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ErrorData {
    pub component: String,
    pub message: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StartupData {
    pub version: String,
    pub exchanges: Vec<String>,
    pub pairs: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct ShutdownData {
    pub reason: String,
    pub uptime: Duration,
    pub graceful: bool,
}

#[derive(Debug, Clone)]
pub struct OverviewData {
    pub uptime: Duration,
    pub detection_cycles: u64,
    pub opportunities_detected: u64,
    pub opportunities_executed: u64,
    pub successful_trades: u64,
    pub failed_trades: u64,
    pub total_profit: Decimal,
    pub total_cash: Decimal,
    pub fees_paid: Decimal,
    pub taxes_paid: Decimal,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub enum EventData {
    Opportunity(OpportunityData),
    Execution(ExecutionData),
    Error(ErrorData),
    Startup(StartupData),
    Shutdown(ShutdownData),
    Overview(OverviewData),
}

/// Notification event.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl Event {
    pub fn new(event_type: EventType, data: EventData) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn opportunity(data: OpportunityData) -> Self {
        Self::new(EventType::Opportunity, EventData::Opportunity(data))
    }

    pub fn execution(data: ExecutionData) -> Self {
        Self::new(EventType::Execution, EventData::Execution(data))
    }

    pub fn error(data: ErrorData) -> Self {
        Self::new(EventType::Error, EventData::Error(data))
    }

    pub fn startup(data: StartupData) -> Self {
        Self::new(EventType::Startup, EventData::Startup(data))
    }

    pub fn shutdown(data: ShutdownData) -> Self {
        Self::new(EventType::Shutdown, EventData::Shutdown(data))
    }

    pub fn overview(data: OverviewData) -> Self {
        Self::new(EventType::Overview, EventData::Overview(data))
    }
}

/// A channel that delivers events to the operator.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers the event and waits for the result.
    async fn send(&self, event: &Event) -> Result<(), NotificationError>;

    /// Queues the event without waiting.
    fn send_async(&self, event: Event);

    /// Returns true if events of this type should be delivered.
    fn is_enabled(&self, event_type: EventType) -> bool;

    /// Flushes pending events.
    async fn close(&self) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("notification error: {message}")]
pub struct NotificationError {
    pub message: String,
}

impl NotificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Fans events out to several notifiers.
pub struct MultiNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait::async_trait]
impl Notifier for MultiNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                if let Err(e) = notifier.send(event).await {
                    errors.push(e.message);
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }

    fn send_async(&self, event: Event) {
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                notifier.send_async(event.clone());
            }
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        self.notifiers.iter().any(|n| n.is_enabled(event_type))
    }

    async fn close(&self) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if let Err(e) = notifier.close().await {
                errors.push(e.message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }
}

/// Writes opportunities and errors to the log so they are visible without
/// any external channel configured. Executions are logged by the bot itself.
pub struct LogNotifier;

impl LogNotifier {
    fn log(event: &Event) {
        match &event.data {
            EventData::Opportunity(d) => info!(
                pair = %d.pair,
                buy_exchange = %d.buy_exchange,
                sell_exchange = %d.sell_exchange,
                buy_price = %d.buy_price,
                sell_price = %d.sell_price,
                net_spread = %d.net_spread_percent.round_dp(4),
                quantity = %d.quantity,
                "Arbitrage opportunity"
            ),
            EventData::Error(d) => warn!(
                component = %d.component,
                error = d.error.as_deref().unwrap_or(""),
                "{}",
                d.message
            ),
            _ => {}
        }
    }
}

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        Self::log(event);
        Ok(())
    }

    fn send_async(&self, event: Event) {
        Self::log(&event);
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        matches!(event_type, EventType::Opportunity | EventType::Error)
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

// === Message formatting ===

pub fn format_opportunity(data: &OpportunityData, at: DateTime<Utc>) -> String {
    format!(
        "🔔 *Arbitrage opportunity*\n\n\
         💰 Net spread: *{:.2}%* (gross {:.2}%)\n\
         📈 Potential profit: *${:.2}*\n\n\
         Pair: {} #{}\n\
         Buy: {} @ ${:.4}\n\
         Sell: {} @ ${:.4}\n\
         Quantity: {:.6} {}\n\n\
         ⏰ {}",
        data.net_spread_percent,
        data.gross_spread_percent,
        data.potential_profit,
        data.pair,
        format_pair_tag(&data.pair),
        data.buy_exchange,
        data.buy_price,
        data.sell_exchange,
        data.sell_price,
        data.quantity,
        base_asset(&data.pair),
        clock(at)
    )
}

pub fn format_execution(data: &ExecutionData, at: DateTime<Utc>) -> String {
    let mode = if data.dry_run { " (dry run)" } else { "" };

    if data.success {
        format!(
            "✅ *Trade executed*{}\n\n\
             Pair: {}\n\
             {} → {}\n\
             Quantity: {:.6}\n\
             Net profit: *${:.2}*\n\
             Taxes withheld: ${:.2}\n\
             Execution time: {}\n\n\
             ⏰ {}",
            mode,
            data.pair,
            data.buy_exchange,
            data.sell_exchange,
            data.quantity,
            data.net_profit,
            data.taxes,
            format_duration(data.execution_time),
            clock(at)
        )
    } else {
        format!(
            "❌ *Trade failed*{}\n\n\
             Pair: {}\n\
             {} → {}\n\
             Error: {}\n\
             Time: {}\n\n\
             ⏰ {}",
            mode,
            data.pair,
            data.buy_exchange,
            data.sell_exchange,
            data.error_message.as_deref().unwrap_or("unknown error"),
            format_duration(data.execution_time),
            clock(at)
        )
    }
}

pub fn format_error(data: &ErrorData, at: DateTime<Utc>) -> String {
    let error_str = data
        .error
        .as_ref()
        .map(|e| format!("\nError: {}", e))
        .unwrap_or_default();

    format!(
        "⚠️ *Error*\n\n\
         Component: {}\n\
         Message: {}{}\n\n\
         ⏰ {}",
        data.component,
        data.message,
        error_str,
        clock(at)
    )
}

pub fn format_startup(data: &StartupData, at: DateTime<Utc>) -> String {
    format!(
        "🤖 *Bot started*\n\n\
         Version: {}\n\
         Mode: {}\n\
         Exchanges: {}\n\
         Pairs: {}\n\n\
         ⏰ {}",
        data.version,
        mode_label(data.dry_run),
        data.exchanges.join(", "),
        data.pairs.join(", "),
        clock(at)
    )
}

pub fn format_shutdown(data: &ShutdownData, at: DateTime<Utc>) -> String {
    let status = if data.graceful {
        "✅ Graceful"
    } else {
        "⚠️ Forced"
    };

    format!(
        "🛑 *Bot stopped*\n\n\
         Reason: {}\n\
         Status: {}\n\
         Uptime: {}\n\n\
         ⏰ {}",
        data.reason,
        status,
        format_duration(data.uptime),
        clock(at)
    )
}

pub fn format_overview(data: &OverviewData, at: DateTime<Utc>) -> String {
    format!(
        "📊 *Trading overview* {}\n\n\
         ⏱ Uptime: {}\n\
         🔄 Detection cycles: {}\n\n\
         📈 Opportunities detected: {}\n\
         ✅ Trades executed: {}\n\
         ❌ Failed: {}\n\n\
         💰 Total profit: *${:.2}*\n\
         🏦 Capital: ${:.2}\n\
         💸 Fees: ${:.2} · Taxes: ${:.2}\n\n\
         ⏰ {}",
        mode_label(data.dry_run),
        format_duration(data.uptime),
        add_thousand_separators(data.detection_cycles),
        data.opportunities_detected,
        data.successful_trades,
        data.failed_trades,
        data.total_profit,
        data.total_cash,
        data.fees_paid,
        data.taxes_paid,
        clock(at)
    )
}

pub fn format_event(event: &Event) -> String {
    match &event.data {
        EventData::Opportunity(data) => format_opportunity(data, event.timestamp),
        EventData::Execution(data) => format_execution(data, event.timestamp),
        EventData::Error(data) => format_error(data, event.timestamp),
        EventData::Startup(data) => format_startup(data, event.timestamp),
        EventData::Shutdown(data) => format_shutdown(data, event.timestamp),
        EventData::Overview(data) => format_overview(data, event.timestamp),
    }
}

// === Helpers ===

fn clock(at: DateTime<Utc>) -> String {
    at.format("%H:%M:%S UTC").to_string()
}

fn mode_label(dry_run: bool) -> &'static str {
    if dry_run { "🧪 DRY RUN" } else { "🚀 LIVE" }
}

/// "BTC/USD" -> "BTC\_USD", escaped for Telegram Markdown.
fn format_pair_tag(pair: &str) -> String {
    pair.replace('/', "\\_")
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

fn add_thousand_separators(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
