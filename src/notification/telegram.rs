use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::config;
use crate::notification::{Event, EventType, NotificationError, Notifier, format_event};

const TELEGRAM_API_URL: &str = "https://api.telegram.org/bot";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_MESSAGE_LENGTH: usize = 4096;
const ASYNC_QUEUE_SIZE: usize = 100;

/// Telegram notifier settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Token issued by BotFather.
    pub bot_token: String,
    pub chat_id: String,
    /// Separate chat for errors, falls back to `chat_id`.
    pub error_chat_id: Option<String>,
    pub notify_opportunities: bool,
    pub notify_executions: bool,
    pub notify_errors: bool,
    pub notify_overview: bool,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            error_chat_id: None,
            notify_opportunities: true,
            notify_executions: true,
            notify_errors: true,
            notify_overview: true,
        }
    }

    pub fn with_error_chat_id(mut self, chat_id: impl Into<String>) -> Self {
        self.error_chat_id = Some(chat_id.into());
        self
    }

    fn chat_for(&self, event_type: EventType) -> &str {
        match (event_type, &self.error_chat_id) {
            (EventType::Error, Some(chat_id)) => chat_id,
            _ => &self.chat_id,
        }
    }
}

impl From<&config::TelegramConfig> for TelegramConfig {
    fn from(cfg: &config::TelegramConfig) -> Self {
        let mut telegram = TelegramConfig::new(&cfg.bot_token, &cfg.chat_id);
        if !cfg.error_chat_id.is_empty() {
            telegram = telegram.with_error_chat_id(&cfg.error_chat_id);
        }
        telegram.notify_opportunities = cfg.notify_opportunities;
        telegram.notify_executions = cfg.notify_executions;
        telegram.notify_errors = cfg.notify_errors;
        telegram.notify_overview = cfg.notify_overview;
        telegram
    }
}

/// Sends events through the Telegram Bot API.
///
/// `send_async` hands events to a background worker over a bounded queue;
/// a full queue drops the event with an error log.
pub struct TelegramNotifier {
    config: TelegramConfig,
    http_client: reqwest::Client,
    api_url: String,
    sender: mpsc::Sender<Event>,
}

impl TelegramNotifier {
    /// Creates the notifier and spawns its worker. Must be called inside a
    /// tokio runtime.
    pub fn new(config: TelegramConfig) -> Result<Self, NotificationError> {
        if config.bot_token.is_empty() {
            return Err(NotificationError::new("bot_token is required"));
        }
        if config.chat_id.is_empty() {
            return Err(NotificationError::new("chat_id is required"));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::new(format!("Failed to create HTTP client: {}", e)))?;

        let api_url = format!("{}{}", TELEGRAM_API_URL, config.bot_token);
        let (sender, receiver) = mpsc::channel(ASYNC_QUEUE_SIZE);

        Self::spawn_worker(receiver, config.clone(), http_client.clone(), api_url.clone());

        Ok(Self {
            config,
            http_client,
            api_url,
            sender,
        })
    }

    fn spawn_worker(
        mut receiver: mpsc::Receiver<Event>,
        config: TelegramConfig,
        http_client: reqwest::Client,
        api_url: String,
    ) {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let text = format_event(&event);
                let chat_id = config.chat_for(event.event_type);
                if let Err(e) = send_message(&http_client, &api_url, chat_id, &text).await {
                    error!(error = %e, "Failed to send Telegram message");
                }
            }
            debug!("Telegram worker stopped");
        });
    }
}

async fn send_message(
    http_client: &reqwest::Client,
    api_url: &str,
    chat_id: &str,
    text: &str,
) -> Result<(), NotificationError> {
    let text = truncate(text, MAX_MESSAGE_LENGTH);
    let url = format!("{}/sendMessage", api_url);

    let payload = serde_json::json!({
        "chat_id": chat_id,
        "text": text,
        "parse_mode": "Markdown"
    });

    let response = http_client
        .post(&url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| NotificationError::new(format!("HTTP request failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(NotificationError::new(format!(
            "Telegram API error: {} - {}",
            status, body
        )));
    }

    Ok(())
}

/// Cuts `text` to at most `max` bytes without splitting a character.
pub(crate) fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        if !self.is_enabled(event.event_type) {
            return Ok(());
        }

        let text = format_event(event);
        send_message(
            &self.http_client,
            &self.api_url,
            self.config.chat_for(event.event_type),
            &text,
        )
        .await
    }

    fn send_async(&self, event: Event) {
        if !self.is_enabled(event.event_type) {
            return;
        }

        if let Err(e) = self.sender.try_send(event) {
            error!(error = %e, "Failed to queue Telegram message");
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        match event_type {
            EventType::Startup | EventType::Shutdown => true,
            EventType::Opportunity => self.config.notify_opportunities,
            EventType::Execution => self.config.notify_executions,
            EventType::Error => self.config.notify_errors,
            EventType::Overview => self.config.notify_overview,
        }
    }

    async fn close(&self) -> Result<(), NotificationError> {
        // Give the worker time to drain queued messages
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        // "€" is three bytes long
        assert_eq!(truncate("a€b", 2), "a");
        assert_eq!(truncate("a€b", 4), "a€");
    }

    #[test]
    fn test_error_chat_fallback() {
        let config = TelegramConfig::new("token", "main");
        assert_eq!(config.chat_for(EventType::Error), "main");

        let config = config.with_error_chat_id("errors");
        assert_eq!(config.chat_for(EventType::Error), "errors");
        assert_eq!(config.chat_for(EventType::Execution), "main");
    }

    #[test]
    fn test_from_settings() {
        let settings: config::TelegramConfig = serde_yaml::from_str(
            "enabled: true\nnotify_executions: true\nnotify_errors: true\n",
        )
        .unwrap();

        let telegram = TelegramConfig::from(&settings);
        assert!(telegram.error_chat_id.is_none());
        assert!(!telegram.notify_opportunities);
        assert!(telegram.notify_executions);
        assert!(!telegram.notify_overview);
    }

    #[tokio::test]
    async fn test_new_requires_credentials() {
        assert!(TelegramNotifier::new(TelegramConfig::new("", "chat")).is_err());
        assert!(TelegramNotifier::new(TelegramConfig::new("token", "")).is_err());
    }

    #[tokio::test]
    async fn test_is_enabled_follows_flags() {
        let mut config = TelegramConfig::new("token", "chat");
        config.notify_opportunities = false;
        let notifier = TelegramNotifier::new(config).unwrap();

        assert!(notifier.is_enabled(EventType::Startup));
        assert!(notifier.is_enabled(EventType::Shutdown));
        assert!(!notifier.is_enabled(EventType::Opportunity));
        assert!(notifier.is_enabled(EventType::Execution));
    }
}
