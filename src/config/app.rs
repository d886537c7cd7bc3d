//! Application-level configuration.

use serde::Deserialize;

/// Application-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Application name used in logs and notifications.
    pub name: String,
    /// Environment: "development", "staging", or "production".
    pub env: String,
    /// Logging verbosity: "debug", "info", "warn", "error".
    pub log_level: Option<String>,
    /// Also write logs to this file, appending. Console output is kept.
    pub log_file: Option<String>,
    /// Detect and report opportunities without sending orders.
    #[serde(default)]
    pub dry_run: bool,
}
