//! Bot configuration.

use crate::config::Config;

/// Bot configuration options.
pub struct BotConfig {
    /// Application configuration.
    pub app_config: Config,
    /// Simulate fills instead of sending orders.
    pub dry_run: bool,
    /// Application version.
    pub version: String,
}

impl BotConfig {
    /// Dry run is on when either the flag or `app.dry_run` asks for it.
    pub fn new(app_config: Config, dry_run: bool) -> Self {
        let dry_run = dry_run || app_config.app.dry_run;
        Self {
            app_config,
            dry_run,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
