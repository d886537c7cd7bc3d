//! Configuration loading and validation for the arbitrage bot.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides for notification credentials.

mod app;
mod arbitrage;
mod capital;
mod cooldown;
mod duration;
mod error;
mod exchange;
mod execution;
mod market;
mod notification;

pub use app::AppConfig;
pub use arbitrage::ArbitrageConfig;
pub use capital::CapitalConfig;
pub use cooldown::CooldownConfig;
pub use error::ConfigError;
pub use exchange::{ExchangeConfig, PaperConfig};
pub use execution::ExecutionConfig;
pub use market::MarketConfig;
pub use notification::{NotificationConfig, TelegramConfig};

use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::{collections::HashMap, env, fs};

use crate::exchanges::utils::split_pair;

/// Root configuration structure for the arbitrage bot.
///
/// Required sections: app, exchanges, pairs.
/// Optional sections: market, arbitrage, capital, cooldown, execution, notification.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Maps venue names to their configurations.
    pub exchanges: HashMap<String, ExchangeConfig>,
    /// Trading pairs to monitor (e.g., "BTC/USD").
    pub pairs: Vec<String>,
    /// Polling cadence and quote freshness (optional).
    pub market: Option<MarketConfig>,
    /// Arbitrage detection thresholds (optional).
    pub arbitrage: Option<ArbitrageConfig>,
    /// Trade sizing and reserves (optional).
    pub capital: Option<CapitalConfig>,
    /// Route pacing (optional).
    pub cooldown: Option<CooldownConfig>,
    /// Order execution timeouts and retries (optional).
    pub execution: Option<ExecutionConfig>,
    /// Alert channels like Telegram (optional).
    pub notification: Option<NotificationConfig>,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// First loads environment variables from `.env` file (if exists),
    /// then loads YAML config and credentials from environment variables:
    /// `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`, `TELEGRAM_ERROR_CHAT_ID`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        config.load_credentials_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Names of enabled venues, sorted for stable output.
    pub fn enabled_exchanges(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .exchanges
            .iter()
            .filter(|(_, ex)| ex.enabled)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Load credentials from environment variables.
    fn load_credentials_from_env(&mut self) {
        if let Some(ref mut notification) = self.notification {
            if let Some(ref mut telegram) = notification.telegram {
                if telegram.enabled {
                    telegram.bot_token = env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
                    telegram.chat_id = env::var("TELEGRAM_CHAT_ID").unwrap_or_default();
                    telegram.error_chat_id = env::var("TELEGRAM_ERROR_CHAT_ID").unwrap_or_default();
                }
            }
        }
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        if self.pairs.is_empty() {
            return Err(ConfigError::Validation(
                "at least one trading pair is required".into(),
            ));
        }

        for pair in &self.pairs {
            if split_pair(pair).is_none() {
                return Err(ConfigError::Validation(format!(
                    "pair {} must be in BASE/QUOTE format",
                    pair
                )));
            }
        }

        let mut enabled_exchanges = 0;
        for (name, exchange) in &self.exchanges {
            if !exchange.enabled {
                continue;
            }
            enabled_exchanges += 1;

            if exchange.kind != "paper" {
                return Err(ConfigError::Validation(format!(
                    "exchange {}: unsupported kind {}",
                    name, exchange.kind
                )));
            }

            let fee_field = format!("exchanges.{}.fee_taker", name);
            let fee = match exchange.fee_taker {
                Some(ref raw) => parse_decimal(&fee_field, raw)?,
                None => {
                    return Err(ConfigError::Validation(format!(
                        "exchange {}: fee_taker is required",
                        name
                    )));
                }
            };
            check_fraction(&fee_field, fee)?;

            if let Some(ref raw) = exchange.fee_maker {
                let field = format!("exchanges.{}.fee_maker", name);
                check_fraction(&field, parse_decimal(&field, raw)?)?;
            }

            if let Some(ref paper) = exchange.paper {
                for (pair, raw) in &paper.prices {
                    let field = format!("exchanges.{}.paper.prices.{}", name, pair);
                    if parse_decimal(&field, raw)? <= Decimal::ZERO {
                        return Err(ConfigError::Validation(format!(
                            "{} must be positive",
                            field
                        )));
                    }
                }
                for (currency, raw) in &paper.balances {
                    let field = format!("exchanges.{}.paper.balances.{}", name, currency);
                    parse_decimal(&field, raw)?;
                }
            }
        }

        if enabled_exchanges < 2 {
            return Err(ConfigError::Validation(
                "at least two exchanges must be enabled".into(),
            ));
        }

        if let Some(ref arbitrage) = self.arbitrage {
            if let Some(ref cross) = arbitrage.cross_exchange {
                if let Some(ref raw) = cross.min_spread_percent {
                    let field = "arbitrage.cross_exchange.min_spread_percent";
                    if parse_decimal(field, raw)? < Decimal::ZERO {
                        return Err(ConfigError::Validation(format!(
                            "{} must not be negative",
                            field
                        )));
                    }
                }
                if let Some(ref raw) = cross.min_quantity {
                    parse_decimal("arbitrage.cross_exchange.min_quantity", raw)?;
                }
            }
        }

        if let Some(ref capital) = self.capital {
            if let Some(ref raw) = capital.initial_capital {
                if parse_decimal("capital.initial_capital", raw)? <= Decimal::ZERO {
                    return Err(ConfigError::Validation(
                        "capital.initial_capital must be positive".into(),
                    ));
                }
            }

            let fractions = [
                ("capital.principal_fraction", &capital.principal_fraction),
                ("capital.profit_fraction", &capital.profit_fraction),
                ("capital.cash_reserve_fraction", &capital.cash_reserve_fraction),
                ("capital.tax_rate", &capital.tax_rate),
            ];
            for (field, value) in fractions {
                if let Some(raw) = value {
                    check_fraction(field, parse_decimal(field, raw)?)?;
                }
            }

            if let Some(ref raw) = capital.min_trade_value {
                parse_decimal("capital.min_trade_value", raw)?;
            }
        }

        if let Some(ref execution) = self.execution {
            if let Some(ref retry) = execution.retry {
                if let Some(max_attempts) = retry.max_attempts {
                    if max_attempts <= 0 {
                        return Err(ConfigError::Validation(
                            "execution.retry.max_attempts must be positive".into(),
                        ));
                    }
                }
                if let Some(multiplier) = retry.multiplier {
                    if !multiplier.is_finite() || multiplier < 1.0 {
                        return Err(ConfigError::Validation(
                            "execution.retry.multiplier must be finite and at least 1".into(),
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Parses a decimal string, naming the offending field on failure.
pub(crate) fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(raw.trim()).map_err(|_| ConfigError::InvalidDecimal {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

/// Returns the parsed value, or the default when the field is absent or unparsable.
pub(crate) fn decimal_or(raw: Option<&String>, default: Decimal) -> Decimal {
    raw.and_then(|s| Decimal::from_str(s.trim()).ok())
        .unwrap_or(default)
}

fn check_fraction(field: &str, value: Decimal) -> Result<(), ConfigError> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(ConfigError::Validation(format!(
            "{} must be between 0 and 1",
            field
        )));
    }
    Ok(())
}
