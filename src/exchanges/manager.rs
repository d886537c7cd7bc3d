//! Registry of the venues the bot trades on.

use super::{Exchange, ExchangeError, PaperExchange, Result};
use crate::config::{Config, ExchangeConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Manager owns the venue connections, keyed by venue name.
pub struct Manager {
    exchanges: Arc<RwLock<HashMap<String, Arc<dyn Exchange>>>>,
}

impl Manager {
    /// Creates an empty Manager.
    pub fn new() -> Self {
        Self {
            exchanges: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Builds a Manager with one venue per enabled exchange entry.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let manager = Self::new();

        for (name, exchange_config) in &config.exchanges {
            if !exchange_config.enabled {
                info!(exchange = %name, "Skipping disabled exchange");
                continue;
            }

            let exchange = Self::create_exchange(name, exchange_config, &config.pairs)?;
            manager.register(exchange).await;
        }

        Ok(manager)
    }

    fn create_exchange(
        name: &str,
        config: &ExchangeConfig,
        pairs: &[String],
    ) -> Result<Arc<dyn Exchange>> {
        match config.kind.as_str() {
            "paper" => Ok(Arc::new(PaperExchange::from_config(name, config, pairs)?)),
            other => Err(ExchangeError::Internal(format!(
                "exchange {}: unknown kind {}",
                name, other
            ))),
        }
    }

    /// Registers a venue, replacing any venue with the same name.
    pub async fn register(&self, exchange: Arc<dyn Exchange>) {
        let name = exchange.name().to_string();
        info!(exchange = %name, pairs = ?exchange.supported_pairs(), "Registering exchange");
        self.exchanges.write().await.insert(name, exchange);
    }

    /// Removes a venue by name.
    pub async fn unregister(&self, name: &str) -> Result<()> {
        if self.exchanges.write().await.remove(name).is_some() {
            info!(exchange = %name, "Unregistered exchange");
            Ok(())
        } else {
            warn!(exchange = %name, "Attempted to unregister unknown exchange");
            Err(ExchangeError::Internal(format!("exchange {} not found", name)))
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn Exchange>> {
        self.exchanges.read().await.get(name).cloned()
    }

    /// Registered venue names, sorted.
    pub async fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.exchanges.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// All registered venues, sorted by name.
    pub async fn all(&self) -> Vec<Arc<dyn Exchange>> {
        let exchanges = self.exchanges.read().await;
        let mut all: Vec<Arc<dyn Exchange>> = exchanges.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Connects every venue, stopping at the first failure.
    pub async fn connect_all(&self) -> Result<()> {
        for exchange in self.all().await {
            info!(exchange = %exchange.name(), "Connecting to exchange");
            if let Err(e) = exchange.connect().await {
                error!(exchange = %exchange.name(), error = %e, "Failed to connect to exchange");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Disconnects every venue. Failures are logged and skipped.
    pub async fn disconnect_all(&self) -> Result<()> {
        for exchange in self.all().await {
            info!(exchange = %exchange.name(), "Disconnecting from exchange");
            if let Err(e) = exchange.disconnect().await {
                error!(exchange = %exchange.name(), error = %e, "Failed to disconnect from exchange");
            }
        }
        Ok(())
    }

    /// Connection state per venue.
    pub async fn status(&self) -> HashMap<String, bool> {
        self.exchanges
            .read()
            .await
            .iter()
            .map(|(name, exchange)| (name.clone(), exchange.is_connected()))
            .collect()
    }

    /// Logs the balances held on every venue.
    pub async fn log_balances(&self) {
        for exchange in self.all().await {
            match exchange.get_balances().await {
                Ok(balances) if balances.is_empty() => {
                    info!(exchange = %exchange.name(), "No tracked balances");
                }
                Ok(balances) => {
                    let mut currencies: Vec<_> = balances.into_iter().collect();
                    currencies.sort_by(|a, b| a.0.cmp(&b.0));
                    for (currency, amount) in currencies {
                        info!(exchange = %exchange.name(), currency = %currency, amount = %amount, "Balance");
                    }
                }
                Err(e) => {
                    warn!(exchange = %exchange.name(), error = %e, "Failed to fetch balances");
                }
            }
        }
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
