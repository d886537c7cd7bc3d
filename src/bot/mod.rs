//! Main arbitrage bot implementation.
//!
//! Coordinates all components: venues, poller, detector, executor, cooldowns,
//! capital allocation and notifications.

mod config;
mod error;
mod stats;

pub use config::BotConfig;
pub use error::BotError;
pub use stats::Stats;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::time::{MissedTickBehavior, interval, interval_at};
use tracing::{debug, info, warn};

use crate::arbitrage::{Allocator, Cooldown, Detector, ExecutionError, ExecutionReport, Executor};
use crate::config::Config;
use crate::domain::{Fees, Opportunity};
use crate::exchanges::Manager;
use crate::market::{PriceBook, Poller};
use crate::notification::{
    ErrorData, Event, ExecutionData, LogNotifier, MultiNotifier, Notifier, OpportunityData,
    OverviewData, ShutdownData, StartupData, TelegramConfig, TelegramNotifier,
};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_QUOTE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_QUOTE_AGE: Duration = Duration::from_secs(30);
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15 * 60);
const DEFAULT_OVERVIEW_INTERVAL: Duration = Duration::from_secs(3600);
const DEFAULT_DETECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// How long an opportunity fingerprint is remembered for deduplication.
const NOTIFIED_RETENTION_SECS: i64 = 600;

/// Main arbitrage bot that coordinates all components.
pub struct Bot {
    cfg: Config,
    manager: Arc<Manager>,
    poller: Poller,
    detector: Detector,
    executor: Executor,
    cooldown: Mutex<Cooldown>,
    allocator: Mutex<Allocator>,
    notifier: Arc<dyn Notifier>,

    // Intervals and timeouts
    poll_interval: Duration,
    heartbeat_interval: Duration,
    overview_interval: Duration,
    detection_timeout: Duration,

    // Runtime state
    version: String,
    dry_run: bool,
    started_at: Mutex<Option<Instant>>,
    running: Mutex<bool>,
    shutdown: watch::Sender<bool>,
    stats: Mutex<Stats>,
    last_prices: Mutex<PriceBook>,
    notified: Mutex<HashMap<String, DateTime<Utc>>>,

    // Execution lock - prevents parallel executions for the same pair
    executing_pairs: RwLock<HashSet<String>>,
}

impl Bot {
    /// Creates a bot with venues built from the configuration.
    pub async fn new(cfg: BotConfig) -> Result<Self, BotError> {
        let manager = Arc::new(Manager::from_config(&cfg.app_config).await?);
        Ok(Self::with_manager(cfg, manager))
    }

    /// Loads the YAML configuration at `path` and creates a bot from it.
    pub async fn from_config_path(path: &str, dry_run: bool) -> Result<Self, BotError> {
        let config = Config::load(path)?;
        Self::new(BotConfig::new(config, dry_run)).await
    }

    /// Creates a bot around an already populated venue manager.
    pub fn with_manager(cfg: BotConfig, manager: Arc<Manager>) -> Self {
        let app = cfg.app_config;
        let non_zero = |d: Duration, default: Duration| if d.is_zero() { default } else { d };

        let market = app.market.as_ref();
        let poll_interval = non_zero(
            market.map(|m| m.poll_interval).unwrap_or_default(),
            DEFAULT_POLL_INTERVAL,
        );
        let heartbeat_interval = non_zero(
            market.map(|m| m.heartbeat_interval).unwrap_or_default(),
            DEFAULT_HEARTBEAT_INTERVAL,
        );
        let quote_timeout = non_zero(
            market.map(|m| m.quote_timeout).unwrap_or_default(),
            DEFAULT_QUOTE_TIMEOUT,
        );
        let max_quote_age = non_zero(
            market.map(|m| m.max_quote_age).unwrap_or_default(),
            DEFAULT_MAX_QUOTE_AGE,
        );
        let detection_timeout = non_zero(
            app.arbitrage
                .as_ref()
                .map(|a| a.detection_timeout)
                .unwrap_or_default(),
            DEFAULT_DETECTION_TIMEOUT,
        );
        let overview_interval = non_zero(
            app.notification
                .as_ref()
                .and_then(|n| n.telegram.as_ref())
                .map(|t| t.overview_interval)
                .unwrap_or_default(),
            DEFAULT_OVERVIEW_INTERVAL,
        );

        let venues = app.enabled_exchanges();
        let (shutdown, _) = watch::channel(false);

        Bot {
            poller: Poller::new(
                Arc::clone(&manager),
                app.pairs.clone(),
                quote_timeout,
                max_quote_age,
            ),
            detector: Detector::from_config(app.arbitrage.as_ref()),
            executor: Executor::from_config(Arc::clone(&manager), app.execution.as_ref(), cfg.dry_run),
            cooldown: Mutex::new(Cooldown::from_config(app.cooldown.as_ref())),
            allocator: Mutex::new(Allocator::from_config(app.capital.as_ref(), &venues)),
            notifier: build_notifier(&app),
            manager,
            poll_interval,
            heartbeat_interval,
            overview_interval,
            detection_timeout,
            version: cfg.version,
            dry_run: cfg.dry_run,
            started_at: Mutex::new(None),
            running: Mutex::new(false),
            shutdown,
            stats: Mutex::new(Stats::default()),
            last_prices: Mutex::new(PriceBook::new()),
            notified: Mutex::new(HashMap::new()),
            executing_pairs: RwLock::new(HashSet::new()),
            cfg: app,
        }
    }

    /// Connects the venues and runs the polling loop until `stop` is called.
    pub async fn start(&self) -> Result<(), BotError> {
        {
            let mut running = self.running.lock().await;
            if *running {
                return Err(BotError::AlreadyRunning);
            }
            *running = true;
        }
        self.shutdown.send_replace(false);

        {
            let mut started_at = self.started_at.lock().await;
            *started_at = Some(Instant::now());
        }

        if let Err(e) = self.manager.connect_all().await {
            *self.running.lock().await = false;
            return Err(e.into());
        }
        self.manager.log_balances().await;

        let exchanges = self.manager.list().await;

        info!(
            version = %self.version,
            dry_run = self.dry_run,
            exchanges = ?exchanges,
            pairs = ?self.cfg.pairs,
            min_spread_percent = %self.detector.min_spread_percent(),
            "Starting arbitrage bot"
        );

        self.send_notification(Event::startup(StartupData {
            version: self.version.clone(),
            exchanges,
            pairs: self.cfg.pairs.clone(),
            dry_run: self.dry_run,
        }))
        .await;

        self.run_main_loop().await
    }

    /// Gracefully stops the bot. Calling it again is a no-op.
    pub async fn stop(&self) -> Result<(), BotError> {
        {
            let mut running = self.running.lock().await;
            if !*running {
                return Ok(());
            }
            *running = false;
        }
        self.shutdown.send_replace(true);

        info!("Stopping bot...");

        if let Err(e) = self.manager.disconnect_all().await {
            warn!(error = %e, "Failed to disconnect exchanges");
        }

        let uptime = self.uptime().await;

        self.send_notification(Event::shutdown(ShutdownData {
            reason: "graceful shutdown".to_string(),
            uptime,
            graceful: true,
        }))
        .await;

        if let Err(e) = self.notifier.close().await {
            debug!(error = %e, "Failed to close notifier");
        }

        let stats = self.stats().await;
        let total_cash = self.allocator.lock().await.total_cash();
        info!(
            uptime = ?uptime,
            cycles = stats.detection_cycles,
            trades = stats.successful_trades,
            success_rate = ?stats.success_rate(),
            total_profit = %stats.total_profit.round_dp(2),
            total_cash = %total_cash.round_dp(2),
            "Bot stopped"
        );

        Ok(())
    }

    /// Returns a copy of the current statistics.
    pub async fn stats(&self) -> Stats {
        self.stats.lock().await.clone()
    }

    /// Returns a snapshot of the portfolio.
    pub async fn portfolio(&self) -> Allocator {
        self.allocator.lock().await.clone()
    }

    /// Returns true if the bot is currently running.
    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    /// Returns how long the bot has been running.
    pub async fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .await
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// Main polling, detection and execution loop.
    async fn run_main_loop(&self) -> Result<(), BotError> {
        let mut poll_timer = interval(self.poll_interval);
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let start = tokio::time::Instant::now();
        let mut overview_timer = interval_at(start + self.overview_interval, self.overview_interval);
        let mut heartbeat_timer =
            interval_at(start + self.heartbeat_interval, self.heartbeat_interval);
        let mut shutdown = self.shutdown.subscribe();

        info!(
            poll_interval = ?self.poll_interval,
            heartbeat_interval = ?self.heartbeat_interval,
            overview_interval = ?self.overview_interval,
            detection_timeout = ?self.detection_timeout,
            "Starting main detection loop"
        );

        loop {
            tokio::select! {
                _ = poll_timer.tick() => {
                    if !self.is_running().await {
                        break;
                    }
                    self.run_cycle().await;
                }
                _ = overview_timer.tick() => {
                    if !self.is_running().await {
                        break;
                    }
                    self.send_overview().await;
                }
                _ = heartbeat_timer.tick() => {
                    self.log_heartbeat().await;
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Runs one poll-detect-execute cycle.
    ///
    /// Opportunities are tried best first and the cycle ends after the first
    /// successful trade.
    pub(crate) async fn run_cycle(&self) -> Option<ExecutionReport> {
        let cycles = {
            let mut stats = self.stats.lock().await;
            stats.detection_cycles += 1;
            stats.detection_cycles
        };

        let now = Utc::now();
        let opportunities = match tokio::time::timeout(self.detection_timeout, self.detect(now)).await
        {
            Ok(opportunities) => opportunities,
            Err(_) => {
                warn!(cycle = cycles, timeout = ?self.detection_timeout, "Detection cycle timed out");
                return None;
            }
        };

        if opportunities.is_empty() {
            debug!(cycle = cycles, "No arbitrage opportunities");
            return None;
        }

        self.stats.lock().await.opportunities_detected += opportunities.len() as u64;
        info!(cycle = cycles, count = opportunities.len(), "Arbitrage opportunities detected");

        for opportunity in &opportunities {
            let quantity = self.allocator.lock().await.size(opportunity);
            self.notify_opportunity(opportunity, quantity.unwrap_or_default())
                .await;

            let Some(quantity) = quantity else {
                debug!(route = %opportunity.route(), "Trade value below minimum, skipping");
                continue;
            };

            if !self.try_lock_pair(&opportunity.pair).await {
                debug!(pair = %opportunity.pair, "Pair is already executing, skipping");
                continue;
            }
            let result = self.executor.execute(opportunity, quantity).await;
            self.unlock_pair(&opportunity.pair).await;

            match result {
                Ok(report) => {
                    self.handle_success(opportunity, &report).await;
                    return Some(report);
                }
                Err(e) => self.handle_failure(opportunity, quantity, e).await,
            }
        }

        None
    }

    /// Polls the venues and returns opportunities on routes that are not cooling down.
    async fn detect(&self, now: DateTime<Utc>) -> Vec<Opportunity> {
        let book = self.poller.poll().await;
        let fees = self.venue_fees().await;

        let opportunities = {
            let mut cooldown = self.cooldown.lock().await;
            cooldown.cleanup(now);
            self.detector.detect(&book, &fees, &cooldown, now)
        };

        let retention = chrono::Duration::seconds(NOTIFIED_RETENTION_SECS);
        self.notified
            .lock()
            .await
            .retain(|_, seen_at| now - *seen_at < retention);

        *self.last_prices.lock().await = book;
        opportunities
    }

    /// Fees per venue and tracked pair.
    async fn venue_fees(&self) -> HashMap<String, HashMap<String, Fees>> {
        self.manager
            .all()
            .await
            .iter()
            .map(|exchange| {
                let fees = self
                    .cfg
                    .pairs
                    .iter()
                    .map(|pair| (pair.clone(), exchange.get_fees(pair)))
                    .collect();
                (exchange.name().to_string(), fees)
            })
            .collect()
    }

    async fn handle_success(&self, opportunity: &Opportunity, report: &ExecutionReport) {
        let settlement = self.allocator.lock().await.settle(report);
        self.cooldown
            .lock()
            .await
            .record_trade(&opportunity.route(), Utc::now());
        self.stats
            .lock()
            .await
            .record_success(settlement.net_profit, report.cost);

        info!(
            route = %opportunity.route(),
            quantity = %report.quantity,
            buy_price = %report.buy_trade.price,
            sell_price = %report.sell_trade.price,
            fees = %settlement.fees.round_dp(4),
            taxes = %settlement.taxes.round_dp(4),
            net_profit = %settlement.net_profit.round_dp(4),
            total_cash = %settlement.total_cash.round_dp(2),
            dry_run = report.dry_run,
            "Arbitrage executed"
        );

        self.notify_async(Event::execution(ExecutionData {
            pair: report.pair.clone(),
            buy_exchange: report.buy_exchange.clone(),
            sell_exchange: report.sell_exchange.clone(),
            success: true,
            dry_run: report.dry_run,
            quantity: report.quantity,
            net_profit: settlement.net_profit,
            taxes: settlement.taxes,
            execution_time: report.elapsed,
            error_message: None,
        }));
    }

    async fn handle_failure(&self, opportunity: &Opportunity, quantity: Decimal, error: ExecutionError) {
        if let ExecutionError::Expired(_) = error {
            debug!(route = %opportunity.route(), "Opportunity expired before execution");
            return;
        }

        self.cooldown
            .lock()
            .await
            .record_failure(&opportunity.route(), Utc::now());
        self.stats.lock().await.record_failure();

        warn!(route = %opportunity.route(), error = %error, "Arbitrage execution failed");

        if let ExecutionError::Unhedged { position, .. } = &error {
            self.allocator.lock().await.book_open_position(position);
            self.notify_async(Event::error(ErrorData {
                component: "executor".to_string(),
                message: format!("open position on {}", opportunity.route()),
                error: Some(error.to_string()),
            }));
        }

        self.notify_async(Event::execution(ExecutionData {
            pair: opportunity.pair.clone(),
            buy_exchange: opportunity.buy_exchange.clone(),
            sell_exchange: opportunity.sell_exchange.clone(),
            success: false,
            dry_run: self.dry_run,
            quantity,
            net_profit: Decimal::ZERO,
            taxes: Decimal::ZERO,
            execution_time: Duration::ZERO,
            error_message: Some(error.to_string()),
        }));
    }

    /// Announces an opportunity once per fingerprint.
    async fn notify_opportunity(&self, opportunity: &Opportunity, quantity: Decimal) {
        {
            let mut notified = self.notified.lock().await;
            let fingerprint = opportunity.fingerprint();
            if notified.contains_key(&fingerprint) {
                return;
            }
            notified.insert(fingerprint, opportunity.detected_at);
        }

        let potential_profit = quantity * opportunity.buy_price * opportunity.net_spread_percent
            / Decimal::ONE_HUNDRED;

        self.notify_async(Event::opportunity(OpportunityData {
            pair: opportunity.pair.clone(),
            buy_exchange: opportunity.buy_exchange.clone(),
            sell_exchange: opportunity.sell_exchange.clone(),
            buy_price: opportunity.buy_price,
            sell_price: opportunity.sell_price,
            gross_spread_percent: opportunity.gross_spread_percent,
            net_spread_percent: opportunity.net_spread_percent,
            potential_profit,
            quantity,
        }));
    }

    /// Logs the last polled prices so a quiet bot still shows signs of life.
    async fn log_heartbeat(&self) {
        let stats = self.stats().await;
        let uptime = self.uptime().await;
        info!(
            uptime = ?uptime,
            cycles = stats.detection_cycles,
            trades = stats.successful_trades,
            "Still running"
        );

        let mut status: Vec<_> = self.manager.status().await.into_iter().collect();
        status.sort();
        for (exchange, connected) in status {
            if !connected {
                warn!(exchange = %exchange, "Exchange disconnected");
            }
        }

        let book = self.last_prices.lock().await;
        for pair in book.pairs() {
            for quote in book.quotes_for_pair(pair) {
                info!(
                    exchange = %quote.exchange,
                    pair = %quote.pair,
                    bid = %quote.bid,
                    ask = %quote.ask,
                    mid = %quote.mid(),
                    spread = %quote.spread(),
                    "Last price"
                );
            }
        }
    }

    /// Attempts to acquire a lock for executing trades on the given pair.
    pub async fn try_lock_pair(&self, pair: &str) -> bool {
        let mut pairs = self.executing_pairs.write().await;
        if pairs.contains(pair) {
            return false;
        }
        pairs.insert(pair.to_string());
        true
    }

    /// Releases the execution lock for the given pair.
    pub async fn unlock_pair(&self, pair: &str) {
        let mut pairs = self.executing_pairs.write().await;
        pairs.remove(pair);
    }

    /// Sends a notification and waits for delivery.
    async fn send_notification(&self, event: Event) {
        if !self.notifier.is_enabled(event.event_type) {
            return;
        }
        if let Err(e) = self.notifier.send(&event).await {
            debug!(
                event_type = %event.event_type,
                error = %e,
                "Failed to send notification"
            );
        }
    }

    /// Queues a notification without blocking the trading loop.
    fn notify_async(&self, event: Event) {
        if self.notifier.is_enabled(event.event_type) {
            self.notifier.send_async(event);
        }
    }

    /// Sends a periodic overview notification with current stats.
    async fn send_overview(&self) {
        let stats = self.stats().await;
        let uptime = self.uptime().await;
        let portfolio = self.portfolio().await;

        self.send_notification(Event::overview(OverviewData {
            uptime,
            detection_cycles: stats.detection_cycles,
            opportunities_detected: stats.opportunities_detected,
            opportunities_executed: stats.opportunities_executed,
            successful_trades: stats.successful_trades,
            failed_trades: stats.failed_trades,
            total_profit: stats.total_profit,
            total_cash: portfolio.total_cash(),
            fees_paid: portfolio.fees_paid(),
            taxes_paid: portfolio.taxes_paid(),
            dry_run: self.dry_run,
        }))
        .await;
    }
}

/// Trade events always go to the log; Telegram is added when configured.
fn build_notifier(cfg: &Config) -> Arc<dyn Notifier> {
    let telegram = cfg
        .notification
        .as_ref()
        .and_then(|n| n.telegram.as_ref())
        .filter(|t| t.enabled);

    let Some(telegram) = telegram else {
        return Arc::new(LogNotifier);
    };

    if !telegram.is_configured() {
        warn!("Telegram is enabled but TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID is not set");
        return Arc::new(LogNotifier);
    }

    match TelegramNotifier::new(TelegramConfig::from(telegram)) {
        Ok(notifier) => {
            info!("Telegram notifier created");
            let notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier), Arc::new(notifier)];
            Arc::new(MultiNotifier::new(notifiers))
        }
        Err(e) => {
            warn!(error = %e, "Failed to create Telegram notifier");
            Arc::new(LogNotifier)
        }
    }
}
