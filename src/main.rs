mod arbitrage;
mod bot;
mod config;
mod domain;
mod exchanges;
mod market;
mod notification;

use std::env;
use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{Level, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use arbitrage::{Allocator, Detector, profit};
use bot::Bot;
use config::{Config, decimal_or};

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";
const DEFAULT_PROJECTION_PERIODS: u32 = 12;

fn parse_config_path() -> String {
    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

/// `--projection` or `--projection=<trades>`, capped at `MAX_PROJECTION_PERIODS`.
fn parse_projection() -> Option<u32> {
    env::args().skip(1).find_map(|arg| {
        if arg == "--projection" {
            return Some(DEFAULT_PROJECTION_PERIODS);
        }
        arg.strip_prefix("--projection=").map(|n| {
            n.parse()
                .unwrap_or(DEFAULT_PROJECTION_PERIODS)
                .min(profit::MAX_PROJECTION_PERIODS)
        })
    })
}

/// Logs to the console and, when `log_file` is set, to that file through a
/// non-blocking writer. The returned guard flushes the file on drop.
fn init_tracing(log_level: Option<&str>, log_file: Option<&str>) -> Option<WorkerGuard> {
    let level = match log_level {
        Some("debug") => Level::DEBUG,
        Some("info") => Level::INFO,
        Some("warn") | Some("warning") => Level::WARN,
        Some("error") => Level::ERROR,
        Some("trace") => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let (file_layer, guard) = match log_file.map(|path| (path, open_log_file(path))) {
        Some((_, Ok(file))) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        Some((path, Err(e))) => {
            eprintln!("Failed to open log file {}: {}", path, e);
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .with(file_layer)
        .init();

    guard
}

/// Opens `path` for appending, creating missing parent directories.
fn open_log_file(path: &str) -> std::io::Result<File> {
    let path = Path::new(path);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[tokio::main]
async fn main() {
    let config_path = parse_config_path();
    let dry_run = env::args().any(|arg| arg == "--dry-run");

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    if let Some(periods) = parse_projection() {
        print_projection(&config, periods);
        return;
    }

    let _log_guard = init_tracing(config.app.log_level.as_deref(), config.app.log_file.as_deref());

    let bot = match Bot::new(bot::BotConfig::new(config, dry_run)).await {
        Ok(bot) => Arc::new(bot),
        Err(e) => {
            error!(error = %e, "Failed to create bot");
            std::process::exit(1);
        }
    };

    info!(config = %config_path, "Bot initialized");

    tokio::spawn({
        let bot = Arc::clone(&bot);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received shutdown signal");
                if let Err(e) = bot.stop().await {
                    error!(error = %e, "Failed to stop bot");
                }
            }
        }
    });

    if let Err(e) = bot.start().await {
        error!(error = %e, "Bot error");
    }

    let _ = bot.stop().await;
}

/// Prints the profit of one trade at the detection threshold and how capital
/// compounds when every trade earns it.
fn print_projection(config: &Config, periods: u32) {
    let venues = config.enabled_exchanges();
    let allocator = Allocator::from_config(config.capital.as_ref(), &venues);
    let detector = Detector::from_config(config.arbitrage.as_ref());

    let fees: Vec<Decimal> = venues
        .iter()
        .filter_map(|name| config.exchanges.get(name))
        .map(|ex| decimal_or(ex.fee_taker.as_ref(), Decimal::ZERO))
        .collect();
    let fee_rate = if fees.is_empty() {
        Decimal::ZERO
    } else {
        fees.iter().copied().sum::<Decimal>() / Decimal::from(fees.len())
    };

    let principal = allocator.principal();
    let trade_value = allocator.trade_value();
    let spread = detector.min_spread_percent();
    let trade = profit::trade_profit(trade_value, spread, fee_rate, allocator.policy().tax_rate);

    println!("Capital:     {:.2}", principal);
    println!("Trade value: {:.2}", trade_value);
    println!("Spread:      {}%", spread);
    println!("Fee rate:    {}", fee_rate);
    println!();
    println!("Gross:       {:.2}", trade.gross);
    println!("Fees:        {:.2}", trade.fees);
    println!("Taxes:       {:.2}", trade.taxes);
    println!("Net:         {:.2}", trade.net);
    println!();

    if principal.is_zero() {
        return;
    }
    let rate = trade.net / principal;
    for point in profit::projection(principal, rate, periods) {
        println!("{:>4}  {:.2}", point.period, point.value);
    }
    println!();
    println!(
        "Growth after {} trades: {:.2}",
        periods,
        profit::compound_growth(principal, rate, periods) - principal
    );
}
