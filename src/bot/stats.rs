//! Runtime statistics for the bot.

use rust_decimal::Decimal;

/// Runtime statistics for the bot.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub detection_cycles: u64,
    pub opportunities_detected: u64,
    pub opportunities_executed: u64,
    pub successful_trades: u64,
    pub failed_trades: u64,
    /// Sum of net profit after fees and taxes.
    pub total_profit: Decimal,
    /// Quote value bought across all trades.
    pub total_volume: Decimal,
    pub best_trade: Option<Decimal>,
    pub worst_trade: Option<Decimal>,
}

impl Stats {
    /// Records a completed round trip.
    pub fn record_success(&mut self, net_profit: Decimal, volume: Decimal) {
        self.opportunities_executed += 1;
        self.successful_trades += 1;
        self.total_profit += net_profit;
        self.total_volume += volume;
        self.best_trade = Some(self.best_trade.map_or(net_profit, |b| b.max(net_profit)));
        self.worst_trade = Some(self.worst_trade.map_or(net_profit, |w| w.min(net_profit)));
    }

    /// Records an execution attempt that did not complete.
    pub fn record_failure(&mut self) {
        self.opportunities_executed += 1;
        self.failed_trades += 1;
    }

    pub fn success_rate(&self) -> Option<Decimal> {
        if self.opportunities_executed == 0 {
            return None;
        }
        Some(Decimal::from(self.successful_trades) / Decimal::from(self.opportunities_executed))
    }
}
