//! Capital allocation across venues.
//!
//! Each trade commits a fraction of principal plus a fraction of the profit
//! accumulated so far, never touching the cash reserve of the buy venue.
//! After a trade is settled the cash is spread evenly again.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{ExecutionReport, OpenPosition};
use crate::config::{CapitalConfig, decimal_or};
use crate::domain::Opportunity;

/// Decimal places kept on order quantities.
const QUANTITY_DP: u32 = 8;

const DEFAULT_INITIAL_CAPITAL: &str = "10000";
const DEFAULT_PROFIT_FRACTION: &str = "0.5";
const DEFAULT_MIN_TRADE_VALUE: &str = "10";
const DEFAULT_TAX_RATE: &str = "0.275";

/// Sizing and settlement rules.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPolicy {
    pub principal_fraction: Decimal,
    pub profit_fraction: Decimal,
    pub cash_reserve_fraction: Decimal,
    pub min_trade_value: Decimal,
    pub tax_rate: Decimal,
    pub rebalance_after_trade: bool,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            principal_fraction: Decimal::ONE / Decimal::from(6),
            profit_fraction: dec(DEFAULT_PROFIT_FRACTION),
            cash_reserve_fraction: Decimal::ONE / Decimal::from(3),
            min_trade_value: dec(DEFAULT_MIN_TRADE_VALUE),
            tax_rate: dec(DEFAULT_TAX_RATE),
            rebalance_after_trade: true,
        }
    }
}

impl AllocationPolicy {
    pub fn from_config(config: &CapitalConfig) -> Self {
        let defaults = Self::default();
        Self {
            principal_fraction: decimal_or(config.principal_fraction.as_ref(), defaults.principal_fraction),
            profit_fraction: decimal_or(config.profit_fraction.as_ref(), defaults.profit_fraction),
            cash_reserve_fraction: decimal_or(
                config.cash_reserve_fraction.as_ref(),
                defaults.cash_reserve_fraction,
            ),
            min_trade_value: decimal_or(config.min_trade_value.as_ref(), defaults.min_trade_value),
            tax_rate: decimal_or(config.tax_rate.as_ref(), defaults.tax_rate),
            rebalance_after_trade: config.rebalance_after_trade,
        }
    }
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or_default()
}

/// Portfolio changes caused by one settled trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    pub cost: Decimal,
    pub proceeds: Decimal,
    pub fees: Decimal,
    /// Proceeds minus cost minus fees.
    pub profit_before_tax: Decimal,
    /// Withheld from the portfolio as money out.
    pub taxes: Decimal,
    pub net_profit: Decimal,
    pub total_cash: Decimal,
}

/// Quote-currency cash held per venue plus running tallies.
#[derive(Debug, Clone)]
pub struct Allocator {
    policy: AllocationPolicy,
    principal: Decimal,
    cash: BTreeMap<String, Decimal>,
    accumulated_profit: Decimal,
    fees_paid: Decimal,
    taxes_paid: Decimal,
    money_out: Decimal,
    trade_count: u64,
}

impl Allocator {
    /// Splits `initial_capital` evenly across `venues`.
    pub fn new(initial_capital: Decimal, venues: &[String], policy: AllocationPolicy) -> Self {
        let mut allocator = Self {
            policy,
            principal: initial_capital,
            cash: venues.iter().map(|v| (v.clone(), Decimal::ZERO)).collect(),
            accumulated_profit: Decimal::ZERO,
            fees_paid: Decimal::ZERO,
            taxes_paid: Decimal::ZERO,
            money_out: Decimal::ZERO,
            trade_count: 0,
        };
        allocator.distribute(initial_capital);
        allocator
    }

    pub fn from_config(config: Option<&CapitalConfig>, venues: &[String]) -> Self {
        let default_capital = dec(DEFAULT_INITIAL_CAPITAL);
        match config {
            Some(c) => Self::new(
                decimal_or(c.initial_capital.as_ref(), default_capital),
                venues,
                AllocationPolicy::from_config(c),
            ),
            None => Self::new(default_capital, venues, AllocationPolicy::default()),
        }
    }

    /// Quote value the next trade may commit.
    pub fn trade_value(&self) -> Decimal {
        self.principal * self.policy.principal_fraction
            + self.accumulated_profit.max(Decimal::ZERO) * self.policy.profit_fraction
    }

    /// Base quantity to trade for `opportunity`, or `None` if the trade
    /// would be worth less than the minimum.
    pub fn size(&self, opportunity: &Opportunity) -> Option<Decimal> {
        if opportunity.buy_price <= Decimal::ZERO {
            return None;
        }

        let venue_cash = self.cash.get(&opportunity.buy_exchange).copied()?;
        let deployable = venue_cash * (Decimal::ONE - self.policy.cash_reserve_fraction);

        let mut value = self.trade_value().min(deployable);
        if let Some(max) = opportunity.max_quantity {
            value = value.min(max * opportunity.buy_price);
        }

        if value <= Decimal::ZERO || value < self.policy.min_trade_value {
            debug!(
                route = %opportunity.route(),
                value = %value.round_dp(2),
                min = %self.policy.min_trade_value,
                "Trade value below minimum"
            );
            return None;
        }

        let quantity = (value / opportunity.buy_price)
            .round_dp_with_strategy(QUANTITY_DP, RoundingStrategy::ToZero);
        (quantity > Decimal::ZERO).then_some(quantity)
    }

    /// Applies a completed trade to the portfolio.
    pub fn settle(&mut self, report: &ExecutionReport) -> Settlement {
        let fees = report.fees();
        *self.cash.entry(report.buy_exchange.clone()).or_default() -= report.cost + report.buy_fee;
        *self.cash.entry(report.sell_exchange.clone()).or_default() += report.proceeds - report.sell_fee;

        let profit_before_tax = report.proceeds - report.cost - fees;
        let taxes = (profit_before_tax.max(Decimal::ZERO) * self.policy.tax_rate).round_dp(QUANTITY_DP);
        if taxes > Decimal::ZERO {
            *self.cash.entry(report.sell_exchange.clone()).or_default() -= taxes;
        }

        let net_profit = profit_before_tax - taxes;
        self.accumulated_profit += net_profit;
        self.fees_paid += fees;
        self.taxes_paid += taxes;
        self.money_out += taxes;
        self.trade_count += 1;

        if self.policy.rebalance_after_trade {
            self.rebalance();
        }

        let settlement = Settlement {
            cost: report.cost,
            proceeds: report.proceeds,
            fees,
            profit_before_tax,
            taxes,
            net_profit,
            total_cash: self.total_cash(),
        };

        info!(
            pair = %report.pair,
            net_profit = %net_profit.round_dp(4),
            taxes = %taxes.round_dp(4),
            accumulated_profit = %self.accumulated_profit.round_dp(4),
            total_cash = %settlement.total_cash.round_dp(2),
            "Trade settled"
        );
        settlement
    }

    /// Books the quote cash of a trade left open. The unsold base is not
    /// valued, so total cash drops by the cost of the open quantity. No
    /// rebalance happens until the next settled trade.
    pub fn book_open_position(&mut self, position: &OpenPosition) {
        let fees = position.buy_fee + position.sell_fee;
        *self.cash.entry(position.buy_exchange.clone()).or_default() -= position.cost + position.buy_fee;
        if position.sold > Decimal::ZERO {
            *self.cash.entry(position.sell_exchange.clone()).or_default() +=
                position.proceeds - position.sell_fee;
        }
        self.fees_paid += fees;

        warn!(
            pair = %position.pair,
            buy_exchange = %position.buy_exchange,
            open_quantity = %position.open_quantity(),
            cost = %position.cost.round_dp(4),
            fees = %fees.round_dp(4),
            total_cash = %self.total_cash().round_dp(2),
            "Open position booked"
        );
    }

    /// Spreads total cash evenly across venues.
    pub fn rebalance(&mut self) {
        let total = self.total_cash();
        self.distribute(total);
        debug!(total = %total.round_dp(2), venues = self.cash.len(), "Rebalanced venue cash");
    }

    /// Even split; the last venue absorbs rounding so the total is exact.
    fn distribute(&mut self, total: Decimal) {
        let count = self.cash.len();
        if count == 0 {
            return;
        }

        let share = total / Decimal::from(count);
        let mut assigned = Decimal::ZERO;
        for (i, cash) in self.cash.values_mut().enumerate() {
            *cash = if i + 1 == count { total - assigned } else { share };
            assigned += *cash;
        }
    }

    pub fn total_cash(&self) -> Decimal {
        self.cash.values().copied().sum()
    }

    pub fn venue_cash(&self, venue: &str) -> Option<Decimal> {
        self.cash.get(venue).copied()
    }

    pub fn principal(&self) -> Decimal {
        self.principal
    }

    pub fn accumulated_profit(&self) -> Decimal {
        self.accumulated_profit
    }

    pub fn fees_paid(&self) -> Decimal {
        self.fees_paid
    }

    pub fn taxes_paid(&self) -> Decimal {
        self.taxes_paid
    }

    pub fn money_out(&self) -> Decimal {
        self.money_out
    }

    pub fn trade_count(&self) -> u64 {
        self.trade_count
    }

    pub fn policy(&self) -> &AllocationPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OpportunityType, OrderSide, OrderStatus, Trade};
    use chrono::Utc;
    use std::time::Duration;

    fn venues() -> Vec<String> {
        vec!["binance".to_string(), "kraken".to_string()]
    }

    fn opportunity(buy_price: &str, max_quantity: Option<&str>) -> Opportunity {
        let now = Utc::now();
        Opportunity {
            id: "opp".to_string(),
            opportunity_type: OpportunityType::CrossExchange,
            pair: "BTC/USD".to_string(),
            buy_exchange: "kraken".to_string(),
            sell_exchange: "binance".to_string(),
            buy_price: dec(buy_price),
            sell_price: dec(buy_price) * dec("1.02"),
            buy_fee: Decimal::ZERO,
            sell_fee: Decimal::ZERO,
            gross_spread_percent: dec("2"),
            net_spread_percent: dec("2"),
            max_quantity: max_quantity.map(dec),
            detected_at: now,
            expires_at: now,
        }
    }

    fn trade(exchange: &str, side: OrderSide, price: &str, quantity: &str, fee: &str) -> Trade {
        Trade {
            id: "t".to_string(),
            order_id: "o".to_string(),
            exchange: exchange.to_string(),
            pair: "BTC/USD".to_string(),
            side,
            price: dec(price),
            quantity: dec(quantity),
            fee: dec(fee),
            fee_currency: "USD".to_string(),
            status: OrderStatus::Filled,
            timestamp: Utc::now(),
        }
    }

    fn report(cost: &str, proceeds: &str, buy_fee: &str, sell_fee: &str) -> ExecutionReport {
        let buy_trade = trade("kraken", OrderSide::Buy, cost, "1", buy_fee);
        let sell_trade = trade("binance", OrderSide::Sell, proceeds, "1", sell_fee);
        ExecutionReport {
            opportunity_id: "opp".to_string(),
            pair: "BTC/USD".to_string(),
            buy_exchange: "kraken".to_string(),
            sell_exchange: "binance".to_string(),
            quantity: Decimal::ONE,
            cost: dec(cost),
            proceeds: dec(proceeds),
            buy_fee: dec(buy_fee),
            sell_fee: dec(sell_fee),
            gross_profit: dec(proceeds) - dec(cost),
            net_profit: dec(proceeds) - dec(cost) - dec(buy_fee) - dec(sell_fee),
            buy_trade,
            sell_trade,
            sell_attempts: 1,
            elapsed: Duration::from_millis(5),
            dry_run: false,
        }
    }

    fn simple_policy() -> AllocationPolicy {
        AllocationPolicy {
            principal_fraction: dec("0.1"),
            profit_fraction: dec("0.5"),
            cash_reserve_fraction: dec("0.25"),
            min_trade_value: dec("10"),
            tax_rate: dec("0.25"),
            rebalance_after_trade: true,
        }
    }

    #[test]
    fn test_initial_split_is_even() {
        let allocator = Allocator::new(dec("10000"), &venues(), AllocationPolicy::default());

        assert_eq!(allocator.venue_cash("kraken"), Some(dec("5000")));
        assert_eq!(allocator.venue_cash("binance"), Some(dec("5000")));
        assert_eq!(allocator.total_cash(), dec("10000"));
    }

    #[test]
    fn test_default_trade_value_is_sixth_of_principal() {
        let allocator = Allocator::new(dec("6000"), &venues(), AllocationPolicy::default());
        assert_eq!(allocator.trade_value().round_dp(8), dec("1000"));
    }

    #[test]
    fn test_size_from_trade_value() {
        let allocator = Allocator::new(dec("10000"), &venues(), simple_policy());

        // 10% of 10000 at 100 per unit
        assert_eq!(allocator.size(&opportunity("100", None)), Some(dec("10")));
    }

    #[test]
    fn test_size_respects_cash_reserve() {
        let mut policy = simple_policy();
        policy.principal_fraction = dec("1");
        let allocator = Allocator::new(dec("10000"), &venues(), policy);

        // kraken holds 5000, 25% reserved
        assert_eq!(allocator.size(&opportunity("100", None)), Some(dec("37.5")));
    }

    #[test]
    fn test_size_respects_book_depth() {
        let allocator = Allocator::new(dec("10000"), &venues(), simple_policy());
        assert_eq!(allocator.size(&opportunity("100", Some("2"))), Some(dec("2")));
    }

    #[test]
    fn test_size_below_minimum() {
        let allocator = Allocator::new(dec("10000"), &venues(), simple_policy());

        assert!(allocator.size(&opportunity("100", Some("0.05"))).is_none());
        let mut unknown = opportunity("100", None);
        unknown.buy_exchange = "bitstamp".to_string();
        assert!(allocator.size(&unknown).is_none());
    }

    #[test]
    fn test_size_rounds_down() {
        let allocator = Allocator::new(dec("10000"), &venues(), simple_policy());
        let quantity = allocator.size(&opportunity("3", None)).unwrap();

        assert_eq!(quantity, dec("333.33333333"));
        assert!(quantity * dec("3") <= allocator.trade_value());
    }

    #[test]
    fn test_settle_profit() {
        let mut allocator = Allocator::new(dec("10000"), &venues(), simple_policy());

        let settlement = allocator.settle(&report("1000", "1020", "1", "1"));

        assert_eq!(settlement.fees, dec("2"));
        assert_eq!(settlement.profit_before_tax, dec("18"));
        assert_eq!(settlement.taxes, dec("4.5"));
        assert_eq!(settlement.net_profit, dec("13.5"));
        assert_eq!(settlement.total_cash, dec("10013.5"));
        assert_eq!(allocator.money_out(), dec("4.5"));
        assert_eq!(allocator.taxes_paid(), dec("4.5"));
        assert_eq!(allocator.fees_paid(), dec("2"));
        assert_eq!(allocator.accumulated_profit(), dec("13.5"));
        assert_eq!(allocator.trade_count(), 1);

        // rebalanced
        assert_eq!(allocator.venue_cash("kraken"), Some(dec("5006.75")));
        assert_eq!(allocator.venue_cash("binance"), Some(dec("5006.75")));
    }

    #[test]
    fn test_profit_is_reinvested() {
        let mut allocator = Allocator::new(dec("10000"), &venues(), simple_policy());
        let before = allocator.trade_value();

        allocator.settle(&report("1000", "1020", "1", "1"));

        assert_eq!(allocator.trade_value(), before + dec("6.75"));
    }

    #[test]
    fn test_loss_is_not_taxed_or_reinvested() {
        let mut allocator = Allocator::new(dec("10000"), &venues(), simple_policy());
        let before = allocator.trade_value();

        let settlement = allocator.settle(&report("1000", "995", "1", "1"));

        assert_eq!(settlement.taxes, Decimal::ZERO);
        assert_eq!(settlement.net_profit, dec("-7"));
        assert_eq!(allocator.total_cash(), dec("9993"));
        assert_eq!(allocator.trade_value(), before);
    }

    #[test]
    fn test_settle_without_rebalance() {
        let mut policy = simple_policy();
        policy.rebalance_after_trade = false;
        let mut allocator = Allocator::new(dec("10000"), &venues(), policy);

        allocator.settle(&report("1000", "1020", "1", "1"));

        assert_eq!(allocator.venue_cash("kraken"), Some(dec("3999")));
        assert_eq!(allocator.venue_cash("binance"), Some(dec("6014.5")));

        allocator.rebalance();
        assert_eq!(allocator.venue_cash("kraken"), allocator.venue_cash("binance"));
    }

    fn position(bought: &str, sold: &str) -> OpenPosition {
        OpenPosition {
            pair: "BTC/USD".to_string(),
            buy_exchange: "kraken".to_string(),
            sell_exchange: "binance".to_string(),
            bought: dec(bought),
            cost: dec(bought) * dec("100"),
            buy_fee: dec(bought) * dec("0.1"),
            sold: dec(sold),
            proceeds: dec(sold) * dec("102"),
            sell_fee: dec(sold) * dec("0.102"),
        }
    }

    #[test]
    fn test_open_position_charges_buy_leg() {
        let mut allocator = Allocator::new(dec("10000"), &venues(), simple_policy());

        allocator.book_open_position(&position("1", "0"));

        assert_eq!(allocator.venue_cash("kraken"), Some(dec("4899.9")));
        assert_eq!(allocator.venue_cash("binance"), Some(dec("5000")));
        assert_eq!(allocator.total_cash(), dec("9899.9"));
        assert_eq!(allocator.fees_paid(), dec("0.1"));
        assert_eq!(allocator.trade_count(), 0);
        assert_eq!(allocator.accumulated_profit(), Decimal::ZERO);
    }

    #[test]
    fn test_open_position_credits_partial_sells() {
        let mut allocator = Allocator::new(dec("10000"), &venues(), simple_policy());

        allocator.book_open_position(&position("2", "1"));

        assert_eq!(allocator.venue_cash("kraken"), Some(dec("4799.8")));
        assert_eq!(allocator.venue_cash("binance"), Some(dec("5101.898")));
        assert_eq!(allocator.fees_paid(), dec("0.302"));
    }

    #[test]
    fn test_rebalance_conserves_total() {
        let three = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut allocator = Allocator::new(dec("100"), &three, simple_policy());

        allocator.rebalance();
        assert_eq!(allocator.total_cash(), dec("100"));
    }

    #[test]
    fn test_from_config_defaults() {
        let allocator = Allocator::from_config(None, &venues());

        assert_eq!(allocator.principal(), dec("10000"));
        assert_eq!(allocator.policy(), &AllocationPolicy::default());
        assert_eq!(allocator.policy().tax_rate, dec("0.275"));
    }
}
