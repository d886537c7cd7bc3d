//! Spread and profit arithmetic.
//!
//! Percentages are expressed in percent (1.5 means 1.5%), fee and tax rates
//! as fractions (0.001 means 0.1%).

use rust_decimal::Decimal;
use serde::Serialize;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Percentage gained by buying at `buy` and selling at `sell`, before fees.
pub fn gross_spread_percent(buy: Decimal, sell: Decimal) -> Decimal {
    if buy <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (sell - buy) / buy * HUNDRED
}

/// Percentage gained after paying the taker fee on both legs.
pub fn net_spread_percent(buy: Decimal, sell: Decimal, buy_fee: Decimal, sell_fee: Decimal) -> Decimal {
    let cost = buy * (Decimal::ONE + buy_fee);
    if cost <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let proceeds = sell * (Decimal::ONE - sell_fee);
    (proceeds - cost) / cost * HUNDRED
}

/// Breakdown of a single round trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TradeProfit {
    pub gross: Decimal,
    pub fees: Decimal,
    pub taxes: Decimal,
    pub net: Decimal,
}

/// Profit of one trade worth `trade_value`.
///
/// Fees are charged on both legs at `fee_rate`. Taxes apply only to a
/// positive gross profit.
pub fn trade_profit(
    trade_value: Decimal,
    gross_percent: Decimal,
    fee_rate: Decimal,
    tax_rate: Decimal,
) -> TradeProfit {
    let gross = trade_value * gross_percent / HUNDRED;
    let fees = trade_value * fee_rate * Decimal::TWO;
    let taxes = gross.max(Decimal::ZERO) * tax_rate;

    TradeProfit {
        gross,
        fees,
        taxes,
        net: gross - fees - taxes,
    }
}

/// Longest projection printed or computed, in trades.
pub const MAX_PROJECTION_PERIODS: u32 = 10_000;

/// `principal × (1 + rate)^periods`, with `rate` as a fraction.
/// Saturates at `Decimal::MAX` instead of overflowing.
pub fn compound_growth(principal: Decimal, rate: Decimal, periods: u32) -> Decimal {
    let factor = Decimal::ONE + rate;
    let mut value = principal;
    for _ in 0..periods.min(MAX_PROJECTION_PERIODS) {
        value = value.checked_mul(factor).unwrap_or(Decimal::MAX);
        if value == Decimal::MAX {
            break;
        }
    }
    value
}

/// Value after a given number of compounding periods.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProjectionPoint {
    pub period: u32,
    pub value: Decimal,
}

/// Compounded value after each period, starting with period 0.
/// At most `MAX_PROJECTION_PERIODS` periods are produced.
pub fn projection(principal: Decimal, rate: Decimal, periods: u32) -> Vec<ProjectionPoint> {
    let periods = periods.min(MAX_PROJECTION_PERIODS);
    let factor = Decimal::ONE + rate;
    let mut value = principal;
    let mut points = Vec::with_capacity(periods as usize + 1);
    points.push(ProjectionPoint { period: 0, value });

    for period in 1..=periods {
        value = value.checked_mul(factor).unwrap_or(Decimal::MAX);
        points.push(ProjectionPoint { period, value });
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_gross_spread() {
        assert_eq!(gross_spread_percent(dec("100"), dec("101")), dec("1"));
        assert_eq!(gross_spread_percent(dec("200"), dec("190")), dec("-5"));
        assert_eq!(gross_spread_percent(Decimal::ZERO, dec("1")), Decimal::ZERO);
    }

    #[test]
    fn test_net_spread_without_fees_equals_gross() {
        assert_eq!(
            net_spread_percent(dec("100"), dec("101"), Decimal::ZERO, Decimal::ZERO),
            dec("1")
        );
    }

    #[test]
    fn test_fees_reduce_net_spread() {
        let net = net_spread_percent(dec("100"), dec("101"), dec("0.001"), dec("0.001"));
        // (100.899 - 100.1) / 100.1 * 100
        let expected = (dec("100.899") - dec("100.1")) / dec("100.1") * HUNDRED;
        assert_eq!(net, expected);
        assert!(net < dec("1"));
        assert!(net > dec("0.79"));
    }

    #[test]
    fn test_trade_profit() {
        let profit = trade_profit(dec("10000"), dec("1"), dec("0.002867"), dec("0.275"));

        assert_eq!(profit.gross, dec("100"));
        assert_eq!(profit.fees, dec("57.34"));
        assert_eq!(profit.taxes, dec("27.5"));
        assert_eq!(profit.net, dec("15.16"));
    }

    #[test]
    fn test_trade_profit_loss_is_not_taxed() {
        let profit = trade_profit(dec("1000"), dec("-1"), dec("0.001"), dec("0.275"));

        assert_eq!(profit.gross, dec("-10"));
        assert_eq!(profit.taxes, Decimal::ZERO);
        assert_eq!(profit.net, dec("-12"));
    }

    #[test]
    fn test_compound_growth() {
        assert_eq!(compound_growth(dec("1000"), dec("0.1"), 2), dec("1210"));
        assert_eq!(compound_growth(dec("1000"), dec("0.1"), 0), dec("1000"));
        assert_eq!(compound_growth(dec("500"), Decimal::ZERO, 12), dec("500"));
    }

    #[test]
    fn test_projection_series() {
        let points = projection(dec("100"), dec("0.5"), 3);

        assert_eq!(points.len(), 4);
        assert_eq!(points[0], ProjectionPoint { period: 0, value: dec("100") });
        assert_eq!(points[3].value, dec("337.5"));
    }

    #[test]
    fn test_projection_saturates() {
        let value = compound_growth(Decimal::MAX, dec("1"), 3);
        assert_eq!(value, Decimal::MAX);
    }

    #[test]
    fn test_projection_period_cap() {
        let points = projection(dec("100"), Decimal::ZERO, 4_000_000_000);
        assert_eq!(points.len(), MAX_PROJECTION_PERIODS as usize + 1);
        assert_eq!(points.last().unwrap().period, MAX_PROJECTION_PERIODS);

        let capped = compound_growth(dec("100"), dec("0.001"), MAX_PROJECTION_PERIODS);
        assert_eq!(compound_growth(dec("100"), dec("0.001"), u32::MAX), capped);
        assert_eq!(compound_growth(dec("100"), dec("1"), u32::MAX), Decimal::MAX);
    }
}
