//! Core business entities for trading orders and trades.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// OrderSide represents the direction of an order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// OrderStatus represents the current state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Filled,
    PartiallyFilled,
    Cancelled,
    Failed,
}

/// Order represents a trading order on an exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Client-side identifier.
    pub id: String,
    /// Name of the exchange where the order is placed.
    pub exchange: String,
    /// Trading pair in "BASE/QUOTE" format (e.g., "BTC/USD").
    pub pair: String,
    pub side: OrderSide,
    /// Limit price. Whatever does not fill immediately is cancelled.
    pub price: Decimal,
    /// Amount of base currency to buy or sell.
    pub quantity: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a pending immediate-or-cancel limit order.
    pub fn limit(
        exchange: impl Into<String>,
        pair: impl Into<String>,
        side: OrderSide,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            exchange: exchange.into(),
            pair: pair.into(),
            side,
            price,
            quantity,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Quote-currency value of the order at its limit price.
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Trade represents an executed fill resulting from an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Unique identifier for this trade.
    pub id: String,
    /// ID of the order that created this trade.
    pub order_id: String,
    pub exchange: String,
    pub pair: String,
    pub side: OrderSide,
    /// Average execution price.
    pub price: Decimal,
    /// Filled base quantity; zero when nothing executed.
    pub quantity: Decimal,
    /// Trading fee charged.
    pub fee: Decimal,
    /// Currency in which the fee was charged.
    pub fee_currency: String,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// Quote-currency value of the fill before fees.
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }

    /// Returns true if any quantity was executed.
    pub fn is_filled(&self) -> bool {
        self.quantity > Decimal::ZERO
    }
}
