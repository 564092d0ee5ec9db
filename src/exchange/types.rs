//! Value types shared across exchange implementations.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(format!("unknown order side: {other}")),
        }
    }
}

/// An order the venue still considers open (or partially filled).
#[derive(Debug, Clone)]
pub struct OpenOrder {
    /// Venue-assigned order identifier.
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    /// Resting limit price in the venue's quote.
    pub price: Decimal,
    /// Quantity originally submitted.
    pub orig_qty: Decimal,
    /// Quantity the venue has filled so far.
    pub executed_qty: Decimal,
}

impl OpenOrder {
    /// Unfilled portion of the order.
    pub fn remaining_qty(&self) -> Decimal {
        self.orig_qty - self.executed_qty
    }
}

/// Response to a successful order submission.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
}
