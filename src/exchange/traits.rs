//! Venue-agnostic capability trait for order execution.
//!
//! One signal engine serves every venue; the differences between exchanges
//! live behind this trait plus the [`QuoteStyle`] orientation policy, not in
//! per-venue strategy copies.

use crate::exchange::types::{OpenOrder, OrderSide};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Venue identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Coincheck,
    Binance,
    Mock,
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Venue::Coincheck => write!(f, "coincheck"),
            Venue::Binance => write!(f, "binance"),
            Venue::Mock => write!(f, "mock"),
        }
    }
}

/// How a venue quotes an instrument relative to the engine's internal
/// convention of "base per quote".
///
/// Some pairs are quoted the other way around (e.g. a reward-asset pair
/// quoted as quote-per-base). Inverted instruments have their quoted price
/// reciprocated before any averaging or comparison, so a higher internal
/// price always means a more valuable base asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteStyle {
    Direct,
    Inverted,
}

impl QuoteStyle {
    /// Convert a venue-quoted price into the engine's internal orientation.
    pub fn to_internal(&self, quoted: Decimal) -> Decimal {
        match self {
            QuoteStyle::Direct => quoted,
            QuoteStyle::Inverted => {
                if quoted == Decimal::ZERO {
                    Decimal::ZERO
                } else {
                    Decimal::ONE / quoted
                }
            }
        }
    }
}

/// Errors surfaced by exchange capability calls.
///
/// `is_transient` drives the per-instrument skip-and-continue policy: a
/// transient failure skips the step for this cycle without mutating state.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Network failure, 5xx, timeout. Retry next cycle.
    #[error("transient venue error: {0}")]
    Transient(String),

    /// Venue throttled the request. Retry next cycle.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The venue rejected the request outright (bad symbol, illegal order).
    #[error("venue rejected request: {0}")]
    Venue(String),

    /// Expected data (symbol, asset) is missing from the venue response.
    #[error("missing venue data: {0}")]
    MissingData(String),
}

impl ExchangeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Transient(_) | ExchangeError::RateLimited(_))
    }
}

/// Exchange capability consumed by the trading core.
///
/// Implementations wrap a venue's HTTP client (out of scope here); the crate
/// ships [`crate::exchange::MockExchange`] for tests and paper runs.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Returns the venue identifier.
    fn venue(&self) -> Venue;

    /// Current market price for a symbol, in the venue's quote.
    async fn current_price(&self, symbol: &str) -> Result<Decimal, ExchangeError>;

    /// Open (or partially filled) orders, optionally filtered by symbol.
    async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<OpenOrder>, ExchangeError>;

    /// Cancel an open order. An error means the order may still be live.
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), ExchangeError>;

    /// Submit a limit order; returns the venue-assigned order id.
    async fn create_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<String, ExchangeError>;

    /// Free balance of an asset.
    async fn balance(&self, asset: &str) -> Result<Decimal, ExchangeError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_style_to_internal() {
        assert_eq!(QuoteStyle::Direct.to_internal(dec!(250)), dec!(250));
        assert_eq!(QuoteStyle::Inverted.to_internal(dec!(4)), dec!(0.25));
        assert_eq!(QuoteStyle::Inverted.to_internal(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_error_transience() {
        assert!(ExchangeError::Transient("timeout".into()).is_transient());
        assert!(ExchangeError::RateLimited("429".into()).is_transient());
        assert!(!ExchangeError::Venue("bad symbol".into()).is_transient());
        assert!(!ExchangeError::MissingData("no ticker".into()).is_transient());
    }
}
