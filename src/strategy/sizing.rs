//! Order quantity normalization.
//!
//! Venues only accept quantities that are a multiple of the instrument's
//! step size, at or above a minimum quantity, and worth at least a minimum
//! notional. Everything the engine wants to trade passes through
//! [`normalize`] first; a rejection means the caller skips the trade rather
//! than submitting an illegal or zero order.

use crate::utils::decimal::{round_down_to_lot, step_scale};
use rust_decimal::Decimal;
use thiserror::Error;

/// Why a desired quantity could not be turned into a legal order size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SizeRejection {
    #[error("quantity below venue minimum")]
    BelowMinQty,
    #[error("order value below venue minimum notional")]
    BelowMinNotional,
}

/// Floor `desired` to an exchange-legal order size.
///
/// The floored quantity is re-quantized to the step size's own decimal
/// scale, so a step of 0.01 can never yield 0.0099999... from the division.
pub fn normalize(
    desired: Decimal,
    step_size: Decimal,
    min_qty: Decimal,
    min_notional: Decimal,
    reference_price: Decimal,
) -> Result<Decimal, SizeRejection> {
    let mut qty = round_down_to_lot(desired, step_size);
    if step_size != Decimal::ZERO {
        qty = qty.round_dp(step_scale(step_size));
    }
    if qty < min_qty || qty <= Decimal::ZERO {
        return Err(SizeRejection::BelowMinQty);
    }
    if qty * reference_price < min_notional {
        return Err(SizeRejection::BelowMinNotional);
    }
    Ok(qty)
}
