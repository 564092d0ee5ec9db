//! Decimal arithmetic utilities for financial calculations.

use rust_decimal::Decimal;

/// Round down to a multiple of the lot (step) size.
pub fn round_down_to_lot(value: Decimal, lot_size: Decimal) -> Decimal {
    if lot_size == Decimal::ZERO {
        return value;
    }
    (value / lot_size).floor() * lot_size
}

/// Number of decimal places a step size carries (0.001 -> 3, 1 -> 0).
///
/// Quantities floored to a step multiple are re-quantized to this scale so
/// repeated divisions never accumulate extra digits.
pub fn step_scale(step_size: Decimal) -> u32 {
    step_size.normalize().scale()
}

/// Safe division that returns zero if the divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

/// Simple mean over the first `n` values of a most-recent-first slice.
///
/// Returns `None` when fewer than `n` values are available.
pub fn mean_of_latest(prices: &[Decimal], n: usize) -> Option<Decimal> {
    if n == 0 || prices.len() < n {
        return None;
    }
    let sum: Decimal = prices[..n].iter().copied().sum();
    Some(sum / Decimal::from(n as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_down_to_lot() {
        assert_eq!(round_down_to_lot(dec!(1.567), dec!(0.001)), dec!(1.567));
        assert_eq!(round_down_to_lot(dec!(1.567), dec!(0.01)), dec!(1.56));
        assert_eq!(round_down_to_lot(dec!(1.567), dec!(0.1)), dec!(1.5));
        assert_eq!(round_down_to_lot(dec!(7), dec!(5)), dec!(5));
    }

    #[test]
    fn test_step_scale() {
        assert_eq!(step_scale(dec!(0.001)), 3);
        assert_eq!(step_scale(dec!(0.010)), 2); // trailing zero does not count
        assert_eq!(step_scale(dec!(1)), 0);
    }

    #[test]
    fn test_mean_of_latest() {
        let prices = vec![dec!(3), dec!(2), dec!(1)];
        assert_eq!(mean_of_latest(&prices, 2), Some(dec!(2.5)));
        assert_eq!(mean_of_latest(&prices, 3), Some(dec!(2)));
        assert_eq!(mean_of_latest(&prices, 4), None);
    }

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(dec!(10), dec!(4)), dec!(2.5));
        assert_eq!(safe_div(dec!(10), Decimal::ZERO), Decimal::ZERO);
    }
}
