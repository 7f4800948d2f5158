//! Fixed-point math utilities for deterministic simulation.
//!
//! Resource amounts and times are integers, but a few rules need fractional
//! values (health and power percentages for rotation conditions). Those use
//! fixed-point arithmetic so results are bit-identical across platforms.

use fixed::types::I32F32;

use crate::time::SimTime;

/// Fixed-point number type for all fractional simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
pub type Fixed = I32F32;

/// Ratio `numerator / denominator` as a fixed-point value.
///
/// Returns zero when the denominator is zero.
#[must_use]
pub fn ratio(numerator: u32, denominator: u32) -> Fixed {
    if denominator == 0 {
        return Fixed::ZERO;
    }
    Fixed::from_num(numerator) / Fixed::from_num(denominator)
}

/// Amount regenerated by a pool of size `max` at `percent_per_second`
/// over `interval`, rounded down.
///
/// # Example
///
/// ```
/// use simcast_core::math::regen_amount;
/// use simcast_core::time::SimTime;
///
/// // 5% of 10000 per second over 2 seconds
/// assert_eq!(regen_amount(10_000, 5, SimTime::from_millis(2000)), 1000);
/// ```
#[must_use]
pub fn regen_amount(max: u32, percent_per_second: u32, interval: SimTime) -> u32 {
    // Multiply before dividing so the floor is exact.
    let scaled =
        u128::from(max) * u128::from(percent_per_second) * u128::from(interval.as_millis());
    u32::try_from(scaled / 100_000).unwrap_or(u32::MAX)
}
