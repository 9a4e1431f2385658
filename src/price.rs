//! Fixed-point price conversion.
//!
//! The book compares prices as integer ticks. A tick scale of `s` means one
//! tick is `10^-s` units (scale 2: $100.50 -> 10050).

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::command::Price;
use crate::error::PriceError;

/// Largest scale whose multiplier fits in a u64
pub const MAX_SCALE: u32 = 18;

#[inline]
fn multiplier(scale: u32) -> Result<Decimal, PriceError> {
    if scale > MAX_SCALE {
        return Err(PriceError::Scale(scale));
    }
    Ok(Decimal::from(10u64.pow(scale)))
}

/// Convert an exact decimal price to ticks.
///
/// Fails if the price is not positive or has more decimal places than
/// `scale` allows.
pub fn from_decimal(value: Decimal, scale: u32) -> Result<Price, PriceError> {
    if value <= Decimal::ZERO {
        return Err(PriceError::NotPositive(value.to_string()));
    }

    let ticks = value
        .checked_mul(multiplier(scale)?)
        .ok_or_else(|| PriceError::OutOfRange(value.to_string()))?;

    if !ticks.fract().is_zero() {
        return Err(PriceError::Precision {
            value: value.to_string(),
            scale,
        });
    }

    ticks
        .to_u64()
        .ok_or_else(|| PriceError::OutOfRange(value.to_string()))
}

/// Convert a float price to ticks, rounding to the nearest tick.
///
/// NaN and infinities are rejected as out of range.
pub fn from_f64(value: f64, scale: u32) -> Result<Price, PriceError> {
    let decimal = Decimal::from_f64(value).ok_or_else(|| PriceError::OutOfRange(value.to_string()))?;
    from_decimal(decimal.round_dp(scale), scale)
}

/// Render ticks back as a decimal price.
pub fn to_decimal(price: Price, scale: u32) -> Decimal {
    Decimal::from_i128_with_scale(price as i128, scale)
}
