//! Decimal ↔ f64 conversions for coordinates stored as `NUMERIC`.
//!
//! Non-finite inputs map to `Decimal::ZERO`.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Number of decimal places kept for latitude/longitude (~0.1 m).
const COORDINATE_DECIMALS: u32 = 6;

/// Convert a coordinate to Decimal, rounded to the column precision.
pub(crate) fn coordinate_to_decimal(v: f64) -> Decimal {
    if !v.is_finite() {
        tracing::warn!(
            "coordinate_to_decimal received non-finite value {}, defaulting to 0",
            v
        );
        return Decimal::ZERO;
    }
    Decimal::from_f64(v)
        .map(|d| d.round_dp(COORDINATE_DECIMALS))
        .unwrap_or_default()
}

/// Convert a Decimal to f64, defaulting to 0.0 for values that can't be represented.
pub(crate) fn dec_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}
