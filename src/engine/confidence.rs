//! Confidence estimator: fit RMSE → bounded heuristic score.
//!
//! The score comes from in-sample RMSE only, so it is a rough quality
//! indicator rather than a calibrated probability.

use super::EngineConfig;

/// `clamp(1 − rmse / divisor, floor, ceiling)`.
///
/// A non-finite RMSE maps to the floor. Bounds are applied floor first, so
/// an inverted pair yields the ceiling and a NaN bound is ignored; this never
/// panics for a config that skipped [`EngineConfig::validate`].
pub fn confidence(config: &EngineConfig, rmse: f64) -> f64 {
    if !rmse.is_finite() {
        return config.confidence_floor;
    }
    (1.0 - rmse / config.confidence_divisor)
        .max(config.confidence_floor)
        .min(config.confidence_ceiling)
}
