//! Forecast-blending engine.
//!
//! Pure computation: takes historical and forecast-horizon samples, fits a
//! small ridge regression on the history, predicts over the horizon and
//! blends the prediction with the provider's own temperatures.
//!
//! Data flow:
//! - history → `features::build_design_matrix` → `ridge::fit` → `FitResult`
//! - horizon → `features::build_design_matrix` → `ridge::predict` → AI series
//! - provider series + AI series → `blend::blend` → blended series
//! - fit RMSE → `confidence::confidence` → overlay confidence
//!
//! Nothing here performs I/O or holds state between calls.

pub mod blend;
pub mod confidence;
pub mod features;
pub mod ridge;

use chrono::NaiveDateTime;

use self::blend::blend;
use self::confidence::confidence;
use self::ridge::{fit, predict, FitResult};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Minimum number of valid historical samples required to fit a model.
pub const MIN_HISTORY_SAMPLES: usize = 48;

/// Ridge penalty λ added to the diagonal of XᵗX.
pub const RIDGE_PENALTY: f64 = 1.25;

/// Relative humidity divisor (% → fraction).
pub const HUMIDITY_DIVISOR: f64 = 100.0;

/// Wind speed divisor (m/s); typical winds stay below 20 m/s.
pub const WIND_DIVISOR: f64 = 20.0;

/// Reference surface pressure (hPa) subtracted before scaling.
pub const PRESSURE_REFERENCE_HPA: f64 = 1013.25;

/// Surface pressure divisor (hPa).
pub const PRESSURE_DIVISOR: f64 = 20.0;

/// Cloud cover divisor (% → fraction).
pub const CLOUD_DIVISOR: f64 = 100.0;

/// Period of the hour-of-day cyclical encoding.
pub const HOUR_PERIOD: f64 = 24.0;

/// Period of the day-of-year cyclical encoding.
pub const DAY_OF_YEAR_PERIOD: f64 = 365.25;

/// Weight of the provider temperature in the blend.
pub const PROVIDER_BLEND_WEIGHT: f64 = 0.70;

/// Weight of the AI temperature in the blend.
pub const AI_BLEND_WEIGHT: f64 = 0.30;

/// RMSE (°C) at which confidence bottoms out.
pub const CONFIDENCE_DIVISOR: f64 = 6.0;

/// Lowest reported confidence.
pub const CONFIDENCE_FLOOR: f64 = 0.15;

/// Highest reported confidence.
pub const CONFIDENCE_CEILING: f64 = 0.95;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Fixed normalization applied to covariates and time features.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureScaling {
    pub humidity_divisor: f64,
    pub wind_divisor: f64,
    pub pressure_reference_hpa: f64,
    pub pressure_divisor: f64,
    pub cloud_divisor: f64,
    pub hour_period: f64,
    pub day_of_year_period: f64,
}

impl Default for FeatureScaling {
    fn default() -> Self {
        Self {
            humidity_divisor: HUMIDITY_DIVISOR,
            wind_divisor: WIND_DIVISOR,
            pressure_reference_hpa: PRESSURE_REFERENCE_HPA,
            pressure_divisor: PRESSURE_DIVISOR,
            cloud_divisor: CLOUD_DIVISOR,
            hour_period: HOUR_PERIOD,
            day_of_year_period: DAY_OF_YEAR_PERIOD,
        }
    }
}

/// All tunables of the engine in one place.
///
/// `Default` yields the production constants above. Tests build variants with
/// struct-update syntax and pass them to the same functions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub min_history_samples: usize,
    pub ridge_penalty: f64,
    pub scaling: FeatureScaling,
    pub provider_weight: f64,
    pub ai_weight: f64,
    pub confidence_divisor: f64,
    pub confidence_floor: f64,
    pub confidence_ceiling: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_history_samples: MIN_HISTORY_SAMPLES,
            ridge_penalty: RIDGE_PENALTY,
            scaling: FeatureScaling::default(),
            provider_weight: PROVIDER_BLEND_WEIGHT,
            ai_weight: AI_BLEND_WEIGHT,
            confidence_divisor: CONFIDENCE_DIVISOR,
            confidence_floor: CONFIDENCE_FLOOR,
            confidence_ceiling: CONFIDENCE_CEILING,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum EngineError {
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),
}

impl EngineConfig {
    /// Check the invariants the algorithms rely on.
    ///
    /// A positive, finite ridge penalty is what keeps `XᵗX + λI` positive
    /// definite, so it is rejected first.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !self.ridge_penalty.is_finite() || self.ridge_penalty <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "ridge_penalty must be a positive finite number, got {}",
                self.ridge_penalty
            )));
        }
        if self.min_history_samples == 0 {
            return Err(EngineError::InvalidConfig(
                "min_history_samples must be at least 1".to_string(),
            ));
        }
        if !(self.provider_weight >= 0.0 && self.ai_weight >= 0.0) {
            return Err(EngineError::InvalidConfig(
                "blend weights must be non-negative".to_string(),
            ));
        }
        if (self.provider_weight + self.ai_weight - 1.0).abs() > 1e-9 {
            return Err(EngineError::InvalidConfig(format!(
                "blend weights must sum to 1, got {} + {}",
                self.provider_weight, self.ai_weight
            )));
        }
        if !self.confidence_divisor.is_finite() || self.confidence_divisor <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "confidence_divisor must be a positive finite number, got {}",
                self.confidence_divisor
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_floor)
            || !(0.0..=1.0).contains(&self.confidence_ceiling)
            || self.confidence_floor > self.confidence_ceiling
        {
            return Err(EngineError::InvalidConfig(format!(
                "confidence bounds must satisfy 0 <= floor <= ceiling <= 1, got [{}, {}]",
                self.confidence_floor, self.confidence_ceiling
            )));
        }
        let s = &self.scaling;
        let divisors = [
            s.humidity_divisor,
            s.wind_divisor,
            s.pressure_divisor,
            s.cloud_divisor,
            s.hour_period,
            s.day_of_year_period,
        ];
        if divisors.iter().any(|d| !d.is_finite() || *d == 0.0) {
            return Err(EngineError::InvalidConfig(
                "feature divisors and periods must be finite and non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Data model
// ---------------------------------------------------------------------------

/// One hourly reading at a location.
///
/// `None` marks a value the provider did not report. For forecast-horizon
/// samples `temperature` is the provider's predicted temperature; for
/// historical samples it is the observed regression target.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Local (already time-zone-resolved) timestamp.
    pub timestamp: NaiveDateTime,
    /// Air temperature in °C.
    pub temperature: Option<f64>,
    /// Relative humidity in % (0–100).
    pub relative_humidity: Option<f64>,
    /// Wind speed in m/s.
    pub wind_speed: Option<f64>,
    /// Surface pressure in hPa.
    pub surface_pressure: Option<f64>,
    /// Cloud cover in % (0–100).
    pub cloud_cover: Option<f64>,
}

/// One hour of the final series shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct BlendedPoint {
    pub timestamp: NaiveDateTime,
    pub provider_temperature: f64,
    /// `None` when no model could be fit.
    pub ai_temperature: Option<f64>,
    pub blended_temperature: f64,
}

/// Why the AI overlay could not be produced this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    InsufficientHistory { valid_samples: usize, required: usize },
    IllConditioned,
}

/// Outcome of the overlay, kept distinct from a low-confidence score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Overlay {
    Available { confidence: f64, rmse: f64 },
    Unavailable(UnavailableReason),
}

impl Overlay {
    pub fn is_available(&self) -> bool {
        matches!(self, Overlay::Available { .. })
    }
}

/// Result of one full engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancedForecast {
    pub points: Vec<BlendedPoint>,
    pub overlay: Overlay,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run the whole engine for one refresh cycle.
///
/// Missing provider temperatures in the horizon are carried as NaN so the
/// hourly series stays aligned with the horizon timestamps.
pub fn enhance_forecast(
    config: &EngineConfig,
    history: &[Sample],
    horizon: &[Sample],
) -> EnhancedForecast {
    let provider: Vec<f64> = horizon
        .iter()
        .map(|s| s.temperature.unwrap_or(f64::NAN))
        .collect();

    let model = match fit(config, history) {
        FitResult::Fitted(model) => model,
        FitResult::InsufficientData {
            valid_samples,
            required,
        } => {
            tracing::debug!(
                "Not enough history to fit ({} valid samples, {} required)",
                valid_samples,
                required
            );
            return provider_only(
                horizon,
                &provider,
                UnavailableReason::InsufficientHistory {
                    valid_samples,
                    required,
                },
            );
        }
        FitResult::IllConditioned => {
            tracing::warn!("Ridge solve failed, serving provider forecast only");
            return provider_only(horizon, &provider, UnavailableReason::IllConditioned);
        }
    };

    let ai = predict(config, &model, horizon);
    let blended = blend(config, &provider, Some(ai.as_slice()));

    let points = horizon
        .iter()
        .zip(provider.iter())
        .zip(ai.iter())
        .zip(blended.values.iter())
        .map(|(((sample, &p), &a), &b)| BlendedPoint {
            timestamp: sample.timestamp,
            provider_temperature: p,
            ai_temperature: Some(a),
            blended_temperature: b,
        })
        .collect();

    let score = confidence(config, model.rmse);
    tracing::debug!(
        "Fitted on {} samples: rmse={:.3}°C, confidence={:.2}",
        model.sample_count,
        model.rmse,
        score
    );

    EnhancedForecast {
        points,
        overlay: Overlay::Available {
            confidence: score,
            rmse: model.rmse,
        },
    }
}

fn provider_only(
    horizon: &[Sample],
    provider: &[f64],
    reason: UnavailableReason,
) -> EnhancedForecast {
    let points = horizon
        .iter()
        .zip(provider.iter())
        .map(|(sample, &p)| BlendedPoint {
            timestamp: sample.timestamp,
            provider_temperature: p,
            ai_temperature: None,
            blended_temperature: p,
        })
        .collect();

    EnhancedForecast {
        points,
        overlay: Overlay::Unavailable(reason),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Sample;
    use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
    use std::f64::consts::PI;

    pub fn start_of(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    /// Noise-free diurnal temperature curve.
    pub fn true_temperature(ts: NaiveDateTime) -> f64 {
        20.0 + 5.0 * (2.0 * PI * ts.hour() as f64 / 24.0).sin()
    }

    /// Hourly samples with a diurnal temperature cycle, small deterministic
    /// noise and covariates following the same daily pattern.
    pub fn synthetic_samples(start: NaiveDateTime, hours: usize, noise: f64) -> Vec<Sample> {
        (0..hours)
            .map(|i| {
                let ts = start + Duration::hours(i as i64);
                let phase = 2.0 * PI * ts.hour() as f64 / 24.0;
                let jitter = noise * (i as f64 * 1.7).sin();
                Sample {
                    timestamp: ts,
                    temperature: Some(true_temperature(ts) + jitter),
                    relative_humidity: Some(65.0 - 15.0 * phase.sin()),
                    wind_speed: Some(4.0 + 2.0 * phase.cos()),
                    surface_pressure: Some(1012.0 + 1.5 * phase.cos()),
                    cloud_cover: Some(40.0 + 10.0 * (i as f64 * 0.3).cos()),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{start_of, synthetic_samples, true_temperature};
    use super::*;
    use chrono::Duration;

    fn rmse(a: &[f64], b: &[f64]) -> f64 {
        let n = a.len().min(b.len());
        let sum: f64 = a.iter().zip(b).take(n).map(|(x, y)| (x - y).powi(2)).sum();
        (sum / n as f64).sqrt()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_default_config_matches_constants() {
        let c = EngineConfig::default();
        assert_eq!(c.min_history_samples, 48);
        assert_eq!(c.ridge_penalty, 1.25);
        assert_eq!(c.provider_weight, 0.70);
        assert_eq!(c.ai_weight, 0.30);
        assert_eq!(c.confidence_divisor, 6.0);
        assert_eq!(c.confidence_floor, 0.15);
        assert_eq!(c.confidence_ceiling, 0.95);
        assert_eq!(c.scaling.humidity_divisor, 100.0);
        assert_eq!(c.scaling.wind_divisor, 20.0);
        assert_eq!(c.scaling.pressure_divisor, 20.0);
        assert_eq!(c.scaling.cloud_divisor, 100.0);
    }

    #[test]
    fn test_validate_rejects_zero_penalty() {
        let c = EngineConfig {
            ridge_penalty: 0.0,
            ..EngineConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nan_penalty() {
        let c = EngineConfig {
            ridge_penalty: f64::NAN,
            ..EngineConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unbalanced_weights() {
        let c = EngineConfig {
            provider_weight: 0.8,
            ai_weight: 0.3,
            ..EngineConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_confidence_bounds() {
        let c = EngineConfig {
            confidence_floor: 0.9,
            confidence_ceiling: 0.2,
            ..EngineConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_divisor() {
        let mut c = EngineConfig::default();
        c.scaling.wind_divisor = 0.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_end_to_end_learns_diurnal_cycle() {
        let config = EngineConfig::default();
        let start = start_of(2026, 1, 1);
        let history = synthetic_samples(start, 500, 0.4);
        let horizon = synthetic_samples(start + Duration::hours(500), 48, 0.0);

        let result = enhance_forecast(&config, &history, &horizon);
        assert!(result.overlay.is_available());
        assert_eq!(result.points.len(), 48);

        let truth: Vec<f64> = horizon.iter().map(|s| true_temperature(s.timestamp)).collect();
        let ai: Vec<f64> = result
            .points
            .iter()
            .map(|p| p.ai_temperature.unwrap())
            .collect();
        let flat_baseline = vec![20.0; truth.len()];

        let ai_error = rmse(&ai, &truth);
        let baseline_error = rmse(&flat_baseline, &truth);
        assert!(
            ai_error < baseline_error * 0.5,
            "AI rmse {:.3} should be well below flat baseline {:.3}",
            ai_error,
            baseline_error
        );
    }

    #[test]
    fn test_end_to_end_blend_and_confidence() {
        let config = EngineConfig::default();
        let start = start_of(2026, 3, 10);
        let history = synthetic_samples(start, 21 * 24, 0.2);
        let horizon = synthetic_samples(start + Duration::days(21), 7 * 24, 0.0);

        let result = enhance_forecast(&config, &history, &horizon);
        let (score, fit_rmse) = match result.overlay {
            Overlay::Available { confidence, rmse } => (confidence, rmse),
            other => panic!("Expected overlay, got {:?}", other),
        };
        assert!(fit_rmse >= 0.0);
        assert!((0.15..=0.95).contains(&score));
        // A clean diurnal signal fits well, so confidence sits near the ceiling.
        assert!(score > 0.8, "confidence {}", score);

        for p in &result.points {
            let a = p.ai_temperature.unwrap();
            let expected = 0.7 * p.provider_temperature + 0.3 * a;
            assert!((p.blended_temperature - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_insufficient_history_serves_provider_series() {
        let config = EngineConfig::default();
        let start = start_of(2026, 6, 1);
        let history = synthetic_samples(start, 30, 0.0);
        let horizon = synthetic_samples(start + Duration::hours(30), 24, 0.0);

        let result = enhance_forecast(&config, &history, &horizon);
        assert_eq!(
            result.overlay,
            Overlay::Unavailable(UnavailableReason::InsufficientHistory {
                valid_samples: 30,
                required: 48,
            })
        );
        assert_eq!(result.points.len(), 24);
        for (p, s) in result.points.iter().zip(&horizon) {
            assert_eq!(p.ai_temperature, None);
            assert_eq!(p.blended_temperature, s.temperature.unwrap());
            assert_eq!(p.provider_temperature, s.temperature.unwrap());
        }
    }

    #[test]
    fn test_empty_horizon_with_model() {
        let config = EngineConfig::default();
        let history = synthetic_samples(start_of(2026, 1, 1), 100, 0.1);

        let result = enhance_forecast(&config, &history, &[]);
        assert!(result.overlay.is_available());
        assert!(result.points.is_empty());
    }

    #[test]
    fn test_missing_provider_temperature_is_nan_not_dropped() {
        let config = EngineConfig::default();
        let start = start_of(2026, 1, 1);
        let history = synthetic_samples(start, 100, 0.1);
        let mut horizon = synthetic_samples(start + Duration::hours(100), 5, 0.0);
        horizon[2].temperature = None;

        let result = enhance_forecast(&config, &history, &horizon);
        assert_eq!(result.points.len(), 5);
        assert!(result.points[2].provider_temperature.is_nan());
        assert!(result.points[2].ai_temperature.unwrap().is_finite());
        assert!(result.points[3].blended_temperature.is_finite());
    }

    #[test]
    fn test_overridden_min_samples() {
        let config = EngineConfig {
            min_history_samples: 10,
            ..EngineConfig::default()
        };
        let start = start_of(2026, 1, 1);
        let history = synthetic_samples(start, 12, 0.0);
        let horizon = synthetic_samples(start + Duration::hours(12), 3, 0.0);

        let result = enhance_forecast(&config, &history, &horizon);
        assert!(result.overlay.is_available());
    }
}
