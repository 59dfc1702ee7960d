//! Feature builder: timestamps + covariates → fixed-width design matrix.
//!
//! Column schema (identical for fitting and prediction):
//!
//! | col | feature                          |
//! |-----|----------------------------------|
//! | 0   | bias (1.0)                       |
//! | 1   | sin(2π · hour / 24)              |
//! | 2   | cos(2π · hour / 24)              |
//! | 3   | sin(2π · day_of_year / 365.25)   |
//! | 4   | cos(2π · day_of_year / 365.25)   |
//! | 5   | humidity / 100                   |
//! | 6   | wind / 20                        |
//! | 7   | (pressure − 1013.25) / 20        |
//! | 8   | cloud / 100                      |
//!
//! Missing or non-finite covariates become 0.0 after normalization, i.e. they
//! sit at the neutral point of their column rather than being imputed.

use chrono::{Datelike, NaiveDateTime, Timelike};
use std::f64::consts::PI;

use super::{FeatureScaling, Sample};

/// Number of columns in every design matrix.
pub const FEATURE_COUNT: usize = 9;

/// Column indices of the feature schema.
pub mod column {
    pub const BIAS: usize = 0;
    pub const HOUR_SIN: usize = 1;
    pub const HOUR_COS: usize = 2;
    pub const DAY_SIN: usize = 3;
    pub const DAY_COS: usize = 4;
    pub const HUMIDITY: usize = 5;
    pub const WIND: usize = 6;
    pub const PRESSURE: usize = 7;
    pub const CLOUD: usize = 8;
}

/// One row of the design matrix.
pub type FeatureRow = [f64; FEATURE_COUNT];

/// Row-major design matrix with a fixed column count.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DesignMatrix {
    rows: Vec<FeatureRow>,
}

impl DesignMatrix {
    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Build from a sample series, reading the four covariates of each sample.
    pub fn from_samples(samples: &[Sample], scaling: &FeatureScaling) -> Self {
        let rows = samples
            .iter()
            .map(|s| {
                feature_row(
                    s.timestamp,
                    s.relative_humidity,
                    s.wind_speed,
                    s.surface_pressure,
                    s.cloud_cover,
                    scaling,
                )
            })
            .collect();
        Self { rows }
    }

    /// Copy into a dense nalgebra matrix (n × FEATURE_COUNT).
    pub(crate) fn to_dmatrix(&self) -> nalgebra::DMatrix<f64> {
        nalgebra::DMatrix::from_row_iterator(
            self.rows.len(),
            FEATURE_COUNT,
            self.rows.iter().flatten().copied(),
        )
    }
}

impl From<Vec<FeatureRow>> for DesignMatrix {
    fn from(rows: Vec<FeatureRow>) -> Self {
        Self { rows }
    }
}

/// Build a design matrix from parallel arrays.
///
/// Callers align the arrays beforehand; if lengths still differ the matrix is
/// built over the common prefix.
pub fn build_design_matrix(
    timestamps: &[NaiveDateTime],
    humidity: &[Option<f64>],
    wind: &[Option<f64>],
    pressure: &[Option<f64>],
    cloud: &[Option<f64>],
    scaling: &FeatureScaling,
) -> DesignMatrix {
    let n = timestamps
        .len()
        .min(humidity.len())
        .min(wind.len())
        .min(pressure.len())
        .min(cloud.len());

    let rows = (0..n)
        .map(|i| {
            feature_row(
                timestamps[i],
                humidity[i],
                wind[i],
                pressure[i],
                cloud[i],
                scaling,
            )
        })
        .collect();

    DesignMatrix { rows }
}

/// Encode one timestamp + covariates into a feature row.
pub fn feature_row(
    timestamp: NaiveDateTime,
    humidity: Option<f64>,
    wind: Option<f64>,
    pressure: Option<f64>,
    cloud: Option<f64>,
    scaling: &FeatureScaling,
) -> FeatureRow {
    let (hour_sin, hour_cos) = cyclical(timestamp.hour() as f64, scaling.hour_period);
    let (day_sin, day_cos) = cyclical(timestamp.ordinal() as f64, scaling.day_of_year_period);

    [
        1.0,
        hour_sin,
        hour_cos,
        day_sin,
        day_cos,
        normalize(humidity, 0.0, scaling.humidity_divisor),
        normalize(wind, 0.0, scaling.wind_divisor),
        normalize(
            pressure,
            scaling.pressure_reference_hpa,
            scaling.pressure_divisor,
        ),
        normalize(cloud, 0.0, scaling.cloud_divisor),
    ]
}

/// (sin, cos) of `value` on a circle of the given period.
fn cyclical(value: f64, period: f64) -> (f64, f64) {
    let angle = 2.0 * PI * value / period;
    (angle.sin(), angle.cos())
}

/// Scale a covariate, mapping missing and non-finite results to 0.0.
fn normalize(value: Option<f64>, reference: f64, divisor: f64) -> f64 {
    match value {
        Some(v) => {
            let scaled = (v - reference) / divisor;
            if scaled.is_finite() {
                scaled
            } else {
                0.0
            }
        }
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn scaling() -> FeatureScaling {
        FeatureScaling::default()
    }

    #[test]
    fn test_hour_zero_encoding() {
        let row = feature_row(ts(2026, 1, 28, 0), None, None, None, None, &scaling());
        assert_eq!(row[column::BIAS], 1.0);
        assert!(row[column::HOUR_SIN].abs() < 1e-12);
        assert!((row[column::HOUR_COS] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_hour_six_encoding() {
        let row = feature_row(ts(2026, 1, 28, 6), None, None, None, None, &scaling());
        assert!((row[column::HOUR_SIN] - 1.0).abs() < 1e-12);
        assert!(row[column::HOUR_COS].abs() < 1e-12);
    }

    #[test]
    fn test_midnight_wraps_smoothly() {
        let late = feature_row(ts(2026, 1, 28, 23), None, None, None, None, &scaling());
        let early = feature_row(ts(2026, 1, 29, 0), None, None, None, None, &scaling());
        let dist = ((late[column::HOUR_SIN] - early[column::HOUR_SIN]).powi(2)
            + (late[column::HOUR_COS] - early[column::HOUR_COS]).powi(2))
        .sqrt();
        // Chord length between adjacent hours: 2·sin(π/24)
        assert!((dist - 2.0 * (PI / 24.0).sin()).abs() < 1e-12);
    }

    #[test]
    fn test_day_of_year_encoding() {
        // 28 Jan → ordinal 28
        let row = feature_row(ts(2026, 1, 28, 15), None, None, None, None, &scaling());
        let angle = 2.0 * PI * 28.0 / 365.25;
        assert!((row[column::DAY_SIN] - angle.sin()).abs() < 1e-12);
        assert!((row[column::DAY_COS] - angle.cos()).abs() < 1e-12);
    }

    #[test]
    fn test_year_boundary_is_continuous() {
        let dec31 = feature_row(ts(2025, 12, 31, 12), None, None, None, None, &scaling());
        let jan1 = feature_row(ts(2026, 1, 1, 12), None, None, None, None, &scaling());
        assert!((dec31[column::DAY_SIN] - jan1[column::DAY_SIN]).abs() < 0.05);
        assert!((dec31[column::DAY_COS] - jan1[column::DAY_COS]).abs() < 0.05);
    }

    #[test]
    fn test_covariate_normalization() {
        let row = feature_row(
            ts(2026, 1, 28, 12),
            Some(80.0),
            Some(5.0),
            Some(1003.25),
            Some(25.0),
            &scaling(),
        );
        assert!((row[column::HUMIDITY] - 0.8).abs() < 1e-12);
        assert!((row[column::WIND] - 0.25).abs() < 1e-12);
        assert!((row[column::PRESSURE] - (-0.5)).abs() < 1e-12);
        assert!((row[column::CLOUD] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_missing_covariates_become_zero() {
        let row = feature_row(
            ts(2026, 1, 28, 12),
            None,
            Some(f64::NAN),
            Some(f64::INFINITY),
            None,
            &scaling(),
        );
        assert_eq!(row[column::HUMIDITY], 0.0);
        assert_eq!(row[column::WIND], 0.0);
        assert_eq!(row[column::PRESSURE], 0.0);
        assert_eq!(row[column::CLOUD], 0.0);
    }

    #[test]
    fn test_missing_pressure_is_neutral_not_offset() {
        // Missing pressure must land at 0, not at (0 − 1013.25) / 20.
        let row = feature_row(ts(2026, 1, 28, 12), None, None, None, None, &scaling());
        assert_eq!(row[column::PRESSURE], 0.0);
    }

    #[test]
    fn test_build_preserves_row_order() {
        let times: Vec<_> = (0..4).map(|h| ts(2026, 2, 1, h)).collect();
        let hum = vec![Some(10.0), Some(20.0), Some(30.0), Some(40.0)];
        let none = vec![None; 4];
        let m = build_design_matrix(&times, &hum, &none, &none, &none, &scaling());
        assert_eq!(m.len(), 4);
        for (i, row) in m.rows().iter().enumerate() {
            assert!((row[column::HUMIDITY] - (i as f64 + 1.0) / 10.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_build_truncates_to_shortest_array() {
        let times: Vec<_> = (0..5).map(|h| ts(2026, 2, 1, h)).collect();
        let five = vec![Some(1.0); 5];
        let three = vec![Some(1.0); 3];
        let m = build_design_matrix(&times, &five, &three, &five, &five, &scaling());
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn test_build_empty() {
        let m = build_design_matrix(&[], &[], &[], &[], &[], &scaling());
        assert!(m.is_empty());
    }

    #[test]
    fn test_from_samples_matches_parallel_arrays() {
        let samples: Vec<Sample> = (0..6)
            .map(|h| Sample {
                timestamp: ts(2026, 7, 4, h),
                temperature: Some(25.0),
                relative_humidity: Some(50.0 + h as f64),
                wind_speed: if h % 2 == 0 { Some(3.0) } else { None },
                surface_pressure: Some(1010.0),
                cloud_cover: Some(h as f64 * 10.0),
            })
            .collect();
        let times: Vec<_> = samples.iter().map(|s| s.timestamp).collect();
        let hum: Vec<_> = samples.iter().map(|s| s.relative_humidity).collect();
        let wind: Vec<_> = samples.iter().map(|s| s.wind_speed).collect();
        let pres: Vec<_> = samples.iter().map(|s| s.surface_pressure).collect();
        let cloud: Vec<_> = samples.iter().map(|s| s.cloud_cover).collect();

        let a = DesignMatrix::from_samples(&samples, &scaling());
        let b = build_design_matrix(&times, &hum, &wind, &pres, &cloud, &scaling());
        assert_eq!(a, b);
    }

    #[test]
    fn test_to_dmatrix_layout() {
        let times = vec![ts(2026, 1, 1, 0), ts(2026, 1, 1, 6)];
        let hum = vec![Some(50.0), Some(100.0)];
        let none = vec![None; 2];
        let m = build_design_matrix(&times, &hum, &none, &none, &none, &scaling());
        let dm = m.to_dmatrix();
        assert_eq!(dm.nrows(), 2);
        assert_eq!(dm.ncols(), FEATURE_COUNT);
        assert_eq!(dm[(0, column::BIAS)], 1.0);
        assert!((dm[(1, column::HUMIDITY)] - 1.0).abs() < 1e-12);
        assert!((dm[(1, column::HOUR_SIN)] - 1.0).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_rows_are_deterministic_and_finite(
            day in 0i64..730,
            hour in 0u32..24,
            hum in proptest::option::of(-50.0..150.0f64),
            wind in proptest::option::of(0.0..80.0f64),
            pres in proptest::option::of(900.0..1100.0f64),
            cloud in proptest::option::of(0.0..100.0f64),
        ) {
            let t = ts(2025, 1, 1, hour) + chrono::Duration::days(day);
            let a = feature_row(t, hum, wind, pres, cloud, &scaling());
            let b = feature_row(t, hum, wind, pres, cloud, &scaling());
            for (x, y) in a.iter().zip(b.iter()) {
                prop_assert_eq!(x.to_bits(), y.to_bits());
                prop_assert!(x.is_finite());
            }
            prop_assert_eq!(a[column::BIAS], 1.0);
        }
    }
}
