//! Ridge fitter and predictor.
//!
//! Closed-form ridge regression on the feature schema of `features`:
//! `w = (XᵗX + λI)⁻¹ Xᵗy`. With λ > 0 the system matrix is symmetric positive
//! definite, so a Cholesky solve always succeeds for finite inputs.

use nalgebra::{DMatrix, DVector};

use super::features::{DesignMatrix, FeatureRow, FEATURE_COUNT};
use super::{EngineConfig, Sample};

/// Weights and in-sample error of one fit. Not mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel {
    pub weights: [f64; FEATURE_COUNT],
    /// In-sample root-mean-square error in °C.
    pub rmse: f64,
    /// Number of rows the model was fit on.
    pub sample_count: usize,
}

/// Outcome of `fit`; callers must handle every case.
#[derive(Debug, Clone, PartialEq)]
pub enum FitResult {
    Fitted(FittedModel),
    /// Fewer valid samples than `EngineConfig::min_history_samples`.
    InsufficientData { valid_samples: usize, required: usize },
    /// Both the Cholesky and LU solves failed.
    IllConditioned,
}

/// Fit the model on a historical window.
///
/// Samples with a missing or non-finite temperature are dropped before the
/// sample-count gate; covariates are zero-imputed by the feature builder.
pub fn fit(config: &EngineConfig, history: &[Sample]) -> FitResult {
    let full = DesignMatrix::from_samples(history, &config.scaling);
    let (rows, targets): (Vec<FeatureRow>, Vec<f64>) = full
        .rows()
        .iter()
        .zip(history)
        .filter_map(|(row, s)| match s.temperature {
            Some(t) if t.is_finite() => Some((*row, t)),
            _ => None,
        })
        .unzip();

    if targets.len() < config.min_history_samples {
        return FitResult::InsufficientData {
            valid_samples: targets.len(),
            required: config.min_history_samples,
        };
    }

    let x = DesignMatrix::from(rows).to_dmatrix();
    let y = DVector::from_vec(targets);

    let Some(w) = solve_ridge(&x, &y, config.ridge_penalty) else {
        return FitResult::IllConditioned;
    };

    let residuals = &x * &w - &y;
    let rmse = (residuals.norm_squared() / y.len() as f64).sqrt();

    let mut weights = [0.0; FEATURE_COUNT];
    weights.copy_from_slice(w.as_slice());

    FitResult::Fitted(FittedModel {
        weights,
        rmse,
        sample_count: y.len(),
    })
}

/// Solve `(XᵗX + λI) w = Xᵗy`.
///
/// Cholesky first; LU as a fallback for matrices that lost definiteness to
/// rounding.
fn solve_ridge(x: &DMatrix<f64>, y: &DVector<f64>, penalty: f64) -> Option<DVector<f64>> {
    let xt = x.transpose();
    let mut gram = &xt * x;
    for i in 0..gram.nrows() {
        gram[(i, i)] += penalty;
    }
    let rhs = &xt * y;

    if let Some(chol) = gram.clone().cholesky() {
        return Some(chol.solve(&rhs));
    }
    gram.lu().solve(&rhs)
}

/// Predict temperatures (°C) for a forecast horizon.
///
/// Uses the same feature schema as `fit`. No clipping is applied.
pub fn predict(config: &EngineConfig, model: &FittedModel, horizon: &[Sample]) -> Vec<f64> {
    if horizon.is_empty() {
        return Vec::new();
    }
    let design = DesignMatrix::from_samples(horizon, &config.scaling);
    predict_matrix(model, &design)
}

/// `ŷ = X w` for an already-built design matrix.
pub fn predict_matrix(model: &FittedModel, design: &DesignMatrix) -> Vec<f64> {
    design
        .rows()
        .iter()
        .map(|row| row.iter().zip(model.weights.iter()).map(|(x, w)| x * w).sum())
        .collect()
}
