use anyhow::{ensure, Result};
use statrs::statistics::Statistics;

/// Holdout-set fit quality for a regression run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
}

/// Treats near-zero magnitudes as zero when deciding whether the target
/// or the residuals are degenerate.
const DEGENERATE_EPSILON: f64 = 1e-12;

/// Scores `predicted` against `actual`. The slices must be non-empty
/// and positionally aligned over the same holdout rows.
///
/// When the actual values carry no variance, R² has no defined scale;
/// an exact fit reports 1.0 and anything else reports 0.0.
pub fn evaluate_regression(actual: &[f64], predicted: &[f64]) -> Result<RegressionMetrics> {
    ensure!(
        actual.len() == predicted.len(),
        "Regression metrics need aligned slices, got {} actual vs {} predicted",
        actual.len(),
        predicted.len()
    );
    ensure!(!actual.is_empty(), "Regression metrics need at least one row");

    let residuals: Vec<f64> = actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| a - p)
        .collect();

    let mse = residuals.iter().map(|r| r * r).sum::<f64>() / residuals.len() as f64;
    let rmse = mse.sqrt();
    let mae = residuals.iter().map(|r| r.abs()).sum::<f64>() / residuals.len() as f64;

    let mean_actual = actual.mean();
    let ss_res = residuals.iter().map(|r| r * r).sum::<f64>();
    let ss_tot = actual
        .iter()
        .map(|a| {
            let diff = a - mean_actual;
            diff * diff
        })
        .sum::<f64>();

    let r2 = if ss_tot > DEGENERATE_EPSILON {
        1.0 - ss_res / ss_tot
    } else if ss_res <= DEGENERATE_EPSILON {
        1.0
    } else {
        0.0
    };

    Ok(RegressionMetrics { rmse, mae, r2 })
}
