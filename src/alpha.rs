use crate::dataset::DatasetRow;
use anyhow::{ensure, Result};
use chrono::{DateTime, Utc};
use log::debug;

/// One test-period timestamp with its realized and predicted closes and
/// the period-over-period returns derived from them. Returns are
/// undefined (`None`) at the first test row and wherever the prior
/// value is zero; undefined never collapses to 0.0.
#[derive(Debug, Clone)]
pub struct BacktestRow {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub predicted_close: f64,
    pub strategy_return: Option<f64>,
    pub benchmark_return: Option<f64>,
    pub alpha: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct AlphaReport {
    pub rows: Vec<BacktestRow>,
    pub mean_alpha: Option<f64>,
}

/// Per test row t: strategy return = % change of the predicted close,
/// benchmark return = % change of the realized close, alpha = their
/// spread. Both returns stay inside the test window; the first test row
/// never reaches back into training data for a prior value.
/// `mean_alpha` averages the defined alphas only and is `None` when the
/// test set has at most one row (or no alpha is defined).
pub fn compute_strategy_alpha(
    test_rows: &[DatasetRow],
    predictions: &[f64],
) -> Result<AlphaReport> {
    ensure!(
        test_rows.len() == predictions.len(),
        "Alpha computation needs aligned inputs, got {} rows vs {} predictions",
        test_rows.len(),
        predictions.len()
    );

    let mut rows = Vec::with_capacity(test_rows.len());
    for (t, (row, &predicted_close)) in test_rows.iter().zip(predictions.iter()).enumerate() {
        let (strategy_return, benchmark_return) = if t == 0 {
            (None, None)
        } else {
            (
                pct_change(predictions[t - 1], predicted_close),
                pct_change(test_rows[t - 1].close, row.close),
            )
        };
        let alpha = match (strategy_return, benchmark_return) {
            (Some(strategy), Some(benchmark)) => Some(strategy - benchmark),
            _ => None,
        };

        rows.push(BacktestRow {
            timestamp: row.timestamp,
            close: row.close,
            predicted_close,
            strategy_return,
            benchmark_return,
            alpha,
        });
    }

    let defined: Vec<f64> = rows.iter().filter_map(|row| row.alpha).collect();
    let mean_alpha = if defined.is_empty() {
        debug!(
            "No defined alpha over {} test rows; reporting mean alpha as undefined",
            rows.len()
        );
        None
    } else {
        Some(defined.iter().sum::<f64>() / defined.len() as f64)
    };

    Ok(AlphaReport { rows, mean_alpha })
}

fn pct_change(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        None
    } else {
        Some((current - previous) / previous)
    }
}
