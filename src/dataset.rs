use crate::features::LaggedRow;
use crate::indicators::IndicatorConfig;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One supervised-learning row. `features` is positionally aligned with
/// `Dataset::feature_names`; `target` is the current-period close, which
/// never appears among the features. `close` and `benchmark_return`
/// carry the realized row values the backtest needs at the same index
/// and order as the features.
#[derive(Debug, Clone)]
pub struct DatasetRow {
    pub timestamp: DateTime<Utc>,
    pub features: Vec<f64>,
    pub target: f64,
    pub close: f64,
    pub benchmark_return: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub feature_names: Vec<String>,
    pub rows: Vec<DatasetRow>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Feature column order is part of the wire contract: raw bar fields
/// first, then the indicator columns, then the lag columns.
pub fn feature_names(config: &IndicatorConfig, lags: usize) -> Vec<String> {
    let mut names = vec![
        "open".to_string(),
        "high".to_string(),
        "low".to_string(),
        "volume".to_string(),
        format!("SMA_{}", config.sma_short),
        format!("SMA_{}", config.sma_long),
        "return".to_string(),
        format!("RSI_{}", config.rsi_window),
    ];
    for k in 1..=lags {
        names.push(format!("close_lag_{}", k));
    }
    names
}

/// Flattens lagged rows into the feature matrix / target vector / row
/// table triple, all sharing one index and order. The benchmark close is
/// joined by timestamp and differenced positionally over the surviving
/// rows; rows where the benchmark has no bar (or no prior joined value)
/// get an undefined benchmark return, never a zero.
pub fn assemble_dataset(
    lagged: &[LaggedRow],
    config: &IndicatorConfig,
    lags: usize,
    benchmark_closes: &HashMap<DateTime<Utc>, f64>,
) -> Dataset {
    let mut rows = Vec::with_capacity(lagged.len());
    let mut prev_benchmark: Option<f64> = None;

    for entry in lagged {
        let row = &entry.row;
        let mut features = Vec::with_capacity(8 + entry.lags.len());
        features.push(row.open);
        features.push(row.high);
        features.push(row.low);
        features.push(row.volume);
        features.push(row.sma_short);
        features.push(row.sma_long);
        features.push(row.daily_return);
        features.push(row.rsi);
        features.extend_from_slice(&entry.lags);

        let benchmark_close = benchmark_closes.get(&row.timestamp).copied();
        let benchmark_return = match (prev_benchmark, benchmark_close) {
            (Some(prev), Some(current)) if prev != 0.0 => Some((current - prev) / prev),
            _ => None,
        };
        prev_benchmark = benchmark_close;

        rows.push(DatasetRow {
            timestamp: row.timestamp,
            features,
            target: row.close,
            close: row.close,
            benchmark_return,
        });
    }

    Dataset {
        feature_names: feature_names(config, lags),
        rows,
    }
}

/// First `fraction` of rows (by time order) is the training set, the
/// rest is the test set. The index truncates, and nothing is shuffled —
/// shuffling a time series split would leak future rows into training.
pub fn chronological_split(rows: &[DatasetRow], train_fraction: f64) -> (&[DatasetRow], &[DatasetRow]) {
    let split_idx = ((rows.len() as f64) * train_fraction) as usize;
    let split_idx = split_idx.min(rows.len());
    rows.split_at(split_idx)
}
