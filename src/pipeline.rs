use crate::alpha::{compute_strategy_alpha, AlphaReport};
use crate::config::AppConfig;
use crate::dataset::{assemble_dataset, chronological_split};
use crate::error::AnalysisError;
use crate::features::{build_indicator_rows, build_lagged_rows};
use crate::gbdt::{BoosterParams, GradientBoostedTrees, Regressor};
use crate::indicators::IndicatorConfig;
use crate::metrics::evaluate_regression;
use crate::models::{AnalysisMetrics, AnalyzeResponse};
use crate::polygon::PolygonClient;
use crate::series::{normalize_ticker_symbol, BarSeries};
use anyhow::{anyhow, ensure, Result};
use chrono::NaiveDate;
use log::info;

pub const DEFAULT_LAG_COUNT: usize = 5;
const TRAIN_FRACTION: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub ticker: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub lags: usize,
}

/// Everything one analysis run produces: the wire response plus the
/// per-row backtest table the console rendering needs.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub response: AnalyzeResponse,
    pub backtest: AlphaReport,
}

/// Fetches asset and benchmark bars concurrently, then runs the
/// train/predict/alpha pipeline over them. Fails fast: an empty series
/// maps to `NoData`, and provider or model errors abort the run with no
/// partial results.
pub async fn run_analysis(
    client: &PolygonClient,
    config: &AppConfig,
    request: &AnalysisRequest,
) -> Result<AnalysisReport> {
    let symbol = normalize_ticker_symbol(&request.ticker)
        .ok_or_else(|| anyhow!("Invalid ticker symbol: {}", request.ticker))?;
    ensure!(
        request.from <= request.to,
        "From date {} must not be after to date {}",
        request.from,
        request.to
    );

    let (asset, (benchmark_daily, _benchmark_quarterly)) = tokio::try_join!(
        client.fetch_daily_bars(&symbol, request.from, request.to),
        client.fetch_benchmark_series(&config.benchmark_ticker, request.from, request.to),
    )?;

    if asset.is_empty() {
        return Err(AnalysisError::NoData { symbol }.into());
    }
    if benchmark_daily.is_empty() {
        return Err(AnalysisError::NoData {
            symbol: config.benchmark_ticker.clone(),
        }
        .into());
    }

    analyze_series(&symbol, &asset, &benchmark_daily, request.lags)
}

/// The in-memory pipeline: indicators, lags, dataset assembly,
/// chronological split, boosted-tree fit, holdout scoring, alpha.
pub fn analyze_series(
    symbol: &str,
    asset: &BarSeries,
    benchmark: &BarSeries,
    lags: usize,
) -> Result<AnalysisReport> {
    let indicator_config = IndicatorConfig::default();
    let engineered = build_indicator_rows(asset, &indicator_config);
    let lagged = build_lagged_rows(&engineered, lags);
    if lagged.is_empty() {
        return Err(AnalysisError::InsufficientHistory {
            symbol: symbol.to_string(),
            rows: asset.len(),
        }
        .into());
    }

    let dataset = assemble_dataset(&lagged, &indicator_config, lags, &benchmark.close_index());
    let (train, test) = chronological_split(&dataset.rows, TRAIN_FRACTION);
    if train.is_empty() || test.is_empty() {
        return Err(AnalysisError::InsufficientHistory {
            symbol: symbol.to_string(),
            rows: asset.len(),
        }
        .into());
    }

    let train_features: Vec<Vec<f64>> = train.iter().map(|row| row.features.clone()).collect();
    let train_targets: Vec<f64> = train.iter().map(|row| row.target).collect();
    let test_features: Vec<Vec<f64>> = test.iter().map(|row| row.features.clone()).collect();
    let test_targets: Vec<f64> = test.iter().map(|row| row.target).collect();

    let mut model = GradientBoostedTrees::new(BoosterParams::default());
    model.fit(&train_features, &train_targets)?;
    let predicted = model.predict(&test_features);

    let metrics = evaluate_regression(&test_targets, &predicted)?;
    let backtest = compute_strategy_alpha(test, &predicted)?;

    info!(
        "Analyzed {}: {} bars -> {} dataset rows ({} train / {} test), rmse {:.4}",
        symbol,
        asset.len(),
        dataset.len(),
        train.len(),
        test.len(),
        metrics.rmse
    );

    let response = AnalyzeResponse {
        metrics: AnalysisMetrics {
            rmse: metrics.rmse,
            mae: metrics.mae,
            r2: metrics.r2,
            mean_alpha: backtest.mean_alpha,
        },
        predicted,
        actual: test_targets,
        dates: test
            .iter()
            .map(|row| row.timestamp.format("%Y-%m-%d").to_string())
            .collect(),
        feature_labels: dataset.feature_names.clone(),
        feature_scores: model.feature_importances(),
    };

    Ok(AnalysisReport { response, backtest })
}
