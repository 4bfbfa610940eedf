mod common;

use alpha_engine::config::AppConfig;
use alpha_engine::error::AnalysisError;
use alpha_engine::pipeline::{run_analysis, AnalysisRequest, DEFAULT_LAG_COUNT};
use alpha_engine::polygon::PolygonClient;
use anyhow::Result;
use chrono::Duration as ChronoDuration;
use common::{
    bar_start_date, ensure_test_env, synthetic_closes, wait_for_polygon_stub, PolygonStub,
    PolygonStubResponses,
};
use std::collections::HashMap;

const ASSET_DAYS: usize = 60;

fn stub_config(base_url: &str) -> Result<AppConfig> {
    let settings: HashMap<String, String> = [
        ("POLYGON_API_KEY".to_string(), "test-key".to_string()),
        ("POLYGON_BASE_URL".to_string(), base_url.to_string()),
    ]
    .into_iter()
    .collect();
    AppConfig::from_settings_map(&settings)
}

fn analysis_request(ticker: &str, days: usize) -> AnalysisRequest {
    let from = bar_start_date();
    AnalysisRequest {
        ticker: ticker.to_string(),
        from,
        to: from + ChronoDuration::days(days as i64),
        lags: DEFAULT_LAG_COUNT,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn analysis_end_to_end_against_stub() -> Result<()> {
    ensure_test_env();
    let responses = PolygonStubResponses::default()
        .with_closes("AAPL", &synthetic_closes(ASSET_DAYS, 150.0, 0.8))
        .with_closes("SPY", &synthetic_closes(ASSET_DAYS, 480.0, 0.5));
    let stub = PolygonStub::start(responses)?;
    wait_for_polygon_stub(&stub.base_url).await?;

    let config = stub_config(&stub.base_url)?;
    let client = PolygonClient::new(&config)?;
    let report = run_analysis(&client, &config, &analysis_request("AAPL", ASSET_DAYS)).await?;

    // 60 bars, 19 warm-up rows, 5 lags: 36 samples, 28 train / 8 test.
    let response = &report.response;
    assert_eq!(response.predicted.len(), 8);
    assert_eq!(response.actual.len(), 8);
    assert_eq!(response.dates.len(), 8);
    assert!(response
        .dates
        .windows(2)
        .all(|pair| pair[0] < pair[1]));

    assert_eq!(response.feature_labels.len(), 8 + DEFAULT_LAG_COUNT);
    assert_eq!(response.feature_labels[0], "open");
    for expected in ["SMA_10", "SMA_20", "return", "RSI_14", "close_lag_5"] {
        assert!(
            response.feature_labels.iter().any(|label| label == expected),
            "missing feature label {}",
            expected
        );
    }
    assert_eq!(
        response.feature_scores.len(),
        response.feature_labels.len()
    );
    let score_total: f64 = response.feature_scores.iter().sum();
    assert!(
        (score_total - 1.0).abs() < 1e-9,
        "importances should be normalized, got {}",
        score_total
    );

    let metrics = &response.metrics;
    assert!(metrics.rmse.is_finite() && metrics.rmse >= 0.0);
    assert!(metrics.mae.is_finite() && metrics.mae >= 0.0);
    assert!(metrics.r2.is_finite() && metrics.r2 <= 1.0);
    assert!(metrics.mean_alpha.is_some());

    let rows = &report.backtest.rows;
    assert_eq!(rows.len(), 8);
    assert!(rows[0].alpha.is_none(), "first test row has no prior close");
    assert!(rows.iter().skip(1).all(|row| row.alpha.is_some()));
    for (row, actual) in rows.iter().zip(&response.actual) {
        assert_eq!(row.close, *actual);
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn analysis_is_deterministic_across_runs() -> Result<()> {
    ensure_test_env();
    let responses = PolygonStubResponses::default()
        .with_closes("AAPL", &synthetic_closes(ASSET_DAYS, 150.0, 0.8))
        .with_closes("SPY", &synthetic_closes(ASSET_DAYS, 480.0, 0.5));
    let stub = PolygonStub::start(responses)?;
    wait_for_polygon_stub(&stub.base_url).await?;

    let config = stub_config(&stub.base_url)?;
    let client = PolygonClient::new(&config)?;
    let request = analysis_request("AAPL", ASSET_DAYS);

    let first = run_analysis(&client, &config, &request).await?;
    let second = run_analysis(&client, &config, &request).await?;

    assert_eq!(first.response.predicted, second.response.predicted);
    assert_eq!(first.response.feature_scores, second.response.feature_scores);
    assert_eq!(
        first.response.metrics.rmse.to_bits(),
        second.response.metrics.rmse.to_bits()
    );
    assert_eq!(
        first.response.metrics.mean_alpha,
        second.response.metrics.mean_alpha
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_ticker_reports_no_data() -> Result<()> {
    ensure_test_env();
    let responses = PolygonStubResponses::default()
        .with_closes("SPY", &synthetic_closes(ASSET_DAYS, 480.0, 0.5));
    let stub = PolygonStub::start(responses)?;
    wait_for_polygon_stub(&stub.base_url).await?;

    let config = stub_config(&stub.base_url)?;
    let client = PolygonClient::new(&config)?;
    let err = run_analysis(&client, &config, &analysis_request("FAKE", ASSET_DAYS))
        .await
        .expect_err("expected missing asset data to fail");

    match err.downcast_ref::<AnalysisError>() {
        Some(AnalysisError::NoData { symbol }) => assert_eq!(symbol, "FAKE"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(err.to_string(), "No data found for FAKE");

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_benchmark_reports_no_data() -> Result<()> {
    ensure_test_env();
    let responses =
        PolygonStubResponses::default().with_closes("AAPL", &[100.0, 101.0, 102.0]);
    let stub = PolygonStub::start(responses)?;
    wait_for_polygon_stub(&stub.base_url).await?;

    let config = stub_config(&stub.base_url)?;
    let client = PolygonClient::new(&config)?;
    let err = run_analysis(&client, &config, &analysis_request("AAPL", 3))
        .await
        .expect_err("expected missing benchmark data to fail");

    match err.downcast_ref::<AnalysisError>() {
        Some(AnalysisError::NoData { symbol }) => assert_eq!(symbol, "SPY"),
        other => panic!("unexpected error: {:?}", other),
    }

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn short_history_reports_insufficient_history() -> Result<()> {
    ensure_test_env();
    let responses = PolygonStubResponses::default()
        .with_closes("AAPL", &synthetic_closes(20, 150.0, 0.8))
        .with_closes("SPY", &synthetic_closes(20, 480.0, 0.5));
    let stub = PolygonStub::start(responses)?;
    wait_for_polygon_stub(&stub.base_url).await?;

    let config = stub_config(&stub.base_url)?;
    let client = PolygonClient::new(&config)?;
    let err = run_analysis(&client, &config, &analysis_request("AAPL", 20))
        .await
        .expect_err("expected short history to fail");

    match err.downcast_ref::<AnalysisError>() {
        Some(AnalysisError::InsufficientHistory { symbol, rows }) => {
            assert_eq!(symbol, "AAPL");
            assert_eq!(*rows, 20);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    Ok(())
}
