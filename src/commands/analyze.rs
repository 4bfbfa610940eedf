use crate::config::AppConfig;
use crate::pipeline::{run_analysis, AnalysisRequest};
use crate::polygon::PolygonClient;
use anyhow::Result;
use chrono::NaiveDate;
use log::info;

const BACKTEST_TAIL_ROWS: usize = 5;
const TOP_FEATURE_COUNT: usize = 5;

pub async fn run(
    config: &AppConfig,
    ticker: &str,
    from: NaiveDate,
    to: NaiveDate,
    lags: usize,
) -> Result<()> {
    info!(
        "Received analyze command for {} from {} to {}",
        ticker, from, to
    );

    let client = PolygonClient::new(config)?;
    let request = AnalysisRequest {
        ticker: ticker.to_string(),
        from,
        to,
        lags,
    };
    let report = run_analysis(&client, config, &request).await?;

    let metrics = &report.response.metrics;
    info!(
        "Model performance: RMSE {:.4}, MAE {:.4}, R^2 {:.4}",
        metrics.rmse, metrics.mae, metrics.r2
    );
    match metrics.mean_alpha {
        Some(mean_alpha) => info!(
            "Mean strategy alpha (out-of-sample): {:.4}%",
            mean_alpha * 100.0
        ),
        None => info!("Mean strategy alpha is undefined for this window: not enough test rows"),
    }

    let rows = &report.backtest.rows;
    if rows.is_empty() {
        info!("No backtest rows to display");
    } else {
        let tail_start = rows.len().saturating_sub(BACKTEST_TAIL_ROWS);
        info!("Last {} backtest row(s):", rows.len() - tail_start);
        for row in &rows[tail_start..] {
            info!(
                "{}: close {:.2}, predicted {:.2}, strategy {}, benchmark {}, alpha {}",
                row.timestamp.format("%Y-%m-%d"),
                row.close,
                row.predicted_close,
                format_return(row.strategy_return),
                format_return(row.benchmark_return),
                format_return(row.alpha),
            );
        }
    }

    let mut ranked: Vec<(&str, f64)> = report
        .response
        .feature_labels
        .iter()
        .map(String::as_str)
        .zip(report.response.feature_scores.iter().copied())
        .collect();
    ranked.sort_by(|left, right| right.1.total_cmp(&left.1));
    for (name, score) in ranked.iter().take(TOP_FEATURE_COUNT) {
        info!("Feature importance {}: {:.4}", name, score);
    }

    Ok(())
}

fn format_return(value: Option<f64>) -> String {
    match value {
        Some(fraction) => format!("{:.4}%", fraction * 100.0),
        None => "undefined".to_string(),
    }
}
