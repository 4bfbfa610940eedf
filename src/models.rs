use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One daily OHLCV record. Volume is fractional because providers report
/// weighted/adjusted share counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Regression quality metrics plus the out-of-sample alpha. `mean_alpha`
/// is `None` when the test window is too short to define any
/// period-over-period return; it serializes as JSON null, never as 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    pub mean_alpha: Option<f64>,
}

/// Wire shape of `GET /api/analyze`. Field names are part of the public
/// contract consumed by the dashboard frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub metrics: AnalysisMetrics,
    pub predicted: Vec<f64>,
    pub actual: Vec<f64>,
    pub dates: Vec<String>,
    pub feature_labels: Vec<String>,
    pub feature_scores: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingRequest {
    pub ticker: String,
    pub shares: f64,
}

/// Body of `POST /api/analyze-portfolio`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioRequest {
    pub holdings: Vec<HoldingRequest>,
    pub from: String,
}

/// One valued position in the portfolio response. `weight` is the share
/// of total portfolio value in percent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioPosition {
    pub ticker: String,
    pub shares: f64,
    pub price: f64,
    pub value: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioResponse {
    pub portfolio_value: f64,
    pub holdings: Vec<PortfolioPosition>,
    pub sector_allocations: BTreeMap<String, f64>,
    pub tips: Vec<String>,
}
