use crate::config::AppConfig;
use crate::error::AnalysisError;
use crate::models::{AnalyzeResponse, PortfolioRequest, PortfolioResponse};
use crate::pipeline::{run_analysis, AnalysisRequest, DEFAULT_LAG_COUNT};
use crate::polygon::PolygonClient;
use crate::portfolio::analyze_portfolio;
use crate::series::normalize_ticker_symbol;
use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use log::{error, info};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

const DEFAULT_TICKER: &str = "AAPL";
const DEFAULT_FROM: &str = "2025-01-01";
const DEFAULT_TO: &str = "2025-07-10";

#[derive(Clone)]
pub struct AppState {
    pub client: PolygonClient,
    pub config: AppConfig,
}

/// Wire-level error: `{ "error": "..." }` with the matching status.
/// Analysis failures the caller can fix (unknown ticker, not enough
/// history) map to 400; anything unexpected stays a 500 with the
/// detail in the server log.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn from_pipeline(err: anyhow::Error) -> Self {
        if let Some(analysis_err) = err.downcast_ref::<AnalysisError>() {
            return Self::bad_request(analysis_err.to_string());
        }

        error!("Analysis request failed: {:#}", err);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    // The dashboard is served from another origin in development.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/analyze", get(analyze_handler))
        .route("/api/analyze-portfolio", post(analyze_portfolio_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, build_router(state))
        .await
        .context("server terminated")?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct AnalyzeQuery {
    ticker: Option<String>,
    from: Option<String>,
    to: Option<String>,
    lags: Option<usize>,
}

async fn analyze_handler(
    State(state): State<AppState>,
    Query(query): Query<AnalyzeQuery>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let raw_ticker = query.ticker.unwrap_or_else(|| DEFAULT_TICKER.to_string());
    let Some(ticker) = normalize_ticker_symbol(&raw_ticker) else {
        return Err(ApiError::bad_request(format!(
            "Invalid ticker symbol: {}",
            raw_ticker
        )));
    };
    let from = parse_date_param(query.from.as_deref().unwrap_or(DEFAULT_FROM), "from")?;
    let to = parse_date_param(query.to.as_deref().unwrap_or(DEFAULT_TO), "to")?;
    if from > to {
        return Err(ApiError::bad_request(format!(
            "From date {} must not be after to date {}",
            from, to
        )));
    }

    let request = AnalysisRequest {
        ticker,
        from,
        to,
        lags: query.lags.unwrap_or(DEFAULT_LAG_COUNT),
    };
    let report = run_analysis(&state.client, &state.config, &request)
        .await
        .map_err(ApiError::from_pipeline)?;
    Ok(Json(report.response))
}

async fn analyze_portfolio_handler(
    State(state): State<AppState>,
    Json(request): Json<PortfolioRequest>,
) -> Result<Json<PortfolioResponse>, ApiError> {
    if request.holdings.is_empty() {
        return Err(ApiError::bad_request(
            "Portfolio must contain at least one holding",
        ));
    }
    for holding in &request.holdings {
        if normalize_ticker_symbol(&holding.ticker).is_none() {
            return Err(ApiError::bad_request(format!(
                "Invalid ticker symbol: {}",
                holding.ticker
            )));
        }
        if !holding.shares.is_finite() || holding.shares <= 0.0 {
            return Err(ApiError::bad_request(format!(
                "Holding {} must have a positive share count",
                holding.ticker
            )));
        }
    }
    let from = parse_date_param(&request.from, "from")?;
    let to = Utc::now().date_naive();

    let report = analyze_portfolio(&state.client, &request.holdings, from, to)
        .await
        .map_err(ApiError::from_pipeline)?;
    Ok(Json(report))
}

fn parse_date_param(raw: &str, name: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        ApiError::bad_request(format!(
            "Parameter {} must be a date in YYYY-MM-DD format (value: {})",
            name, raw
        ))
    })
}
