use thiserror::Error;

/// Analysis failures callers branch on. Anything unexpected travels as
/// plain `anyhow::Error` context instead.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The provider returned zero bars for the requested range.
    #[error("No data found for {symbol}")]
    NoData { symbol: String },

    /// Bars came back, but too few remain after indicator warm-up and
    /// lagging to build a single dataset row.
    #[error("Not enough history for {symbol}: {rows} bars do not cover indicator warm-up and lags")]
    InsufficientHistory { symbol: String, rows: usize },
}
