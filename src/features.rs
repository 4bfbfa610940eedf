use crate::indicators::{rolling_rsi, rolling_sma, simple_returns, IndicatorConfig};
use crate::series::BarSeries;
use chrono::{DateTime, Utc};
use log::debug;

/// One bar with every indicator column defined. Rows only exist for
/// timestamps where all required windows had enough history, so the
/// fields can be plain `f64` — the undefined sentinel lives in the
/// column vectors during construction, not in the output rows.
#[derive(Debug, Clone)]
pub struct EngineeredRow {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub sma_short: f64,
    pub sma_long: f64,
    pub daily_return: f64,
    pub rsi: f64,
}

/// An engineered row plus its lagged target values. `lags[k]` is the
/// close observed `k + 1` rows earlier within the engineered population.
#[derive(Debug, Clone)]
pub struct LaggedRow {
    pub row: EngineeredRow,
    pub lags: Vec<f64>,
}

/// Derives the indicator columns and keeps only rows where every column
/// is defined (the row-validity predicate). Row count shrinks
/// monotonically from the front of the series; an empty series produces
/// an empty table, which is a normal condition for the caller to handle.
pub fn build_indicator_rows(series: &BarSeries, config: &IndicatorConfig) -> Vec<EngineeredRow> {
    let bars = series.bars();
    if bars.is_empty() {
        return Vec::new();
    }

    let closes = series.closes();
    let sma_short = rolling_sma(&closes, config.sma_short);
    let sma_long = rolling_sma(&closes, config.sma_long);
    let returns = simple_returns(&closes);
    let rsi = rolling_rsi(&closes, config.rsi_window, config.rsi_epsilon);

    let mut rows = Vec::with_capacity(bars.len().saturating_sub(config.warm_up_rows()));
    for (i, bar) in bars.iter().enumerate() {
        let (Some(short), Some(long), Some(ret), Some(rsi_value)) =
            (sma_short[i], sma_long[i], returns[i], rsi[i])
        else {
            continue;
        };

        rows.push(EngineeredRow {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            sma_short: short,
            sma_long: long,
            daily_return: ret,
            rsi: rsi_value,
        });
    }

    debug!(
        "Indicator table: {} of {} bars survive warm-up",
        rows.len(),
        bars.len()
    );
    rows
}

/// Adds `lags` trailing close values per row. Lags are taken from the
/// engineered row population, never from raw bars, so lag columns see
/// exactly the rows the indicator columns see. The first `lags` rows
/// have incomplete history and are dropped.
pub fn build_lagged_rows(rows: &[EngineeredRow], lags: usize) -> Vec<LaggedRow> {
    if rows.len() <= lags {
        return Vec::new();
    }

    let mut lagged = Vec::with_capacity(rows.len() - lags);
    for i in lags..rows.len() {
        let lag_values = (1..=lags).map(|k| rows[i - k].close).collect();
        lagged.push(LaggedRow {
            row: rows[i].clone(),
            lags: lag_values,
        });
    }
    lagged
}
