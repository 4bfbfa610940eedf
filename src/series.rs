use crate::models::Bar;
use chrono::{DateTime, Datelike, Utc};
use log::{debug, warn};
use std::collections::HashMap;

/// Strictly time-ordered daily bar series. Construction normalizes raw
/// provider output; after that the series is never mutated — every
/// transformation downstream produces new derived data.
#[derive(Debug, Clone, Default)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    /// Normalizes provider bars into a strictly increasing series:
    /// non-finite rows are discarded, bars are sorted by timestamp and
    /// duplicate timestamps collapse to the last occurrence (providers
    /// re-send corrected bars).
    pub fn from_provider_bars(bars: Vec<Bar>) -> Self {
        let mut usable: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            if bar.open.is_finite()
                && bar.high.is_finite()
                && bar.low.is_finite()
                && bar.close.is_finite()
                && bar.volume.is_finite()
            {
                usable.push(bar);
            } else {
                warn!("Discarding bar with non-finite values at {}", bar.timestamp);
            }
        }

        usable.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        let mut bars: Vec<Bar> = Vec::with_capacity(usable.len());
        for bar in usable {
            match bars.last() {
                Some(last) if last.timestamp == bar.timestamp => {
                    debug!("Duplicate bar at {}; keeping the later record", bar.timestamp);
                    let idx = bars.len() - 1;
                    bars[idx] = bar;
                }
                _ => bars.push(bar),
            }
        }

        Self { bars }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|bar| bar.close).collect()
    }

    /// Close price keyed by timestamp, for joining another series onto
    /// this one's row population.
    pub fn close_index(&self) -> HashMap<DateTime<Utc>, f64> {
        self.bars
            .iter()
            .map(|bar| (bar.timestamp, bar.close))
            .collect()
    }

    /// Last bar of each calendar quarter. The benchmark loader returns
    /// this alongside the daily series; the analyze flow only consumes
    /// the daily part.
    pub fn resample_quarterly(&self) -> Vec<Bar> {
        let mut quarters: Vec<Bar> = Vec::new();
        for bar in &self.bars {
            match quarters.last() {
                Some(last) if quarter_of(last.timestamp) == quarter_of(bar.timestamp) => {
                    let idx = quarters.len() - 1;
                    quarters[idx] = bar.clone();
                }
                _ => quarters.push(bar.clone()),
            }
        }
        quarters
    }
}

/// (year, quarter) bucket for a timestamp, quarter in 1..=4.
pub fn quarter_of(timestamp: DateTime<Utc>) -> (i32, u32) {
    (timestamp.year(), (timestamp.month() - 1) / 3 + 1)
}

/// Normalizes a ticker string: trim, uppercase, and accept only the
/// characters aggregate symbols use (letters, digits, `.` for share
/// classes, `-` for units). Anything else is not a symbol we can put in
/// a request path.
pub fn normalize_ticker_symbol(value: &str) -> Option<String> {
    let normalized = value.trim().to_uppercase();
    if normalized.is_empty()
        || !normalized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return None;
    }
    Some(normalized)
}
