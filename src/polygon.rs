use crate::config::AppConfig;
use crate::models::Bar;
use crate::series::{normalize_ticker_symbol, BarSeries};
use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use log::{info, warn};
use reqwest::Client;
use serde::de::{self, DeserializeOwned, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const AGGS_PAGE_LIMIT: &str = "50000";

/// Client for Polygon-style daily aggregate endpoints. Owns its
/// connection pool so server state can clone it per request.
#[derive(Clone)]
pub struct PolygonClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl PolygonClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.polygon_base_url.clone(),
            api_key: config.polygon_api_key.clone(),
        })
    }

    /// Daily OHLCV bars for `ticker` over the inclusive date range. The
    /// returned series is sorted, de-duplicated, and finite; it is empty
    /// (not an error) when the provider has no rows for the range.
    pub async fn fetch_daily_bars(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<BarSeries> {
        let symbol = normalize_ticker_symbol(ticker)
            .ok_or_else(|| anyhow!("Invalid ticker symbol: {}", ticker))?;
        let path = format!(
            "/v2/aggs/ticker/{}/range/1/day/{}/{}",
            symbol,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let response: AggsResponse = self
            .get(
                &path,
                &[
                    ("adjusted", "true"),
                    ("sort", "asc"),
                    ("limit", AGGS_PAGE_LIMIT),
                ],
            )
            .await?;

        let bars = bars_from_aggs(response.results);
        info!(
            "Fetched {} daily bars for {} ({} to {})",
            bars.len(),
            symbol,
            from,
            to
        );
        Ok(BarSeries::from_provider_bars(bars))
    }

    /// Benchmark series in both granularities: the daily bars plus a
    /// quarterly resample (last bar per calendar quarter). Price-level
    /// analysis joins on the daily series; the quarterly view feeds
    /// coarse-grained reporting.
    pub async fn fetch_benchmark_series(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<(BarSeries, Vec<Bar>)> {
        let daily = self.fetch_daily_bars(ticker, from, to).await?;
        let quarterly = daily.resample_quarterly();
        Ok((daily, quarterly))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(url)
            .query(query)
            .query(&[("apiKey", self.api_key.as_str())])
            .send()
            .await
            .with_context(|| format!("GET {}{} failed", self.base_url, path))?;

        // Build the status error by hand so the API key in the request
        // URL never lands in an error message or log line.
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!(
                "GET {}{} returned HTTP {}",
                self.base_url,
                path,
                status
            ));
        }

        response
            .json::<T>()
            .await
            .context("failed to parse Polygon response")
    }
}

/// An empty range comes back without a `results` key at all, so the
/// field defaults instead of erroring.
#[derive(Debug, Deserialize)]
struct AggsResponse {
    #[serde(default)]
    results: Vec<AggBar>,
}

#[derive(Debug, Deserialize)]
struct AggBar {
    t: i64,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    o: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    h: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    l: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    c: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_f64_opt")]
    v: Option<f64>,
}

fn bars_from_aggs(results: Vec<AggBar>) -> Vec<Bar> {
    let mut bars = Vec::with_capacity(results.len());
    for entry in results {
        let Some(timestamp) = Utc.timestamp_millis_opt(entry.t).single() else {
            warn!("Skipping bar with out-of-range timestamp {}", entry.t);
            continue;
        };
        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) =
            (entry.o, entry.h, entry.l, entry.c, entry.v)
        else {
            warn!("Skipping bar at {} with missing OHLCV fields", timestamp);
            continue;
        };

        bars.push(Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        });
    }
    bars
}

fn deserialize_f64_opt<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    struct F64OptVisitor;

    impl<'de> Visitor<'de> for F64OptVisitor {
        type Value = Option<f64>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number or string")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(None)
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Some(value as f64))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.trim().parse::<f64>().ok())
        }

        fn visit_string<E>(self, value: String) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value.trim().parse::<f64>().ok())
        }
    }

    deserializer.deserialize_any(F64OptVisitor)
}
