use crate::series::normalize_ticker_symbol;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::env;

pub const DEFAULT_BENCHMARK_TICKER: &str = "SPY";
const DEFAULT_POLYGON_BASE_URL: &str = "https://api.polygon.io";

/// Runtime settings sourced from the environment. The API key is the
/// only required setting; everything else has a default.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub polygon_api_key: String,
    pub polygon_base_url: String,
    pub benchmark_ticker: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let settings: HashMap<String, String> = env::vars().collect();
        Self::from_settings_map(&settings)
    }

    pub fn from_settings_map(settings: &HashMap<String, String>) -> Result<Self> {
        let polygon_api_key = require_setting(settings, "POLYGON_API_KEY")?.to_string();

        let polygon_base_url = optional_setting(settings, "POLYGON_BASE_URL")
            .unwrap_or(DEFAULT_POLYGON_BASE_URL)
            .trim_end_matches('/')
            .to_string();
        if !polygon_base_url.starts_with("http://") && !polygon_base_url.starts_with("https://") {
            return Err(anyhow!(
                "Setting POLYGON_BASE_URL must start with http:// or https:// (value: {})",
                polygon_base_url
            ));
        }

        let raw_benchmark =
            optional_setting(settings, "BENCHMARK_TICKER").unwrap_or(DEFAULT_BENCHMARK_TICKER);
        let benchmark_ticker = normalize_ticker_symbol(raw_benchmark).ok_or_else(|| {
            anyhow!(
                "Setting BENCHMARK_TICKER must be a valid ticker symbol (value: {})",
                raw_benchmark
            )
        })?;

        Ok(Self {
            polygon_api_key,
            polygon_base_url,
            benchmark_ticker,
        })
    }
}

fn require_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("Missing required setting {}", key))
}

fn optional_setting<'a>(settings: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}
