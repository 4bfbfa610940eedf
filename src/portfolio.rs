use crate::error::AnalysisError;
use crate::models::{HoldingRequest, PortfolioPosition, PortfolioResponse};
use crate::polygon::PolygonClient;
use crate::series::normalize_ticker_symbol;
use anyhow::{anyhow, ensure, Result};
use chrono::NaiveDate;
use futures::future::try_join_all;
use log::info;
use std::collections::BTreeMap;

const SECTOR_CONCENTRATION_LIMIT: f64 = 40.0;
const POSITION_CONCENTRATION_LIMIT: f64 = 25.0;
const MIN_DIVERSIFIED_SECTORS: usize = 3;
const MIN_DIVERSIFIED_POSITIONS: usize = 3;

/// Values a set of holdings at their latest close in the range and
/// derives sector weights plus concentration tips. Each holding's bars
/// are fetched concurrently; one holding without data fails the whole
/// request with `NoData`.
pub async fn analyze_portfolio(
    client: &PolygonClient,
    holdings: &[HoldingRequest],
    from: NaiveDate,
    to: NaiveDate,
) -> Result<PortfolioResponse> {
    ensure!(
        !holdings.is_empty(),
        "Portfolio must contain at least one holding"
    );
    ensure!(from <= to, "From date {} must not be after {}", from, to);

    let mut requested = Vec::with_capacity(holdings.len());
    for holding in holdings {
        let symbol = normalize_ticker_symbol(&holding.ticker)
            .ok_or_else(|| anyhow!("Invalid ticker symbol: {}", holding.ticker))?;
        ensure!(
            holding.shares.is_finite() && holding.shares > 0.0,
            "Holding {} must have a positive share count",
            symbol
        );
        requested.push((symbol, holding.shares));
    }

    let fetches = requested.iter().map(|(symbol, shares)| async move {
        let series = client.fetch_daily_bars(symbol, from, to).await?;
        let Some(last) = series.last() else {
            return Err(AnalysisError::NoData {
                symbol: symbol.clone(),
            }
            .into());
        };
        Ok::<_, anyhow::Error>((symbol.clone(), *shares, last.close))
    });
    let priced = try_join_all(fetches).await?;

    let response = build_portfolio_report(priced);
    info!(
        "Valued portfolio of {} holdings at {:.2}",
        holdings.len(),
        response.portfolio_value
    );
    Ok(response)
}

/// Pure valuation step over (symbol, shares, latest price) triples.
fn build_portfolio_report(priced: Vec<(String, f64, f64)>) -> PortfolioResponse {
    let portfolio_value: f64 = priced
        .iter()
        .map(|(_, shares, price)| shares * price)
        .sum();

    let mut positions = Vec::with_capacity(priced.len());
    let mut sector_allocations: BTreeMap<String, f64> = BTreeMap::new();
    for (symbol, shares, price) in priced {
        let value = shares * price;
        let weight = if portfolio_value > 0.0 {
            value / portfolio_value * 100.0
        } else {
            0.0
        };
        *sector_allocations
            .entry(sector_for(&symbol).to_string())
            .or_insert(0.0) += weight;
        positions.push(PortfolioPosition {
            ticker: symbol,
            shares,
            price,
            value,
            weight,
        });
    }

    let tips = concentration_tips(&positions, &sector_allocations);

    PortfolioResponse {
        portfolio_value,
        holdings: positions,
        sector_allocations,
        tips,
    }
}

fn concentration_tips(
    positions: &[PortfolioPosition],
    sector_allocations: &BTreeMap<String, f64>,
) -> Vec<String> {
    let mut tips = Vec::new();

    for (sector, weight) in sector_allocations {
        if *weight > SECTOR_CONCENTRATION_LIMIT {
            tips.push(format!(
                "Your portfolio is heavily concentrated in {} ({:.1}%). Consider spreading exposure across more sectors.",
                sector, weight
            ));
        }
    }

    for position in positions {
        if position.weight > POSITION_CONCENTRATION_LIMIT {
            tips.push(format!(
                "{} alone makes up {:.1}% of your portfolio. Consider trimming the position to reduce single-name risk.",
                position.ticker, position.weight
            ));
        }
    }

    if positions.len() < MIN_DIVERSIFIED_POSITIONS {
        tips.push(format!(
            "Holding only {} position{} concentrates idiosyncratic risk. Consider adding more names.",
            positions.len(),
            if positions.len() == 1 { "" } else { "s" }
        ));
    }
    if sector_allocations.len() < MIN_DIVERSIFIED_SECTORS {
        tips.push(format!(
            "Your portfolio spans only {} sector{}. Broader sector coverage smooths drawdowns.",
            sector_allocations.len(),
            if sector_allocations.len() == 1 { "" } else { "s" }
        ));
    }

    if tips.is_empty() {
        tips.push("Your allocation looks reasonably diversified. Keep an eye on position drift as prices move.".to_string());
    }

    tips
}

/// Coarse GICS-style sector lookup for common US tickers. Anything
/// unknown lands in `Other` rather than failing the request.
fn sector_for(ticker: &str) -> &'static str {
    match ticker {
        "AAPL" | "MSFT" | "NVDA" | "AMD" | "INTC" | "CRM" | "ORCL" | "ADBE" | "AVGO" | "CSCO"
        | "QCOM" | "IBM" | "TXN" | "NOW" | "PLTR" => "Technology",
        "GOOGL" | "GOOG" | "META" | "NFLX" | "DIS" | "CMCSA" | "T" | "VZ" | "TMUS" => {
            "Communication Services"
        }
        "AMZN" | "TSLA" | "HD" | "NKE" | "MCD" | "SBUX" | "LOW" | "BKNG" => {
            "Consumer Discretionary"
        }
        "JPM" | "BAC" | "WFC" | "GS" | "MS" | "C" | "V" | "MA" | "AXP" | "BLK" | "SCHW" => {
            "Financials"
        }
        "JNJ" | "PFE" | "UNH" | "MRK" | "ABBV" | "LLY" | "TMO" | "ABT" | "BMY" | "AMGN" => {
            "Health Care"
        }
        "XOM" | "CVX" | "COP" | "SLB" | "EOG" | "OXY" => "Energy",
        "PG" | "KO" | "PEP" | "WMT" | "COST" | "CL" | "MDLZ" | "PM" => "Consumer Staples",
        "BA" | "CAT" | "GE" | "HON" | "LMT" | "RTX" | "UPS" | "UNP" | "DE" => "Industrials",
        "NEE" | "DUK" | "SO" | "D" | "AEP" => "Utilities",
        "LIN" | "APD" | "SHW" | "FCX" | "NEM" => "Materials",
        "AMT" | "PLD" | "CCI" | "SPG" | "O" => "Real Estate",
        "SPY" | "VOO" | "IVV" | "QQQ" | "VTI" | "IWM" | "DIA" => "Broad Market ETF",
        _ => "Other",
    }
}
