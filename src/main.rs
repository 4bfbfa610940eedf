use alpha_engine::{
    commands::{analyze, serve},
    config::AppConfig,
    pipeline::DEFAULT_LAG_COUNT,
    series::normalize_ticker_symbol,
};
use anyhow::anyhow;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use log::info;

const DEFAULT_TICKER: &str = "AAPL";
const DEFAULT_FROM_DATE: &str = "2025-01-01";
const DEFAULT_TO_DATE: &str = "2025-07-10";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

#[derive(Parser)]
#[command(name = "alpha-engine")]
#[command(about = "Trains a boosted close-price model over daily bars and reports strategy alpha")]
struct Cli {
    /// Benchmark ticker for strategy-vs-benchmark alpha (overrides BENCHMARK_TICKER)
    #[arg(long, global = true)]
    benchmark: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single analysis from the console and log the backtest summary
    Analyze {
        /// Ticker symbol to analyze
        #[arg(default_value = DEFAULT_TICKER)]
        ticker: String,
        /// First day of the bar range (YYYY-MM-DD)
        #[arg(long, default_value = DEFAULT_FROM_DATE)]
        from: NaiveDate,
        /// Last day of the bar range (YYYY-MM-DD)
        #[arg(long, default_value = DEFAULT_TO_DATE)]
        to: NaiveDate,
        /// Number of lagged close features
        #[arg(long, default_value_t = DEFAULT_LAG_COUNT)]
        lags: usize,
    },
    /// Serve the analysis HTTP API
    Serve {
        /// Interface to bind
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,
        /// Port to listen on
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let Cli { benchmark, command } = cli;

    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Fail fast on missing credentials before any command starts work.
    let mut config = AppConfig::from_env()?;
    if let Some(raw) = benchmark {
        config.benchmark_ticker = normalize_ticker_symbol(&raw)
            .ok_or_else(|| anyhow!("Invalid benchmark ticker symbol: {}", raw))?;
    }

    info!("Starting alpha-engine. Not financial advice. Model output is research tooling, not a trade signal.");

    match command {
        Commands::Analyze {
            ticker,
            from,
            to,
            lags,
        } => {
            analyze::run(&config, &ticker, from, to, lags).await?;
        }
        Commands::Serve { host, port } => {
            serve::run(&config, &host, port).await?;
        }
    }

    Ok(())
}
