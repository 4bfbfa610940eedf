use anyhow::{anyhow, Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate};
use reqwest::Client as HttpClient;
use serde_json::json;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write as IoWrite};
use std::net::TcpListener;
use std::sync::{mpsc, Arc, Once};
use std::thread;
use std::time::Duration;

pub fn ensure_test_env() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub fn bar_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 2).expect("valid date")
}

/// Drifting closes with two overlaid waves so indicators see both gains
/// and losses. Always positive for the base prices the tests use.
pub fn synthetic_closes(days: usize, base_price: f64, drift: f64) -> Vec<f64> {
    (0..days)
        .map(|day| {
            let day_f = day as f64;
            base_price + day_f * drift + 2.2 * (day_f / 6.0).sin() + 1.1 * (day_f / 17.0).cos()
        })
        .collect()
}

/// Polygon-shaped aggs payload for one ticker, one bar per calendar day
/// starting at `bar_start_date`.
fn aggs_json_from_closes(ticker: &str, closes: &[f64]) -> String {
    let start = bar_start_date();
    let results: Vec<serde_json::Value> = closes
        .iter()
        .enumerate()
        .map(|(day, close)| {
            let date = start + ChronoDuration::days(day as i64);
            let timestamp_ms = date
                .and_hms_opt(0, 0, 0)
                .expect("valid time")
                .and_utc()
                .timestamp_millis();
            json!({
                "t": timestamp_ms,
                "o": close * 0.995,
                "h": close * 1.012,
                "l": close * 0.988,
                "c": close,
                "v": 1_000_000.0 + (day as f64) * 1_000.0,
            })
        })
        .collect();

    json!({
        "ticker": ticker,
        "queryCount": closes.len(),
        "resultsCount": closes.len(),
        "adjusted": true,
        "status": "OK",
        "results": results,
    })
    .to_string()
}

#[derive(Clone, Default)]
pub struct PolygonStubResponses {
    aggs_by_ticker: HashMap<String, String>,
}

impl PolygonStubResponses {
    pub fn with_closes(mut self, ticker: &str, closes: &[f64]) -> Self {
        self.aggs_by_ticker
            .insert(ticker.to_string(), aggs_json_from_closes(ticker, closes));
        self
    }

    fn body_for(&self, ticker: &str) -> String {
        self.aggs_by_ticker
            .get(ticker)
            .cloned()
            .unwrap_or_else(|| empty_aggs_json(ticker))
    }
}

// Polygon answers 200 with no results array for tickers it has no bars
// for, so unknown tickers surface as empty series, not HTTP errors.
fn empty_aggs_json(ticker: &str) -> String {
    json!({
        "ticker": ticker,
        "queryCount": 0,
        "resultsCount": 0,
        "adjusted": true,
        "status": "OK",
    })
    .to_string()
}

pub struct PolygonStub {
    pub base_url: String,
    shutdown: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PolygonStub {
    pub fn start(responses: PolygonStubResponses) -> Result<Self> {
        let mut listener: Option<TcpListener> = None;
        for _ in 0..64 {
            let port = fastrand::u16(40_000..60_000);
            if let Ok(bound) = TcpListener::bind(("127.0.0.1", port)) {
                listener = Some(bound);
                break;
            }
        }
        let listener = match listener {
            Some(listener) => listener,
            None => TcpListener::bind("127.0.0.1:0")?,
        };
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let base_url = format!("http://{}", addr);
        let (shutdown, shutdown_rx) = mpsc::channel();
        let shared = Arc::new(responses);

        let handle = thread::spawn(move || loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            match listener.accept() {
                Ok((stream, _)) => {
                    let responses = Arc::clone(&shared);
                    let _ = stream.set_nonblocking(false);
                    let _ = handle_polygon_request(stream, &responses);
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(10));
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    thread::sleep(Duration::from_millis(10));
                }
            }
        });

        Ok(Self {
            base_url,
            shutdown,
            handle: Some(handle),
        })
    }
}

impl Drop for PolygonStub {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub async fn wait_for_polygon_stub(base_url: &str) -> Result<()> {
    let client = HttpClient::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .context("failed to create Polygon stub health check client")?;
    let url = format!(
        "{}/v2/aggs/ticker/PING/range/1/day/2025-01-01/2025-01-02",
        base_url.trim_end_matches('/')
    );

    for _ in 0..40 {
        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => return Ok(()),
            _ => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }

    Err(anyhow!("Polygon stub did not respond at {}", url))
}

fn handle_polygon_request(
    mut stream: std::net::TcpStream,
    responses: &PolygonStubResponses,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line)? == 0 {
        return Ok(());
    }

    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return Ok(());
    }
    let method = parts[0];
    let raw_path = parts[1];
    let path_only = raw_path.split('?').next().unwrap_or(raw_path);

    loop {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 {
            break;
        }
        if header == "\r\n" {
            break;
        }
    }

    // Aggs paths look like /v2/aggs/ticker/{TICKER}/range/1/day/{from}/{to}.
    let ticker = path_only
        .strip_prefix("/v2/aggs/ticker/")
        .and_then(|rest| rest.split('/').next());

    match (method, ticker) {
        ("GET", Some(ticker)) if !ticker.is_empty() => {
            write_json_response(&mut stream, "200 OK", &responses.body_for(ticker))
        }
        _ => write_empty_response(&mut stream, "404 Not Found"),
    }
}

fn write_json_response(
    stream: &mut std::net::TcpStream,
    status: &str,
    body: &str,
) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes())
}

fn write_empty_response(stream: &mut std::net::TcpStream, status: &str) -> std::io::Result<()> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status
    );
    stream.write_all(response.as_bytes())
}
