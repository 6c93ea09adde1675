use crate::prices::{PriceBar, PriceHistoryClient};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.kite.trade";
const QUERY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Historical candle client for the Kite Connect REST API.
#[derive(Debug, Clone)]
pub struct KiteHistoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl KiteHistoryClient {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("KITE_API_KEY").context("KITE_API_KEY is required")?;
        let access_token =
            std::env::var("KITE_ACCESS_TOKEN").context("KITE_ACCESS_TOKEN is required")?;
        let base_url =
            std::env::var("KITE_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Self::new(base_url, &api_key, &access_token, Duration::from_secs(30))
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert("x-kite-version", HeaderValue::from_static("3"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("token {api_key}:{access_token}"))
                .context("Kite credentials are not valid header text")?,
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build Kite http client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn url(&self, instrument_token: u64, interval: &str) -> String {
        format!(
            "{}/instruments/historical/{instrument_token}/{interval}",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait::async_trait]
impl PriceHistoryClient for KiteHistoryClient {
    fn provider_name(&self) -> &'static str {
        "kite"
    }

    async fn historical_data(
        &self,
        instrument_token: u64,
        from: NaiveDateTime,
        to: NaiveDateTime,
        interval: &str,
    ) -> Result<Vec<PriceBar>> {
        let url = self.url(instrument_token, interval);
        let params = [
            ("from", from.format(QUERY_TIME_FORMAT).to_string()),
            ("to", to.format(QUERY_TIME_FORMAT).to_string()),
        ];

        let res = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Kite historical response")?;

        if !status.is_success() {
            anyhow::bail!("Kite historical HTTP {status}: {text}");
        }

        let body: Value =
            serde_json::from_str(&text).context("failed to parse Kite historical response")?;
        let bars = parse_candles(&body)?;
        tracing::debug!(instrument_token, interval, bars = bars.len(), "parsed Kite candles");
        Ok(bars)
    }
}

fn parse_candles(body: &Value) -> Result<Vec<PriceBar>> {
    if let Some(status) = body.get("status").and_then(Value::as_str) {
        anyhow::ensure!(
            status == "success",
            "Kite historical status {status}: {}",
            body.get("message").and_then(Value::as_str).unwrap_or("")
        );
    }

    let candles = body
        .pointer("/data/candles")
        .and_then(Value::as_array)
        .context("Kite historical response has no data.candles")?;

    candles
        .iter()
        .enumerate()
        .map(|(idx, c)| parse_candle(c).with_context(|| format!("candle {idx}")))
        .collect()
}

// [timestamp, open, high, low, close, volume, (oi)]
fn parse_candle(candle: &Value) -> Result<PriceBar> {
    let fields = candle.as_array().context("candle is not an array")?;
    anyhow::ensure!(
        fields.len() >= 6,
        "candle has {} fields, expected at least 6",
        fields.len()
    );

    let ts = fields[0].as_str().context("candle timestamp is not a string")?;
    let num = |idx: usize, name: &str| {
        fields[idx]
            .as_f64()
            .with_context(|| format!("candle {name} is not a number"))
    };
    let volume = fields[5]
        .as_u64()
        .or_else(|| fields[5].as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
        .context("candle volume is not a number")?;

    Ok(PriceBar {
        date: parse_candle_time(ts)?,
        open: num(1, "open")?,
        high: num(2, "high")?,
        low: num(3, "low")?,
        close: num(4, "close")?,
        volume,
    })
}

// Exchange-local wall time; the offset is dropped.
fn parse_candle_time(ts: &str) -> Result<NaiveDateTime> {
    DateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%z")
        .map(|dt| dt.naive_local())
        .or_else(|_| NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S"))
        .with_context(|| format!("invalid candle timestamp {ts:?}"))
}
