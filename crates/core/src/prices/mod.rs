pub mod instruments;
pub mod kite;

pub use instruments::{Instrument, InstrumentTable};
pub use kite::KiteHistoryClient;

use chrono::{Months, NaiveDate, NaiveDateTime, TimeDelta};
use serde::Serialize;
use serde_json::Value;

pub const NSE_EXCHANGE: &str = "NSE";
const NSE_SUFFIX: &str = ".NS";
const DEFAULT_INTERVAL: &str = "1d";

#[derive(Debug, thiserror::Error)]
pub enum PriceHistoryError {
    #[error("No instrument token found for {symbol} on NSE")]
    UnknownInstrument { symbol: String },

    #[error("invalid period {period:?}; use forms like 1y, 6mo or 7d")]
    InvalidPeriod { period: String },

    #[error("invalid date {input:?}; use YYYY-MM-DD or YYYY-MM-DD HH:MM:SS")]
    InvalidDate { input: String },

    #[error("price history request failed: {0:#}")]
    Fetch(anyhow::Error),
}

/// One OHLCV candle. Serialized with the capitalized column names charting
/// tools expect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceBar {
    #[serde(rename = "Date")]
    pub date: NaiveDateTime,
    #[serde(rename = "Open")]
    pub open: f64,
    #[serde(rename = "High")]
    pub high: f64,
    #[serde(rename = "Low")]
    pub low: f64,
    #[serde(rename = "Close")]
    pub close: f64,
    #[serde(rename = "Volume")]
    pub volume: u64,
}

#[async_trait::async_trait]
pub trait PriceHistoryClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Candles for `instrument_token` between `from` and `to`, both inclusive,
    /// at the broker's `interval` name.
    async fn historical_data(
        &self,
        instrument_token: u64,
        from: NaiveDateTime,
        to: NaiveDateTime,
        interval: &str,
    ) -> anyhow::Result<Vec<PriceBar>>;
}

/// What to fetch. Explicit `start`/`end` take precedence over `period`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub period: Option<String>,
    pub interval: String,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl Default for HistoryRequest {
    fn default() -> Self {
        Self {
            period: None,
            interval: DEFAULT_INTERVAL.to_string(),
            start: None,
            end: None,
        }
    }
}

/// Strips a trailing `.NS` exchange suffix: `RELIANCE.NS` -> `RELIANCE`.
pub fn normalize_symbol(symbol: &str) -> &str {
    let symbol = symbol.trim();
    symbol.strip_suffix(NSE_SUFFIX).unwrap_or(symbol)
}

/// Broker interval name for a yfinance-style interval. Unknown intervals are
/// fetched as daily candles.
pub fn broker_interval(interval: &str) -> &'static str {
    match interval.trim() {
        "1m" => "minute",
        "5m" => "5minute",
        "15m" => "15minute",
        "30m" => "30minute",
        "60m" => "60minute",
        _ => "day",
    }
}

/// Start of a lookback `period` ending at `now`.
///
/// `<n>y`, `<n>mo` and `<n>d` are understood (case-insensitive). Any other
/// suffix means one year; a suffix with a non-numeric count is an error.
pub fn period_start(period: &str, now: NaiveDateTime) -> Result<NaiveDateTime, PriceHistoryError> {
    let p = period.trim().to_lowercase();
    let invalid = || PriceHistoryError::InvalidPeriod {
        period: period.to_string(),
    };
    let count = |digits: &str| digits.parse::<u32>().map_err(|_| invalid());

    let start = if let Some(n) = p.strip_suffix('y') {
        let years = count(n)?;
        years
            .checked_mul(12)
            .and_then(|m| now.checked_sub_months(Months::new(m)))
    } else if let Some(n) = p.strip_suffix("mo") {
        now.checked_sub_months(Months::new(count(n)?))
    } else if let Some(n) = p.strip_suffix('d') {
        TimeDelta::try_days(i64::from(count(n)?)).and_then(|d| now.checked_sub_signed(d))
    } else {
        now.checked_sub_months(Months::new(12))
    };

    start.ok_or_else(invalid)
}

/// `(from, to)` for a request evaluated at `now`.
///
/// With neither bound given, `period` decides the window. Otherwise a missing
/// start means one year back and a missing end means `now`.
pub fn resolve_range(
    req: &HistoryRequest,
    now: NaiveDateTime,
) -> Result<(NaiveDateTime, NaiveDateTime), PriceHistoryError> {
    if req.start.is_none() && req.end.is_none() {
        if let Some(period) = &req.period {
            return Ok((period_start(period, now)?, now));
        }
    }

    let from = match &req.start {
        Some(s) => parse_bound(s)?,
        None => period_start("1y", now)?,
    };
    let to = match &req.end {
        Some(s) => parse_bound(s)?,
        None => now,
    };
    Ok((from, to))
}

fn parse_bound(input: &str) -> Result<NaiveDateTime, PriceHistoryError> {
    let s = input.trim();
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| PriceHistoryError::InvalidDate {
            input: input.to_string(),
        })
}

/// Price history and descriptive info for one NSE symbol.
pub struct PriceHistory<'a> {
    symbol: String,
    instruments: &'a InstrumentTable,
    client: &'a dyn PriceHistoryClient,
    info: Option<Value>,
}

impl<'a> PriceHistory<'a> {
    pub fn new(
        symbol: &str,
        instruments: &'a InstrumentTable,
        client: &'a dyn PriceHistoryClient,
    ) -> Self {
        Self {
            symbol: normalize_symbol(symbol).to_string(),
            instruments,
            client,
            info: None,
        }
    }

    /// Attaches caller-supplied fundamentals returned by [`Self::info`].
    pub fn with_info(mut self, info: Value) -> Self {
        self.info = Some(info);
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn info(&self) -> Value {
        self.info.clone().unwrap_or_else(|| {
            serde_json::json!({
                "longName": "Unknown Company",
                "shortName": self.symbol,
                "longBusinessSummary": "No summary provided",
                "symbol": self.symbol,
            })
        })
    }

    pub async fn history(&self, req: &HistoryRequest) -> Result<Vec<PriceBar>, PriceHistoryError> {
        self.history_at(req, chrono::Local::now().naive_local()).await
    }

    pub async fn history_at(
        &self,
        req: &HistoryRequest,
        now: NaiveDateTime,
    ) -> Result<Vec<PriceBar>, PriceHistoryError> {
        let interval = broker_interval(&req.interval);
        let (from, to) = resolve_range(req, now)?;

        let token = self
            .instruments
            .token(&self.symbol, NSE_EXCHANGE)
            .ok_or_else(|| PriceHistoryError::UnknownInstrument {
                symbol: self.symbol.clone(),
            })?;

        tracing::debug!(
            symbol = %self.symbol,
            token,
            %from,
            %to,
            interval,
            provider = self.client.provider_name(),
            "fetching price history"
        );

        self.client
            .historical_data(token, from, to, interval)
            .await
            .map_err(PriceHistoryError::Fetch)
    }
}
