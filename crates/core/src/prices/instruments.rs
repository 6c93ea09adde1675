use crate::reference::{column_index, decode_text};
use anyhow::{Context, Result};
use std::path::Path;

const TOKEN_COLUMN: &str = "instrument_token";
const SYMBOL_COLUMN: &str = "tradingsymbol";
const EXCHANGE_COLUMN: &str = "exchange";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub instrument_token: u64,
    pub tradingsymbol: String,
    pub exchange: String,
}

/// Broker instrument dump: trading symbol and exchange to instrument token.
#[derive(Debug, Clone, Default)]
pub struct InstrumentTable {
    instruments: Vec<Instrument>,
}

impl InstrumentTable {
    pub fn from_instruments<I>(instruments: I) -> Self
    where
        I: IntoIterator<Item = Instrument>,
    {
        Self {
            instruments: instruments.into_iter().collect(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read instruments file {}", path.display()))?;
        let table = Self::from_csv_bytes(&bytes)
            .with_context(|| format!("failed to parse instruments file {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            instruments = table.len(),
            "loaded instruments"
        );
        Ok(table)
    }

    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        let text = decode_text(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader.headers().context("instruments file has no header row")?;
        let token_idx = column_index(headers, TOKEN_COLUMN)?;
        let symbol_idx = column_index(headers, SYMBOL_COLUMN)?;
        let exchange_idx = column_index(headers, EXCHANGE_COLUMN)?;

        let mut instruments = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("invalid instrument record {}", line + 1))?;
            let raw_token = record.get(token_idx).unwrap_or("");
            let instrument_token = raw_token.parse::<u64>().with_context(|| {
                format!("instrument record {}: bad token {raw_token:?}", line + 1)
            })?;
            instruments.push(Instrument {
                instrument_token,
                tradingsymbol: record.get(symbol_idx).unwrap_or("").to_string(),
                exchange: record.get(exchange_idx).unwrap_or("").to_string(),
            });
        }

        Ok(Self { instruments })
    }

    /// Token of the first instrument with exactly this symbol on `exchange`.
    pub fn token(&self, symbol: &str, exchange: &str) -> Option<u64> {
        self.instruments
            .iter()
            .find(|i| i.tradingsymbol == symbol && i.exchange == exchange)
            .map(|i| i.instrument_token)
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}
