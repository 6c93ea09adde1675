use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const COMPANY_RATIOS_KEY: &str = "company_ratios";
pub const TOP_RATIOS_KEY: &str = "top_ratios";
pub const QUICK_RATIOS_KEY: &str = "quick_ratios";
pub const COMPANY_ID_KEY: &str = "company_id";

pub const CURRENT_PRICE: &str = "Current Price";
pub const PRICE_TO_EARNING: &str = "Price to Earning";
pub const ROE: &str = "ROE";
pub const ROE_PERCENT: &str = "ROE %";

/// Ratio name to its textual value, as stored.
pub type RatioSnapshot = BTreeMap<String, String>;

/// A non-report document: the ratios recorded for one stock on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub stock: String,
    pub as_of_date: NaiveDate,
    pub body: Value,
}

impl SnapshotDocument {
    /// Merges `top_ratios` and then `quick_ratios` into one mapping.
    ///
    /// Returns `None` when the document carries neither group.
    pub fn flatten_ratios(&self) -> Option<RatioSnapshot> {
        flatten_ratios(&self.body)
    }
}

/// The per-stock report document holding the peer provider's company id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub stock: String,
    pub body: Value,
}

impl ReportDocument {
    pub fn company_id(&self) -> Option<String> {
        match self.body.get(COMPANY_ID_KEY)? {
            Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

pub fn flatten_ratios(body: &Value) -> Option<RatioSnapshot> {
    let groups = body.get(COMPANY_RATIOS_KEY)?.as_object()?;
    let top = groups.get(TOP_RATIOS_KEY);
    let quick = groups.get(QUICK_RATIOS_KEY);
    if top.is_none() && quick.is_none() {
        return None;
    }

    let mut out = RatioSnapshot::new();
    for group in [top, quick].into_iter().flatten() {
        let Some(obj) = group.as_object() else {
            continue;
        };
        for (name, value) in obj {
            out.insert(name.clone(), ratio_text(value));
        }
    }
    Some(out)
}

fn ratio_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The three figures shown per peer in the comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRatios {
    pub current_price: Option<String>,
    pub pe_ratio: Option<String>,
    pub roe: Option<String>,
}

impl KeyRatios {
    pub fn from_ratios(ratios: &RatioSnapshot) -> Self {
        Self {
            current_price: ratios.get(CURRENT_PRICE).cloned(),
            pe_ratio: ratios.get(PRICE_TO_EARNING).cloned(),
            roe: ratios
                .get(ROE)
                .or_else(|| ratios.get(ROE_PERCENT))
                .cloned(),
        }
    }
}
