use crate::domain::fundamentals::{ReportDocument, SnapshotDocument};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;

/// A raw store document together with the keys it is looked up by.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreDocument {
    pub stock: String,
    pub is_report: bool,
    pub as_of_date: Option<NaiveDate>,
    pub body: Value,
}

#[derive(Debug, Deserialize)]
struct DocumentKeys {
    #[serde(alias = "STOCK")]
    stock: String,
    #[serde(default)]
    report: bool,
    #[serde(default, alias = "DateTime")]
    date: Option<Value>,
}

impl StoreDocument {
    pub fn from_value(body: Value) -> Result<Self> {
        let keys = DocumentKeys::deserialize(&body)
            .context("document must carry a string `stock` key, an optional boolean `report` and an optional `date`")?;

        let stock = keys.stock.trim().to_string();
        anyhow::ensure!(!stock.is_empty(), "stock must be non-empty");

        let as_of_date = if keys.report {
            None
        } else {
            let raw = keys
                .date
                .filter(|v| !v.is_null())
                .with_context(|| format!("snapshot document for {stock} has no date"))?;
            Some(
                document_date(&raw)
                    .with_context(|| format!("snapshot document for {stock} has a bad `date`"))?,
            )
        };

        Ok(Self {
            stock,
            is_report: keys.report,
            as_of_date,
            body,
        })
    }

    pub fn to_snapshot(&self) -> Option<SnapshotDocument> {
        if self.is_report {
            return None;
        }
        Some(SnapshotDocument {
            stock: self.stock.clone(),
            as_of_date: self.as_of_date?,
            body: self.body.clone(),
        })
    }

    pub fn to_report(&self) -> Option<ReportDocument> {
        if !self.is_report {
            return None;
        }
        Some(ReportDocument {
            stock: self.stock.clone(),
            body: self.body.clone(),
        })
    }
}

/// Parses either a JSON array of documents or one JSON document per line.
pub fn parse_documents(text: &str) -> Result<Vec<StoreDocument>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        let values: Vec<Value> =
            serde_json::from_str(trimmed).context("documents file is not a valid JSON array")?;
        return values
            .into_iter()
            .enumerate()
            .map(|(idx, v)| StoreDocument::from_value(v).with_context(|| format!("document {idx}")))
            .collect();
    }

    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .with_context(|| format!("line {} is not valid JSON", idx + 1))?;
        out.push(StoreDocument::from_value(value).with_context(|| format!("line {}", idx + 1))?);
    }
    Ok(out)
}

// Plain strings, or mongoexport's `{"$date": ...}` holding an ISO string,
// epoch millis, or `{"$numberLong": "<millis>"}`.
fn document_date(raw: &Value) -> Result<NaiveDate> {
    match raw {
        Value::String(s) => parse_document_date(s),
        Value::Object(obj) => match obj.get("$date") {
            Some(Value::String(s)) => parse_document_date(s),
            Some(Value::Number(n)) => millis_date(n.as_i64()),
            Some(Value::Object(inner)) => millis_date(
                inner
                    .get("$numberLong")
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse().ok()),
            ),
            _ => anyhow::bail!("unsupported date object {raw}"),
        },
        other => anyhow::bail!("unsupported date value {other}"),
    }
}

fn millis_date(millis: Option<i64>) -> Result<NaiveDate> {
    let millis = millis.context("date millis must be an integer")?;
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.date_naive())
        .with_context(|| format!("date millis out of range: {millis}"))
}

// Accepts plain dates as well as timestamps that start with one.
fn parse_document_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .with_context(|| format!("invalid document date {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_snapshot_and_report_keys() {
        let snap = StoreDocument::from_value(json!({
            "STOCK": "ALKEM",
            "report": false,
            "DateTime": "2023-01-01T00:00:00",
            "company_ratios": {"top_ratios": {"Current Price": "850"}}
        }))
        .unwrap();
        assert_eq!(snap.stock, "ALKEM");
        assert!(!snap.is_report);
        assert_eq!(snap.as_of_date, NaiveDate::from_ymd_opt(2023, 1, 1));
        assert!(snap.to_report().is_none());
        assert_eq!(snap.to_snapshot().unwrap().body["company_ratios"]["top_ratios"]["Current Price"], "850");

        let report = StoreDocument::from_value(json!({
            "stock": "ALKEM",
            "report": true,
            "company_id": "12345"
        }))
        .unwrap();
        assert!(report.is_report);
        assert_eq!(report.as_of_date, None);
        assert_eq!(report.to_report().unwrap().company_id().as_deref(), Some("12345"));
    }

    #[test]
    fn snapshot_without_date_is_rejected() {
        let err = StoreDocument::from_value(json!({"stock": "ALKEM", "report": false})).unwrap_err();
        assert!(format!("{err:#}").contains("no date"));
    }

    #[test]
    fn reads_extended_json_dates() {
        let iso = StoreDocument::from_value(json!({
            "STOCK": "ALKEM",
            "DateTime": {"$date": "2023-01-01T00:00:00Z"}
        }))
        .unwrap();
        assert_eq!(iso.as_of_date, NaiveDate::from_ymd_opt(2023, 1, 1));

        // 2023-01-01T00:00:00Z
        let millis = StoreDocument::from_value(json!({
            "STOCK": "ALKEM",
            "DateTime": {"$date": {"$numberLong": "1672531200000"}}
        }))
        .unwrap();
        assert_eq!(millis.as_of_date, NaiveDate::from_ymd_opt(2023, 1, 1));

        let plain = StoreDocument::from_value(json!({
            "stock": "ALKEM",
            "date": {"$date": 1672531200000_i64}
        }))
        .unwrap();
        assert_eq!(plain.as_of_date, NaiveDate::from_ymd_opt(2023, 1, 1));
    }

    #[test]
    fn bad_dates_name_the_date_field() {
        let err = StoreDocument::from_value(json!({"stock": "ALKEM", "date": 20230101})).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("`date`"), "{msg}");
        assert!(!msg.contains("`stock` key"), "{msg}");
    }

    #[test]
    fn parses_json_lines_and_arrays() {
        let lines = "{\"stock\":\"ALKEM\",\"report\":true,\"company_id\":\"1\"}\n\n\
                     {\"stock\":\"CIPLA\",\"date\":\"2023-01-01\"}\n";
        let docs = parse_documents(lines).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].stock, "CIPLA");

        let array = r#"[{"stock":"LUPIN","date":"2023-01-01"}]"#;
        let docs = parse_documents(array).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].stock, "LUPIN");
    }

    #[test]
    fn reports_the_offending_line() {
        let err = parse_documents("{\"stock\":\"A\",\"date\":\"2023-01-01\"}\nnot json\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
