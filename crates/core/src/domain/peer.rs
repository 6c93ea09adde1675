use crate::domain::fundamentals::{KeyRatios, RatioSnapshot};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const NAME_COLUMN: &str = "Name";

/// One scraped row: cell text aligned with `PeerTable::headers`.
///
/// Short rows stop early; the missing trailing columns have no value.
pub type PeerRow = Vec<String>;

/// Provider table as scraped. Headers may repeat or be blank, so cells are
/// kept by position rather than keyed by header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerTable {
    pub headers: Vec<String>,
    pub rows: Vec<PeerRow>,
}

impl PeerTable {
    pub fn has_column(&self, header: &str) -> bool {
        self.column(header).is_some()
    }

    /// Position of the first column named `header`.
    pub fn column(&self, header: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == header)
    }

    /// Cell of row `row` under the first column named `header`.
    pub fn value(&self, row: usize, header: &str) -> Option<&str> {
        let col = self.column(header)?;
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// Row `row` padded out to the header width, one entry per column.
    pub fn cells(&self, row: usize) -> Vec<Option<&str>> {
        let cells = self.rows.get(row);
        (0..self.headers.len())
            .map(|col| cells.and_then(|r| r.get(col)).map(String::as_str))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `Name` values of the first `n` rows, in provider order.
    ///
    /// Rows without a usable name are skipped rather than replaced.
    pub fn top_names(&self, n: usize) -> Vec<String> {
        let Some(col) = self.column(NAME_COLUMN) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .take(n)
            .filter_map(|row| row.get(col))
            .filter(|name| !name.trim().is_empty())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub company_name: String,
    pub local_ticker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerFundamentals {
    pub company_name: String,
    pub local_ticker: String,
    pub current_price: Option<String>,
    pub pe_ratio: Option<String>,
    pub roe: Option<String>,
}

impl PeerFundamentals {
    pub fn new(company_name: String, local_ticker: String, ratios: KeyRatios) -> Self {
        Self {
            company_name,
            local_ticker,
            current_price: ratios.current_price,
            pe_ratio: ratios.pe_ratio,
            roe: ratios.roe,
        }
    }
}

/// Everything one analysis run produces, in the order it was derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerComparison {
    pub base_ticker: String,
    pub as_of_date: NaiveDate,
    pub company_id: String,
    pub base_ratios: RatioSnapshot,
    pub current_price: Option<String>,
    pub peer_table: PeerTable,
    pub top_names: Vec<String>,
    pub peer_info: Vec<PeerInfo>,
    pub peer_fundamentals: Vec<PeerFundamentals>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> PeerTable {
        PeerTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn top_names_truncates_without_padding() {
        let table = table(
            &["Name", "CMP"],
            &[&["CIPLA", "1100"], &["SUN PHARMA", "990"], &["LUPIN", "700"]],
        );

        assert_eq!(table.top_names(5), vec!["CIPLA", "SUN PHARMA", "LUPIN"]);
        assert_eq!(table.top_names(2), vec!["CIPLA", "SUN PHARMA"]);
    }

    #[test]
    fn top_names_skips_rows_without_a_name() {
        let table = table(
            &["CMP", "Name"],
            &[&["1", "CIPLA"], &["2"], &["3", "  "], &["4", "LUPIN"]],
        );

        assert_eq!(table.top_names(5), vec!["CIPLA", "LUPIN"]);
    }

    #[test]
    fn repeated_headers_keep_every_cell() {
        let table = table(&["", "Name", "CMP", ""], &[&["1.", "CIPLA", "1100", "chk"]]);

        assert_eq!(
            table.cells(0),
            vec![Some("1."), Some("CIPLA"), Some("1100"), Some("chk")]
        );
        assert_eq!(table.value(0, ""), Some("1."));
        assert_eq!(table.value(0, "CMP"), Some("1100"));
        assert_eq!(table.top_names(5), vec!["CIPLA"]);
    }

    #[test]
    fn short_rows_pad_to_header_width() {
        let table = table(&["Name", "CMP", "P/E"], &[&["CIPLA"]]);

        assert_eq!(table.cells(0), vec![Some("CIPLA"), None, None]);
        assert_eq!(table.value(0, "P/E"), None);
        assert_eq!(table.value(1, "Name"), None);
        assert_eq!(table.value(0, "ROE"), None);
    }

    #[test]
    fn serializes_missing_values_as_null() {
        let peer = PeerFundamentals::new(
            "CIPLA".to_string(),
            "CIPLA".to_string(),
            KeyRatios {
                current_price: Some("1100".to_string()),
                ..Default::default()
            },
        );

        let v = serde_json::to_value(&peer).unwrap();
        assert_eq!(v["current_price"], "1100");
        assert!(v["pe_ratio"].is_null());
        assert!(v["roe"].is_null());
    }
}
