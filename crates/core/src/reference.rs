use anyhow::{Context, Result};
use encoding_rs::WINDOWS_1252;
use std::borrow::Cow;
use std::path::Path;

pub const ISSUER_NAME_COLUMN: &str = "Issuer Name";
pub const SECURITY_ID_COLUMN: &str = "Security Id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    pub issuer_name: String,
    pub security_id: String,
}

/// Issuer-name to exchange-ticker lookup, loaded once and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: Vec<ReferenceEntry>,
    // Lowercased issuer names, index-aligned with `entries`.
    folded: Vec<String>,
}

impl ReferenceTable {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = ReferenceEntry>,
    {
        let entries: Vec<ReferenceEntry> = entries.into_iter().collect();
        let folded = entries
            .iter()
            .map(|e| e.issuer_name.to_lowercase())
            .collect();
        Self { entries, folded }
    }

    /// Loads a CSV file, or the first `.csv` entry of a `.zip` archive.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read reference table {}", path.display()))?;

        let is_zip = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("zip"));

        let table = if is_zip {
            let csv_bytes = unzip_first_csv(&bytes)?;
            Self::from_csv_bytes(&csv_bytes)
        } else {
            Self::from_csv_bytes(&bytes)
        }
        .with_context(|| format!("failed to parse reference table {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            entries = table.len(),
            "loaded reference table"
        );
        Ok(table)
    }

    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        let text = decode_text(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = reader.headers().context("reference table has no header row")?;
        let issuer_idx = column_index(headers, ISSUER_NAME_COLUMN)?;
        let security_idx = column_index(headers, SECURITY_ID_COLUMN)?;

        let mut entries = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record =
                record.with_context(|| format!("invalid reference table record {}", line + 1))?;
            entries.push(ReferenceEntry {
                issuer_name: record.get(issuer_idx).unwrap_or("").to_string(),
                security_id: record.get(security_idx).unwrap_or("").to_string(),
            });
        }

        Ok(Self::from_entries(entries))
    }

    /// Security id of the first row whose issuer name contains `fragment`,
    /// ignoring case. `None` when nothing matches.
    pub fn resolve_ticker(&self, fragment: &str) -> Option<&str> {
        let needle = fragment.to_lowercase();
        self.folded
            .iter()
            .position(|name| name.contains(&needle))
            .map(|idx| self.entries[idx].security_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .with_context(|| format!("table is missing the {name:?} column"))
}

pub(crate) fn decode_text(bytes: &[u8]) -> String {
    // Exchange master files are often published as Windows-1252 rather than UTF-8.
    let text = match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => WINDOWS_1252.decode(bytes).0,
    };
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}

fn unzip_first_csv(zip_bytes: &[u8]) -> Result<Vec<u8>> {
    use std::io::{Cursor, Read};

    let mut zip = zip::ZipArchive::new(Cursor::new(zip_bytes)).context("open zip archive failed")?;
    anyhow::ensure!(zip.len() >= 1, "zip has no entries");

    let mut csv_idx: Option<usize> = None;
    for i in 0..zip.len() {
        let name = {
            let f = zip.by_index(i).context("open zip entry failed")?;
            f.name().to_string()
        };
        if name.to_ascii_lowercase().ends_with(".csv") {
            csv_idx = Some(i);
            break;
        }
    }
    let idx = csv_idx.unwrap_or(0);

    let mut file = zip.by_index(idx).context("open zip entry failed")?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).context("read zip entry failed")?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn table(rows: &[(&str, &str)]) -> ReferenceTable {
        ReferenceTable::from_entries(rows.iter().map(|(name, id)| ReferenceEntry {
            issuer_name: name.to_string(),
            security_id: id.to_string(),
        }))
    }

    #[test]
    fn resolves_case_insensitive_substring() {
        let t = table(&[("ALKEM LABORATORIES", "ALKEM")]);
        assert_eq!(t.resolve_ticker("ALK"), Some("ALKEM"));
        assert_eq!(t.resolve_ticker("alkem lab"), Some("ALKEM"));
        assert_eq!(t.resolve_ticker("CIPLA"), None);
    }

    #[test]
    fn first_matching_row_wins() {
        let t = table(&[
            ("Sun Pharma Advanced Research", "SPARC"),
            ("Sun Pharmaceutical Industries", "SUNPHARMA"),
        ]);
        assert_eq!(t.resolve_ticker("Sun Pharma"), Some("SPARC"));
    }

    #[test]
    fn fragment_is_matched_literally() {
        let t = table(&[("Dr. Reddy's Laboratories", "DRREDDY"), ("DrX Reddys", "OTHER")]);
        assert_eq!(t.resolve_ticker("Dr. Reddy"), Some("DRREDDY"));
        assert_eq!(t.resolve_ticker("Dr.*Reddy"), None);
    }

    #[test]
    fn parses_csv_with_extra_columns() {
        let csv = "Security Code,Issuer Name,Security Id,Status\n\
                   539523,ALKEM LABORATORIES LTD.,ALKEM,Active\n\
                   500087,CIPLA LTD.,CIPLA,Active\n";
        let t = ReferenceTable::from_csv_bytes(csv.as_bytes()).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.resolve_ticker("cipla"), Some("CIPLA"));
    }

    #[test]
    fn rejects_csv_without_required_columns() {
        let csv = "Issuer Name,Ticker\nALKEM,ALKEM\n";
        let err = ReferenceTable::from_csv_bytes(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Security Id"));
    }

    #[test]
    fn decodes_windows_1252_and_strips_bom() {
        let mut bytes = b"Issuer Name,Security Id\n".to_vec();
        bytes.extend_from_slice(b"Soci\xe9t\xe9 G\xe9n\xe9rale,GLE\n");
        let t = ReferenceTable::from_csv_bytes(&bytes).unwrap();
        assert_eq!(t.resolve_ticker("société"), Some("GLE"));

        let with_bom = "\u{feff}Issuer Name,Security Id\nLUPIN LTD.,LUPIN\n";
        let t = ReferenceTable::from_csv_bytes(with_bom.as_bytes()).unwrap();
        assert_eq!(t.resolve_ticker("LUPIN"), Some("LUPIN"));
    }

    #[test]
    fn loads_csv_and_zip_files() {
        let csv = "Issuer Name,Security Id\nLUPIN LTD.,LUPIN\n";

        let mut csv_file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        csv_file.write_all(csv.as_bytes()).unwrap();
        let t = ReferenceTable::load(csv_file.path()).unwrap();
        assert_eq!(t.resolve_ticker("lupin"), Some("LUPIN"));

        let zip_file = tempfile::Builder::new().suffix(".zip").tempfile().unwrap();
        {
            let mut writer = zip::ZipWriter::new(zip_file.reopen().unwrap());
            writer
                .start_file("readme.txt", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"not a table").unwrap();
            writer
                .start_file("bse.csv", zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(csv.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        let t = ReferenceTable::load(zip_file.path()).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.resolve_ticker("Lupin"), Some("LUPIN"));
    }
}
