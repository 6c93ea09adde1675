use crate::domain::peer::PeerTable;
use crate::peers::PeerDiscoveryError;
use scraper::{ElementRef, Html, Selector};

/// Parses the first `<table>` of a peer listing page.
///
/// Headers come from every `<th>` in the table with whitespace runs collapsed.
/// Every `<tr>` holding at least one `<td>` becomes a row; cell text is only
/// trimmed and kept in column order, so repeated or blank headers lose no
/// cells. A row shorter than the header leaves its trailing columns out, a row
/// longer than the header rejects the table.
pub fn parse_peer_table(html: &str) -> Result<PeerTable, PeerDiscoveryError> {
    let doc = Html::parse_document(html);
    let table = doc
        .select(&selector("table"))
        .next()
        .ok_or(PeerDiscoveryError::NoTableFound)?;

    let headers: Vec<String> = table
        .select(&selector("th"))
        .map(|th| collapse_whitespace(&element_text(th)))
        .collect();

    let sel_td = selector("td");
    let mut rows = Vec::new();
    for tr in table.select(&selector("tr")) {
        let cells: Vec<String> = tr
            .select(&sel_td)
            .map(|td| element_text(td).trim().to_string())
            .collect();
        if cells.is_empty() {
            continue;
        }

        if cells.len() > headers.len() {
            return Err(PeerDiscoveryError::RaggedRow {
                row: rows.len(),
                cells: cells.len(),
                headers: headers.len(),
            });
        }

        rows.push(cells);
    }

    Ok(PeerTable { headers, rows })
}

fn selector(css: &'static str) -> Selector {
    // Only called with fixed, valid selectors.
    Selector::parse(css).expect("static selector must parse")
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
