use peerscope_core::domain::or_na;
use peerscope_core::domain::peer::{PeerComparison, PeerFundamentals, PeerInfo, PeerTable};
use peerscope_core::prices::PriceBar;
use tabled::builder::Builder;
use tabled::settings::Style;

fn render(builder: Builder) -> String {
    builder.build().with(Style::rounded()).to_string()
}

pub fn peer_table(table: &PeerTable) -> String {
    let mut builder = Builder::default();
    builder.push_record(table.headers.iter().cloned());
    for row in 0..table.len() {
        builder.push_record(
            table
                .cells(row)
                .into_iter()
                .map(|cell| or_na(cell).to_string()),
        );
    }
    render(builder)
}

pub fn peer_info_table(peers: &[PeerInfo]) -> String {
    let mut builder = Builder::default();
    builder.push_record(["Company Name".to_string(), "NSE Ticker".to_string()]);
    for peer in peers {
        builder.push_record([
            peer.company_name.clone(),
            or_na(peer.local_ticker.as_deref()).to_string(),
        ]);
    }
    render(builder)
}

pub fn fundamentals_table(peers: &[PeerFundamentals]) -> String {
    let mut builder = Builder::default();
    builder.push_record(
        ["Company Name", "NSE Ticker", "Current Price", "P/E", "ROE"].map(str::to_string),
    );
    for peer in peers {
        builder.push_record([
            peer.company_name.clone(),
            peer.local_ticker.clone(),
            or_na(peer.current_price.as_deref()).to_string(),
            or_na(peer.pe_ratio.as_deref()).to_string(),
            or_na(peer.roe.as_deref()).to_string(),
        ]);
    }
    render(builder)
}

pub fn price_table(bars: &[PriceBar]) -> String {
    if bars.is_empty() {
        return "No price data returned".to_string();
    }

    let mut builder = Builder::default();
    builder.push_record(["Date", "Open", "High", "Low", "Close", "Volume"].map(str::to_string));
    for bar in bars {
        builder.push_record([
            bar.date.to_string(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
        ]);
    }
    render(builder)
}

/// Full terminal report for one run: status lines and the three tables.
pub fn report(comparison: &PeerComparison) -> String {
    let top_names = if comparison.top_names.is_empty() {
        "(none)".to_string()
    } else {
        comparison.top_names.join(", ")
    };

    [
        format!("User date: {}", comparison.as_of_date),
        "Scraped Peer Data:".to_string(),
        peer_table(&comparison.peer_table),
        format!("Top 5 peer companies: {top_names}"),
        "Peer Info with NSE Tickers:".to_string(),
        peer_info_table(&comparison.peer_info),
        "Final Peer Fundamental Data:".to_string(),
        fundamentals_table(&comparison.peer_fundamentals),
        format!(
            "Current Price from ratios: {}",
            or_na(comparison.current_price.as_deref())
        ),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use peerscope_core::domain::fundamentals::RatioSnapshot;

    fn comparison() -> PeerComparison {
        PeerComparison {
            base_ticker: "ALKEM".to_string(),
            as_of_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            company_id: "12345".to_string(),
            base_ratios: RatioSnapshot::new(),
            current_price: None,
            peer_table: PeerTable {
                headers: vec!["Name".to_string(), "CMP".to_string()],
                rows: vec![
                    vec!["CIPLA".to_string(), "1100".to_string()],
                    vec!["SUN PHARMA".to_string()],
                ],
            },
            top_names: vec!["CIPLA".to_string(), "SUN PHARMA".to_string()],
            peer_info: vec![
                PeerInfo {
                    company_name: "CIPLA".to_string(),
                    local_ticker: Some("CIPLA".to_string()),
                },
                PeerInfo {
                    company_name: "SUN PHARMA".to_string(),
                    local_ticker: None,
                },
            ],
            peer_fundamentals: vec![PeerFundamentals {
                company_name: "CIPLA".to_string(),
                local_ticker: "CIPLA".to_string(),
                current_price: Some("1100".to_string()),
                pe_ratio: None,
                roe: Some("15".to_string()),
            }],
        }
    }

    #[test]
    fn missing_values_render_as_na() {
        let c = comparison();

        let raw = peer_table(&c.peer_table);
        assert!(raw.contains("SUN PHARMA"));
        assert!(raw.contains("N/A"));

        let info = peer_info_table(&c.peer_info);
        assert!(info.contains("NSE Ticker"));
        assert_eq!(info.matches("N/A").count(), 1);

        let fundamentals = fundamentals_table(&c.peer_fundamentals);
        assert!(fundamentals.contains("1100"));
        assert!(fundamentals.contains("N/A"));
        assert!(!fundamentals.contains("SUN PHARMA"));
    }

    #[test]
    fn repeated_headers_render_their_own_cells() {
        let table = PeerTable {
            headers: ["", "Name", "CMP", ""].map(str::to_string).to_vec(),
            rows: vec![["1.", "CIPLA", "1100", "chk"].map(str::to_string).to_vec()],
        };

        let out = peer_table(&table);
        assert!(out.contains("1."));
        assert_eq!(out.matches("chk").count(), 1);
    }

    #[test]
    fn price_table_lists_candles() {
        assert_eq!(price_table(&[]), "No price data returned");

        let bar = PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(9, 15, 0)
                .unwrap(),
            open: 2580.0,
            high: 2595.5,
            low: 2571.1,
            close: 2590.0,
            volume: 123456,
        };
        let out = price_table(&[bar]);
        assert!(out.contains("Volume"));
        assert!(out.contains("2024-01-02 09:15:00"));
        assert!(out.contains("2595.5"));
        assert!(out.contains("123456"));
    }

    #[test]
    fn report_has_status_lines_and_sections_in_order() {
        let out = report(&comparison());
        let positions: Vec<usize> = [
            "User date: 2023-01-01",
            "Scraped Peer Data:",
            "Top 5 peer companies: CIPLA, SUN PHARMA",
            "Peer Info with NSE Tickers:",
            "Final Peer Fundamental Data:",
            "Current Price from ratios: N/A",
        ]
        .iter()
        .map(|needle| out.find(needle).unwrap_or_else(|| panic!("missing {needle}")))
        .collect();

        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }
}
