use crate::config::Settings;
use crate::domain::peer::PeerTable;
use crate::peers::{parse_peer_table, PeerDiscoveryClient, PeerDiscoveryError};
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.screener.in";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const PEERS_PATH: &str = "/api/company/{id}/peers/";

/// Peer listing client for Screener-style `/api/company/{id}/peers/` pages.
///
/// One request per call, no retries. The underlying connection pool is dropped
/// with the client.
#[derive(Debug, Clone)]
pub struct ScreenerPeerClient {
    http: reqwest::Client,
    base_url: String,
}

impl ScreenerPeerClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .peer_provider_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout =
            Duration::from_secs(settings.peer_provider_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));
        Self::new(base_url, timeout)
    }

    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("peerscope/", env!("CARGO_PKG_VERSION"))),
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("failed to build peer provider http client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn url(&self, company_id: &str) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            PEERS_PATH.replace("{id}", company_id.trim())
        )
    }

    async fn fetch_markup(&self, company_id: &str) -> Result<String> {
        let url = self.url(company_id);

        let res = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read peer listing response")?;

        if !status.is_success() {
            anyhow::bail!("peer provider HTTP {status} for {url}");
        }

        Ok(text)
    }
}

#[async_trait::async_trait]
impl PeerDiscoveryClient for ScreenerPeerClient {
    fn provider_name(&self) -> &'static str {
        "screener"
    }

    async fn fetch_peers(&self, company_id: &str) -> Result<PeerTable, PeerDiscoveryError> {
        let markup = self
            .fetch_markup(company_id)
            .await
            .map_err(PeerDiscoveryError::Fetch)?;

        let table = parse_peer_table(&markup)?;
        tracing::debug!(
            company_id,
            columns = table.headers.len(),
            rows = table.len(),
            "parsed peer listing"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(base_url: Option<&str>) -> Settings {
        Settings {
            database_url: None,
            reference_table_path: None,
            peer_provider_base_url: base_url.map(str::to_string),
            peer_provider_timeout_secs: Some(5),
            sentry_dsn: None,
        }
    }

    #[test]
    fn builds_peer_listing_url() {
        let client = ScreenerPeerClient::from_settings(&settings(None)).unwrap();
        assert_eq!(
            client.url("12345"),
            "https://www.screener.in/api/company/12345/peers/"
        );

        let client = ScreenerPeerClient::from_settings(&settings(Some("http://localhost:8080/"))).unwrap();
        assert_eq!(
            client.url(" 42 "),
            "http://localhost:8080/api/company/42/peers/"
        );
    }

    // Serves exactly one canned HTTP response and returns the base URL.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "{status_line}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn fetches_and_parses_peer_listing() {
        let base = serve_once(
            "HTTP/1.1 200 OK",
            "<table><tr><th>Name</th><th>CMP</th></tr><tr><td>CIPLA</td><td>1100</td></tr></table>",
        )
        .await;
        let client = ScreenerPeerClient::new(base, Duration::from_secs(5)).unwrap();

        let table = client.fetch_peers("12345").await.unwrap();
        assert_eq!(table.headers, vec!["Name", "CMP"]);
        assert_eq!(table.value(0, "Name"), Some("CIPLA"));
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let base = serve_once("HTTP/1.1 404 Not Found", "<table></table>").await;
        let client = ScreenerPeerClient::new(base, Duration::from_secs(5)).unwrap();

        let err = client.fetch_peers("12345").await.unwrap_err();
        assert!(matches!(err, PeerDiscoveryError::Fetch(_)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn unreachable_provider_is_a_fetch_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            ScreenerPeerClient::new(format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        let err = client.fetch_peers("1").await.unwrap_err();
        assert!(matches!(err, PeerDiscoveryError::Fetch(_)));
    }
}
