pub mod screener;
pub mod table;

use crate::domain::peer::PeerTable;

pub use screener::ScreenerPeerClient;
pub use table::parse_peer_table;

#[derive(Debug, thiserror::Error)]
pub enum PeerDiscoveryError {
    #[error("no table found in the peer listing")]
    NoTableFound,

    #[error("peer table row {row} has {cells} cells but only {headers} column headers")]
    RaggedRow {
        row: usize,
        cells: usize,
        headers: usize,
    },

    #[error("peer listing request failed: {0:#}")]
    Fetch(anyhow::Error),
}

#[async_trait::async_trait]
pub trait PeerDiscoveryClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Fetches the provider's peer table for `company_id`, in provider order.
    async fn fetch_peers(&self, company_id: &str) -> Result<PeerTable, PeerDiscoveryError>;
}
