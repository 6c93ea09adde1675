use crate::domain::fundamentals::{KeyRatios, CURRENT_PRICE};
use crate::domain::peer::{PeerComparison, PeerFundamentals, PeerInfo, NAME_COLUMN};
use crate::peers::{PeerDiscoveryClient, PeerDiscoveryError};
use crate::reference::ReferenceTable;
use crate::storage::FundamentalsStore;
use chrono::NaiveDate;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Number of provider rows considered as peers.
pub const MAX_PEERS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Error parsing date {input:?}. Please use YYYY-MM-DD format.")]
    InvalidDate { input: String },

    #[error("No fundamentals snapshot found for {ticker} on {date}")]
    BaseSnapshotNotFound { ticker: String, date: NaiveDate },

    #[error("No report document found for {ticker}")]
    ReportNotFound { ticker: String },

    #[error("Fundamental ratios not found in the {ticker} snapshot")]
    NoRatiosAvailable { ticker: String },

    #[error("Company ID not found in the {ticker} report document")]
    MissingCompanyId { ticker: String },

    #[error("No 'Name' column found in peer data")]
    MissingNameColumn,

    #[error(transparent)]
    Discovery(#[from] PeerDiscoveryError),

    #[error("fundamentals store query failed: {0:#}")]
    Store(anyhow::Error),
}

pub fn parse_date(input: &str) -> Result<NaiveDate, PipelineError> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT).map_err(|_| PipelineError::InvalidDate {
        input: input.to_string(),
    })
}

/// Turns one ticker and date into a peer fundamentals comparison.
///
/// Holds only borrowed collaborators; each call is an independent, read-only run.
pub struct PeerResolver<'a> {
    reference: &'a ReferenceTable,
    store: &'a dyn FundamentalsStore,
    discovery: &'a dyn PeerDiscoveryClient,
}

impl<'a> PeerResolver<'a> {
    pub fn new(
        reference: &'a ReferenceTable,
        store: &'a dyn FundamentalsStore,
        discovery: &'a dyn PeerDiscoveryClient,
    ) -> Self {
        Self {
            reference,
            store,
            discovery,
        }
    }

    pub async fn resolve_peers(
        &self,
        base_ticker: &str,
        date: &str,
    ) -> Result<PeerComparison, PipelineError> {
        let as_of_date = parse_date(date)?;
        let base_ticker = base_ticker.trim();

        let snapshot = self
            .store
            .get_snapshot(base_ticker, as_of_date)
            .await
            .map_err(PipelineError::Store)?
            .ok_or_else(|| PipelineError::BaseSnapshotNotFound {
                ticker: base_ticker.to_string(),
                date: as_of_date,
            })?;

        let report = self
            .store
            .get_report_doc(base_ticker)
            .await
            .map_err(PipelineError::Store)?
            .ok_or_else(|| PipelineError::ReportNotFound {
                ticker: base_ticker.to_string(),
            })?;

        let base_ratios =
            snapshot
                .flatten_ratios()
                .ok_or_else(|| PipelineError::NoRatiosAvailable {
                    ticker: base_ticker.to_string(),
                })?;
        let current_price = base_ratios.get(CURRENT_PRICE).cloned();

        let company_id = report
            .company_id()
            .ok_or_else(|| PipelineError::MissingCompanyId {
                ticker: base_ticker.to_string(),
            })?;

        tracing::info!(
            %base_ticker,
            %as_of_date,
            %company_id,
            ratios = base_ratios.len(),
            provider = self.discovery.provider_name(),
            "fetching peer listing"
        );
        let peer_table = self.discovery.fetch_peers(&company_id).await?;

        if !peer_table.has_column(NAME_COLUMN) {
            return Err(PipelineError::MissingNameColumn);
        }

        let top_names = peer_table.top_names(MAX_PEERS);

        let peer_info: Vec<PeerInfo> = top_names
            .iter()
            .map(|name| PeerInfo {
                company_name: name.clone(),
                local_ticker: self.reference.resolve_ticker(name).map(str::to_string),
            })
            .collect();

        let mut peer_fundamentals = Vec::with_capacity(peer_info.len());
        for info in &peer_info {
            let Some(ticker) = info.local_ticker.as_deref() else {
                tracing::debug!(company = %info.company_name, "no local ticker; dropping peer");
                continue;
            };
            let ratios = self.peer_ratios(ticker, as_of_date).await?;
            peer_fundamentals.push(PeerFundamentals::new(
                info.company_name.clone(),
                ticker.to_string(),
                ratios,
            ));
        }

        tracing::info!(
            %base_ticker,
            peers = top_names.len(),
            resolved = peer_fundamentals.len(),
            "peer comparison assembled"
        );

        Ok(PeerComparison {
            base_ticker: base_ticker.to_string(),
            as_of_date,
            company_id,
            base_ratios,
            current_price,
            peer_table,
            top_names,
            peer_info,
            peer_fundamentals,
        })
    }

    async fn peer_ratios(
        &self,
        ticker: &str,
        as_of_date: NaiveDate,
    ) -> Result<KeyRatios, PipelineError> {
        let snapshot = self
            .store
            .get_snapshot(ticker, as_of_date)
            .await
            .map_err(PipelineError::Store)?;

        match snapshot.as_ref().and_then(|s| s.flatten_ratios()) {
            Some(ratios) => Ok(KeyRatios::from_ratios(&ratios)),
            None => {
                tracing::debug!(%ticker, %as_of_date, "no usable peer snapshot");
                Ok(KeyRatios::default())
            }
        }
    }
}
