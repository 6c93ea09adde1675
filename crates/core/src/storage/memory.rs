use crate::domain::fundamentals::{ReportDocument, SnapshotDocument};
use crate::storage::documents::{parse_documents, StoreDocument};
use crate::storage::FundamentalsStore;
use chrono::NaiveDate;

/// Document store held in memory, used for offline runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryFundamentalsStore {
    docs: Vec<StoreDocument>,
}

impl MemoryFundamentalsStore {
    pub fn new(docs: Vec<StoreDocument>) -> Self {
        Self { docs }
    }

    pub fn from_documents_text(text: &str) -> anyhow::Result<Self> {
        Ok(Self::new(parse_documents(text)?))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[async_trait::async_trait]
impl FundamentalsStore for MemoryFundamentalsStore {
    async fn get_snapshot(
        &self,
        ticker: &str,
        as_of_date: NaiveDate,
    ) -> anyhow::Result<Option<SnapshotDocument>> {
        Ok(self
            .docs
            .iter()
            .find(|d| d.stock == ticker && !d.is_report && d.as_of_date == Some(as_of_date))
            .and_then(StoreDocument::to_snapshot))
    }

    async fn get_report_doc(&self, ticker: &str) -> anyhow::Result<Option<ReportDocument>> {
        Ok(self
            .docs
            .iter()
            .find(|d| d.stock == ticker && d.is_report)
            .and_then(StoreDocument::to_report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> MemoryFundamentalsStore {
        let docs = [
            json!({"stock": "ALKEM", "report": false, "date": "2023-01-01", "company_ratios": {"top_ratios": {"Current Price": "850"}}}),
            json!({"stock": "ALKEM", "report": false, "date": "2023-01-02", "company_ratios": {"top_ratios": {"Current Price": "860"}}}),
            json!({"stock": "ALKEM", "report": true, "company_id": "12345"}),
        ];
        MemoryFundamentalsStore::new(
            docs.into_iter()
                .map(|v| StoreDocument::from_value(v).unwrap())
                .collect(),
        )
    }

    #[tokio::test]
    async fn snapshot_lookup_is_exact_on_date() {
        let store = store();
        let d1 = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2023, 1, 3).unwrap();

        let snap = store.get_snapshot("ALKEM", d1).await.unwrap().unwrap();
        assert_eq!(snap.flatten_ratios().unwrap()["Current Price"], "860");
        assert!(store.get_snapshot("ALKEM", d2).await.unwrap().is_none());
        assert!(store.get_snapshot("CIPLA", d1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn report_lookup_ignores_date() {
        let store = store();
        let report = store.get_report_doc("ALKEM").await.unwrap().unwrap();
        assert_eq!(report.company_id().as_deref(), Some("12345"));
        assert!(store.get_report_doc("LUPIN").await.unwrap().is_none());
    }
}
