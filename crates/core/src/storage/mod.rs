pub mod documents;
pub mod memory;
pub mod postgres;

use crate::domain::fundamentals::{ReportDocument, SnapshotDocument};
use anyhow::Context;
use chrono::NaiveDate;

pub use documents::StoreDocument;
pub use memory::MemoryFundamentalsStore;
pub use postgres::PgFundamentalsStore;

/// Read side of the fundamentals document store.
///
/// Absence is `Ok(None)`; `Err` is reserved for the store itself failing.
#[async_trait::async_trait]
pub trait FundamentalsStore: Send + Sync {
    async fn get_snapshot(
        &self,
        ticker: &str,
        as_of_date: NaiveDate,
    ) -> anyhow::Result<Option<SnapshotDocument>>;

    async fn get_report_doc(&self, ticker: &str) -> anyhow::Result<Option<ReportDocument>>;
}

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}
