use crate::domain::fundamentals::{ReportDocument, SnapshotDocument};
use crate::storage::documents::StoreDocument;
use crate::storage::FundamentalsStore;
use anyhow::Context;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

/// Postgres-backed document store scoped to one collection.
///
/// Every document lives under a collection named after the stock the analysis
/// was started for; peer snapshots are looked up in that same collection.
#[derive(Debug, Clone)]
pub struct PgFundamentalsStore {
    pool: sqlx::PgPool,
    collection: String,
}

impl PgFundamentalsStore {
    pub fn new(pool: sqlx::PgPool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }
}

#[async_trait::async_trait]
impl FundamentalsStore for PgFundamentalsStore {
    async fn get_snapshot(
        &self,
        ticker: &str,
        as_of_date: NaiveDate,
    ) -> anyhow::Result<Option<SnapshotDocument>> {
        let body: Option<Value> = sqlx::query_scalar(
            "SELECT body FROM fundamental_documents \
             WHERE collection = $1 AND stock = $2 AND is_report = FALSE AND as_of_date = $3 \
             ORDER BY imported_at ASC \
             LIMIT 1",
        )
        .persistent(false)
        .bind(&self.collection)
        .bind(ticker)
        .bind(as_of_date)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("snapshot query failed (stock={ticker}, date={as_of_date})"))?;

        Ok(body.map(|body| SnapshotDocument {
            stock: ticker.to_string(),
            as_of_date,
            body,
        }))
    }

    async fn get_report_doc(&self, ticker: &str) -> anyhow::Result<Option<ReportDocument>> {
        let body: Option<Value> = sqlx::query_scalar(
            "SELECT body FROM fundamental_documents \
             WHERE collection = $1 AND stock = $2 AND is_report = TRUE \
             ORDER BY imported_at ASC \
             LIMIT 1",
        )
        .persistent(false)
        .bind(&self.collection)
        .bind(ticker)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("report query failed (stock={ticker})"))?;

        Ok(body.map(|body| ReportDocument {
            stock: ticker.to_string(),
            body,
        }))
    }
}

/// Upserts documents into one collection in a single transaction.
pub async fn import_documents(
    pool: &sqlx::PgPool,
    collection: &str,
    docs: &[StoreDocument],
) -> anyhow::Result<u64> {
    anyhow::ensure!(!docs.is_empty(), "documents must be non-empty");
    anyhow::ensure!(!collection.trim().is_empty(), "collection must be non-empty");

    let mut tx = pool.begin().await.context("begin transaction failed")?;

    let mut affected: u64 = 0;
    let chunk_size: usize = std::env::var("FUNDAMENTALS_IMPORT_BATCH")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(200);

    anyhow::ensure!(chunk_size >= 1, "FUNDAMENTALS_IMPORT_BATCH must be >= 1");

    let docs = dedupe_last_wins(docs);

    let mut batch_idx: usize = 0;
    for chunk in docs.chunks(chunk_size) {
        batch_idx += 1;
        let t0 = std::time::Instant::now();
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO fundamental_documents (id, collection, stock, is_report, as_of_date, body) ",
        );
        qb.push_values(chunk.iter().copied(), |mut b, doc| {
            b.push_bind(Uuid::new_v4())
                .push_bind(collection.trim())
                .push_bind(doc.stock.as_str())
                .push_bind(doc.is_report)
                .push_bind(doc.as_of_date)
                .push_bind(&doc.body);
        });
        qb.push(
            " ON CONFLICT (collection, stock, is_report, (COALESCE(as_of_date, DATE '0001-01-01'))) \
               DO UPDATE SET body = EXCLUDED.body, imported_at = now()",
        );

        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch upsert fundamental_documents failed")?;
        affected += res.rows_affected();

        tracing::debug!(
            collection,
            batch_idx,
            batch_size = chunk.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "fundamental_documents batch upsert"
        );
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(affected)
}

// A single upsert statement cannot touch the same row twice.
fn dedupe_last_wins(docs: &[StoreDocument]) -> Vec<&StoreDocument> {
    let mut seen = HashSet::new();
    let mut out: Vec<&StoreDocument> = docs
        .iter()
        .rev()
        .filter(|d| seen.insert((d.stock.as_str(), d.is_report, d.as_of_date)))
        .collect();
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_duplicates_replace_earlier_ones() {
        let docs: Vec<StoreDocument> = [
            json!({"stock": "ALKEM", "date": "2023-01-01", "v": 1}),
            json!({"stock": "ALKEM", "report": true, "company_id": "1"}),
            json!({"stock": "CIPLA", "date": "2023-01-01"}),
            json!({"stock": "ALKEM", "date": "2023-01-01", "v": 2}),
        ]
        .into_iter()
        .map(|v| StoreDocument::from_value(v).unwrap())
        .collect();

        let kept = dedupe_last_wins(&docs);
        assert_eq!(kept.len(), 3);
        assert!(kept[0].is_report);
        assert_eq!(kept[1].stock, "CIPLA");
        assert_eq!(kept[2].body["v"], 2);
    }
}
