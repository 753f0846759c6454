//! PostgreSQL implementation of [`Storage`].
//!
//! Random sampling uses `ORDER BY random()` over the tier predicate;
//! the claim is a single conditional `UPDATE … RETURNING`, so two
//! workers racing for the same item cannot both win.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use extraction::ScrapeDocument;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use super::Storage;
use crate::models::{OrgRecord, OrgRecordId, RunOutcome, RunStatus, WorkItem, WorkItemId};

pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("failed to connect to document store")?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

}

#[async_trait]
impl Storage for PgStorage {
    async fn sample_pending_items(&self, n: usize) -> Result<Vec<WorkItem>> {
        let items = sqlx::query_as::<_, WorkItem>(
            "SELECT * FROM work_items
             WHERE status = 'pending'
             ORDER BY random()
             LIMIT $1",
        )
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to sample pending items")?;
        Ok(items)
    }

    async fn sample_stale_items(
        &self,
        n: usize,
        created_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkItem>> {
        let items = match created_before {
            Some(cutoff) => {
                sqlx::query_as::<_, WorkItem>(
                    "SELECT * FROM work_items
                     WHERE (is_read = FALSE OR status = 'pending')
                       AND (created_at < $1 OR created_at IS NULL)
                     ORDER BY random()
                     LIMIT $2",
                )
                .bind(cutoff)
                .bind(n as i64)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, WorkItem>(
                    "SELECT * FROM work_items
                     WHERE is_read = FALSE OR status = 'pending'
                     ORDER BY random()
                     LIMIT $1",
                )
                .bind(n as i64)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("failed to sample stale items")?;
        Ok(items)
    }

    async fn sample_expired_claims(
        &self,
        n: usize,
        expired_before: DateTime<Utc>,
    ) -> Result<Vec<WorkItem>> {
        let items = sqlx::query_as::<_, WorkItem>(
            "SELECT * FROM work_items
             WHERE status = 'claimed' AND claimed_at < $1
             ORDER BY random()
             LIMIT $2",
        )
        .bind(expired_before)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to sample expired claims")?;
        Ok(items)
    }

    async fn existing_record_urls(&self) -> Result<HashSet<String>> {
        let urls: Vec<String> = sqlx::query_scalar(
            "SELECT url FROM org_records WHERE corrupted = FALSE",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load existing record urls")?;
        Ok(urls.into_iter().collect())
    }

    async fn claim_item(
        &self,
        id: WorkItemId,
        lease_expired_before: DateTime<Utc>,
    ) -> Result<bool> {
        let claimed: Option<Uuid> = sqlx::query_scalar(
            "UPDATE work_items
             SET status = 'claimed', claimed_at = NOW()
             WHERE id = $1
               AND (status <> 'claimed' OR claimed_at IS NULL OR claimed_at < $2)
             RETURNING id",
        )
        .bind(id)
        .bind(lease_expired_before)
        .fetch_optional(&self.pool)
        .await
        .context("failed to claim work item")?;
        Ok(claimed.is_some())
    }

    async fn complete_item(&self, id: WorkItemId) -> Result<()> {
        sqlx::query(
            "UPDATE work_items
             SET status = 'completed', is_read = TRUE, processed_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to complete work item")?;
        Ok(())
    }

    async fn fail_item(&self, id: WorkItemId) -> Result<()> {
        sqlx::query(
            "UPDATE work_items
             SET status = 'failed', processed_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to mark work item failed")?;
        Ok(())
    }

    async fn sample_records_blank_description(&self, n: usize) -> Result<Vec<OrgRecord>> {
        let records = sqlx::query_as::<_, OrgRecord>(
            "SELECT * FROM org_records
             WHERE corrupted = FALSE
               AND (summary IS NULL
                    OR summary->>'description' IS NULL
                    OR summary->>'description' = '')
             ORDER BY random()
             LIMIT $1",
        )
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to sample blank-description records")?;
        Ok(records)
    }

    async fn sample_records_funding_sentinel(
        &self,
        n: usize,
        sentinel: &str,
    ) -> Result<Vec<OrgRecord>> {
        let records = sqlx::query_as::<_, OrgRecord>(
            "SELECT * FROM org_records
             WHERE corrupted = FALSE
               AND financial->>'total_funding_amount' = $1
             ORDER BY random()
             LIMIT $2",
        )
        .bind(sentinel)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to sample funding-sentinel records")?;
        Ok(records)
    }

    async fn sample_records_recent_founded(
        &self,
        n: usize,
        year_pattern: &str,
        not_updated_since: DateTime<Utc>,
    ) -> Result<Vec<OrgRecord>> {
        let records = sqlx::query_as::<_, OrgRecord>(
            "SELECT * FROM org_records
             WHERE corrupted = FALSE
               AND summary->>'founded' ~ $1
               AND (updated_at < $2 OR updated_at IS NULL)
             ORDER BY random()
             LIMIT $3",
        )
        .bind(year_pattern)
        .bind(not_updated_since)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to sample recent-founded records")?;
        Ok(records)
    }

    async fn sample_records_stale_financial(
        &self,
        n: usize,
        not_updated_since: DateTime<Utc>,
    ) -> Result<Vec<OrgRecord>> {
        let records = sqlx::query_as::<_, OrgRecord>(
            "SELECT * FROM org_records
             WHERE corrupted = FALSE
               AND financial IS NOT NULL
               AND summary->>'description' IS NOT NULL
               AND summary->>'description' <> ''
               AND (updated_at < $1 OR updated_at IS NULL)
             ORDER BY random()
             LIMIT $2",
        )
        .bind(not_updated_since)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to sample stale-financial records")?;
        Ok(records)
    }

    async fn sample_records_obfuscated(
        &self,
        n: usize,
        marker: &str,
    ) -> Result<Vec<OrgRecord>> {
        let records = sqlx::query_as::<_, OrgRecord>(
            "SELECT * FROM org_records
             WHERE corrupted = FALSE
               AND summary->>'description' IS NOT NULL
               AND summary->>'description' <> ''
               AND (summary->>'founded' ~* $1
                    OR financial->>'total_funding_amount' ~* $1)
             ORDER BY random()
             LIMIT $2",
        )
        .bind(marker)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to sample obfuscated records")?;
        Ok(records)
    }

    async fn sample_flagged_items(&self, n: usize) -> Result<Vec<WorkItem>> {
        let items = sqlx::query_as::<_, WorkItem>(
            "SELECT * FROM work_items
             WHERE update_first = TRUE
             ORDER BY random()
             LIMIT $1",
        )
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .context("failed to sample flagged items")?;
        Ok(items)
    }

    async fn clear_update_flags(&self, ids: &[WorkItemId]) -> Result<()> {
        sqlx::query(
            "UPDATE work_items
             SET update_first = FALSE, processed_at = NOW()
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .context("failed to clear update flags")?;
        Ok(())
    }

    async fn find_records_for_urls(
        &self,
        urls: &[String],
        not_updated_since: DateTime<Utc>,
    ) -> Result<Vec<OrgRecord>> {
        let records = sqlx::query_as::<_, OrgRecord>(
            "SELECT * FROM org_records
             WHERE corrupted = FALSE
               AND url = ANY($1)
               AND summary->>'description' IS NOT NULL
               AND summary->>'description' <> ''
               AND (updated_at < $2 OR updated_at IS NULL)",
        )
        .bind(urls)
        .bind(not_updated_since)
        .fetch_all(&self.pool)
        .await
        .context("failed to load flagged records")?;
        Ok(records)
    }

    async fn mark_records_queued(&self, ids: &[OrgRecordId]) -> Result<()> {
        sqlx::query(
            "UPDATE org_records
             SET update_queued_at = NOW(), is_updated = FALSE
             WHERE id = ANY($1)",
        )
        .bind(ids)
        .execute(&self.pool)
        .await
        .context("failed to queue-mark records")?;
        Ok(())
    }

    async fn insert_record(&self, record: &OrgRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO org_records (
                id, url, name, summary, financial, news, tech,
                corrupted, is_updated, update_queued_at,
                updated_at, last_processed_at, created_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(record.id)
        .bind(&record.url)
        .bind(&record.name)
        .bind(&record.summary)
        .bind(&record.financial)
        .bind(&record.news)
        .bind(&record.tech)
        .bind(record.corrupted)
        .bind(record.is_updated)
        .bind(record.update_queued_at)
        .bind(record.updated_at)
        .bind(record.last_processed_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("failed to insert record")?;
        Ok(())
    }

    async fn update_record_document(&self, id: OrgRecordId, doc: &ScrapeDocument) -> Result<()> {
        sqlx::query(
            "UPDATE org_records
             SET summary = $2, financial = $3, news = $4, tech = $5,
                 is_updated = TRUE, corrupted = FALSE,
                 updated_at = NOW(), last_processed_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(doc.summary.clone().map(Json))
        .bind(doc.financial.clone().map(Json))
        .bind(doc.news.clone().map(Json))
        .bind(doc.tech.clone().map(Json))
        .execute(&self.pool)
        .await
        .context("failed to update record document")?;
        Ok(())
    }

    async fn mark_record_corrupted(&self, id: OrgRecordId) -> Result<()> {
        sqlx::query(
            "UPDATE org_records
             SET corrupted = TRUE,
                 last_processed_at = NOW(),
                 corruption_detected_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("failed to mark record corrupted")?;
        Ok(())
    }

    async fn quarantine_copy(&self, record: &OrgRecord) -> Result<()> {
        // One quarantine copy per url; repeated corruption of the
        // same target only refreshes the detection timestamp.
        sqlx::query(
            "INSERT INTO corrupt_records (
                id, url, name, summary, financial, news, tech, detected_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
             ON CONFLICT (url) DO UPDATE SET detected_at = NOW()",
        )
        .bind(Uuid::new_v4())
        .bind(&record.url)
        .bind(&record.name)
        .bind(&record.summary)
        .bind(&record.financial)
        .bind(&record.news)
        .bind(&record.tech)
        .execute(&self.pool)
        .await
        .context("failed to write quarantine copy")?;
        Ok(())
    }

    async fn increment_stat(&self, key: &str, by: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO run_stats (key, value)
             VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = run_stats.value + EXCLUDED.value",
        )
        .bind(key)
        .bind(by)
        .execute(&self.pool)
        .await
        .context("failed to increment stat counter")?;
        Ok(())
    }

    async fn delete_stale_running(&self, slot: i32) -> Result<()> {
        sqlx::query("DELETE FROM run_outcomes WHERE slot = $1 AND status = 'running'")
            .bind(slot)
            .execute(&self.pool)
            .await
            .context("failed to delete stale running outcome")?;
        Ok(())
    }

    async fn insert_run_outcome(&self, outcome: &RunOutcome) -> Result<()> {
        sqlx::query(
            "INSERT INTO run_outcomes (id, slot, role, started_at, status)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(outcome.id)
        .bind(outcome.slot)
        .bind(outcome.role.0.as_str())
        .bind(outcome.started_at)
        .bind(outcome.status)
        .execute(&self.pool)
        .await
        .context("failed to insert run outcome")?;
        Ok(())
    }

    async fn finalize_run_outcome(
        &self,
        id: Uuid,
        status: RunStatus,
        ended_at: DateTime<Utc>,
        duration_secs: f64,
        output_tail: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE run_outcomes
             SET status = $2, ended_at = $3, duration_secs = $4, output_tail = $5
             WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(ended_at)
        .bind(duration_secs)
        .bind(output_tail)
        .execute(&self.pool)
        .await
        .context("failed to finalize run outcome")?;
        Ok(())
    }
}
