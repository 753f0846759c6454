//! Document-store access behind a trait so tests can inject mocks.
//!
//! The store is the only shared mutable state between workers; all
//! cross-worker coordination (claims, counters, queue flags) goes
//! through these methods, never through in-memory locks; workers are
//! separate processes.
//!
//! Sampling methods are split one-per-selection-tier on purpose: the
//! selector's fall-through contract ("a tier is only consulted while
//! the batch is under-filled") is asserted in tests by counting calls
//! per method.

pub mod mock;
pub mod postgres;

pub use postgres::PgStorage;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use extraction::ScrapeDocument;
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{OrgRecord, OrgRecordId, RunOutcome, RunStatus, WorkItem, WorkItemId};

#[async_trait]
pub trait Storage: Send + Sync {
    // ── Work-item queue (new role) ─────────────────────────────────

    /// Random sample of items with `status = pending`.
    async fn sample_pending_items(&self, n: usize) -> Result<Vec<WorkItem>>;

    /// Random sample of unread-or-pending items. With `created_before`
    /// set, only items created before the cutoff (or with no creation
    /// timestamp) match.
    async fn sample_stale_items(
        &self,
        n: usize,
        created_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkItem>>;

    /// Random sample of items stuck in `claimed` whose claim lease
    /// expired before the cutoff.
    async fn sample_expired_claims(
        &self,
        n: usize,
        expired_before: DateTime<Utc>,
    ) -> Result<Vec<WorkItem>>;

    /// Urls that already have a non-corrupted persisted record
    /// (duplicate-ingestion guard).
    async fn existing_record_urls(&self) -> Result<HashSet<String>>;

    /// Atomically claim one item. Succeeds only if the item is not
    /// currently claimed, or its claim lease expired before
    /// `lease_expired_before`. Returns `false` when another worker
    /// won the race.
    async fn claim_item(
        &self,
        id: WorkItemId,
        lease_expired_before: DateTime<Utc>,
    ) -> Result<bool>;

    async fn complete_item(&self, id: WorkItemId) -> Result<()>;

    async fn fail_item(&self, id: WorkItemId) -> Result<()>;

    // ── Record refresh (update role) ───────────────────────────────
    // All record sampling excludes `corrupted = true` rows.

    /// Records whose summary description is missing or blank.
    async fn sample_records_blank_description(&self, n: usize) -> Result<Vec<OrgRecord>>;

    /// Records whose total funding amount equals the obfuscation
    /// sentinel literally.
    async fn sample_records_funding_sentinel(
        &self,
        n: usize,
        sentinel: &str,
    ) -> Result<Vec<OrgRecord>>;

    /// Records founded in a recent year (regex over the founded
    /// field) and not updated since the cutoff.
    async fn sample_records_recent_founded(
        &self,
        n: usize,
        year_pattern: &str,
        not_updated_since: DateTime<Utc>,
    ) -> Result<Vec<OrgRecord>>;

    /// Records with non-empty financial data and description, not
    /// updated since the cutoff.
    async fn sample_records_stale_financial(
        &self,
        n: usize,
        not_updated_since: DateTime<Utc>,
    ) -> Result<Vec<OrgRecord>>;

    /// Records with any watched field matching the obfuscation marker
    /// case-insensitively (and a usable description).
    async fn sample_records_obfuscated(
        &self,
        n: usize,
        marker: &str,
    ) -> Result<Vec<OrgRecord>>;

    /// Random sample of work items flagged `update_first`.
    async fn sample_flagged_items(&self, n: usize) -> Result<Vec<WorkItem>>;

    /// Clear the `update_first` flag on the given items, stamping
    /// `processed_at`.
    async fn clear_update_flags(&self, ids: &[WorkItemId]) -> Result<()>;

    /// Non-corrupted records for the given urls with a usable
    /// description, not updated since the cutoff.
    async fn find_records_for_urls(
        &self,
        urls: &[String],
        not_updated_since: DateTime<Utc>,
    ) -> Result<Vec<OrgRecord>>;

    /// Best-effort bulk queue-mark: `update_queued_at = now`,
    /// `is_updated = false` for every id.
    async fn mark_records_queued(&self, ids: &[OrgRecordId]) -> Result<()>;

    // ── Result persistence ─────────────────────────────────────────

    async fn insert_record(&self, record: &OrgRecord) -> Result<()>;

    /// Replace a record's field groups with a fresh scrape
    /// (`is_updated = true`, refreshed timestamps, `corrupted = false`).
    async fn update_record_document(&self, id: OrgRecordId, doc: &ScrapeDocument) -> Result<()>;

    /// Flag a record corrupted in place (timestamps refreshed, row
    /// kept; records are never deleted).
    async fn mark_record_corrupted(&self, id: OrgRecordId) -> Result<()>;

    /// Duplicate-insert a corrupted record into the quarantine store,
    /// unless a quarantine copy for the url already exists.
    async fn quarantine_copy(&self, record: &OrgRecord) -> Result<()>;

    /// Monotonically accumulate a named counter.
    async fn increment_stat(&self, key: &str, by: i64) -> Result<()>;

    // ── Run outcomes ───────────────────────────────────────────────

    /// Drop stale `running` rows for a slot before relaunch so there
    /// is never more than one "currently running" signal per slot.
    async fn delete_stale_running(&self, slot: i32) -> Result<()>;

    async fn insert_run_outcome(&self, outcome: &RunOutcome) -> Result<()>;

    async fn finalize_run_outcome(
        &self,
        id: Uuid,
        status: RunStatus,
        ended_at: DateTime<Utc>,
        duration_secs: f64,
        output_tail: &str,
    ) -> Result<()>;
}
