// MockStorage - in-memory Storage implementation for tests.
//
// Records every call (method label, in order) so selector tests can
// assert tier fall-through by call count, and captures all writes so
// worker tests can assert classification outcomes.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use extraction::ScrapeDocument;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use super::Storage;
use crate::models::{
    OrgRecord, OrgRecordId, RunOutcome, RunStatus, WorkItem, WorkItemId, WorkItemStatus,
};

#[derive(Default)]
struct MockState {
    calls: Vec<&'static str>,
    pending: Vec<WorkItem>,
    stale_aged: Vec<WorkItem>,
    stale_any: Vec<WorkItem>,
    expired_claims: Vec<WorkItem>,
    existing_urls: HashSet<String>,
    deny_claims: HashSet<WorkItemId>,
    claimed: Vec<WorkItemId>,
    completed: Vec<WorkItemId>,
    failed: Vec<WorkItemId>,
    blank_description: Vec<OrgRecord>,
    funding_sentinel: Vec<OrgRecord>,
    recent_founded: Vec<OrgRecord>,
    stale_financial: Vec<OrgRecord>,
    obfuscated: Vec<OrgRecord>,
    flagged_items: Vec<WorkItem>,
    flagged_records: HashMap<String, OrgRecord>,
    cleared_flags: Vec<WorkItemId>,
    queued: Vec<OrgRecordId>,
    fail_queue_mark: bool,
    inserted_records: Vec<OrgRecord>,
    updated_documents: Vec<(OrgRecordId, ScrapeDocument)>,
    corrupted_marks: Vec<OrgRecordId>,
    quarantined_urls: Vec<String>,
    stats: HashMap<String, i64>,
    run_outcomes: Vec<RunOutcome>,
    finalized: Vec<(Uuid, RunStatus, f64, String)>,
    stale_running_deleted: Vec<i32>,
}

#[derive(Default)]
pub struct MockStorage {
    state: Mutex<MockState>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Builders ───────────────────────────────────────────────────

    pub fn with_pending(self, items: Vec<WorkItem>) -> Self {
        self.state.lock().unwrap().pending = items;
        self
    }

    pub fn with_stale_aged(self, items: Vec<WorkItem>) -> Self {
        self.state.lock().unwrap().stale_aged = items;
        self
    }

    pub fn with_stale_any(self, items: Vec<WorkItem>) -> Self {
        self.state.lock().unwrap().stale_any = items;
        self
    }

    pub fn with_expired_claims(self, items: Vec<WorkItem>) -> Self {
        self.state.lock().unwrap().expired_claims = items;
        self
    }

    pub fn with_existing_urls(self, urls: &[&str]) -> Self {
        self.state.lock().unwrap().existing_urls =
            urls.iter().map(|u| u.to_string()).collect();
        self
    }

    /// Make `claim_item` report a lost race for these ids.
    pub fn deny_claims(self, ids: &[WorkItemId]) -> Self {
        self.state.lock().unwrap().deny_claims = ids.iter().copied().collect();
        self
    }

    pub fn with_blank_description(self, records: Vec<OrgRecord>) -> Self {
        self.state.lock().unwrap().blank_description = records;
        self
    }

    pub fn with_funding_sentinel(self, records: Vec<OrgRecord>) -> Self {
        self.state.lock().unwrap().funding_sentinel = records;
        self
    }

    pub fn with_recent_founded(self, records: Vec<OrgRecord>) -> Self {
        self.state.lock().unwrap().recent_founded = records;
        self
    }

    pub fn with_stale_financial(self, records: Vec<OrgRecord>) -> Self {
        self.state.lock().unwrap().stale_financial = records;
        self
    }

    pub fn with_obfuscated(self, records: Vec<OrgRecord>) -> Self {
        self.state.lock().unwrap().obfuscated = records;
        self
    }

    /// Flagged work items plus the records behind their urls.
    pub fn with_flagged(self, items: Vec<WorkItem>, records: Vec<OrgRecord>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.flagged_items = items;
            state.flagged_records =
                records.into_iter().map(|r| (r.url.clone(), r)).collect();
        }
        self
    }

    pub fn failing_queue_mark(self) -> Self {
        self.state.lock().unwrap().fail_queue_mark = true;
        self
    }

    // ── Assertions ─────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, label: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| **c == label)
            .count()
    }

    pub fn claimed_ids(&self) -> Vec<WorkItemId> {
        self.state.lock().unwrap().claimed.clone()
    }

    pub fn completed_ids(&self) -> Vec<WorkItemId> {
        self.state.lock().unwrap().completed.clone()
    }

    pub fn failed_ids(&self) -> Vec<WorkItemId> {
        self.state.lock().unwrap().failed.clone()
    }

    pub fn cleared_flag_ids(&self) -> Vec<WorkItemId> {
        self.state.lock().unwrap().cleared_flags.clone()
    }

    pub fn queued_ids(&self) -> Vec<OrgRecordId> {
        self.state.lock().unwrap().queued.clone()
    }

    pub fn inserted_records(&self) -> Vec<OrgRecord> {
        self.state.lock().unwrap().inserted_records.clone()
    }

    pub fn updated_documents(&self) -> Vec<(OrgRecordId, ScrapeDocument)> {
        self.state.lock().unwrap().updated_documents.clone()
    }

    pub fn corrupted_marks(&self) -> Vec<OrgRecordId> {
        self.state.lock().unwrap().corrupted_marks.clone()
    }

    pub fn quarantined_urls(&self) -> Vec<String> {
        self.state.lock().unwrap().quarantined_urls.clone()
    }

    pub fn stat(&self, key: &str) -> i64 {
        self.state
            .lock()
            .unwrap()
            .stats
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    pub fn run_outcomes(&self) -> Vec<RunOutcome> {
        self.state.lock().unwrap().run_outcomes.clone()
    }

    pub fn finalized(&self) -> Vec<(Uuid, RunStatus, f64, String)> {
        self.state.lock().unwrap().finalized.clone()
    }

    pub fn stale_running_deleted(&self) -> Vec<i32> {
        self.state.lock().unwrap().stale_running_deleted.clone()
    }
}

fn take(source: &[WorkItem], n: usize) -> Vec<WorkItem> {
    source.iter().take(n).cloned().collect()
}

fn take_records(source: &[OrgRecord], n: usize) -> Vec<OrgRecord> {
    source.iter().take(n).cloned().collect()
}

#[async_trait]
impl Storage for MockStorage {
    async fn sample_pending_items(&self, n: usize) -> Result<Vec<WorkItem>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("pending");
        Ok(take(&state.pending, n))
    }

    async fn sample_stale_items(
        &self,
        n: usize,
        created_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkItem>> {
        let mut state = self.state.lock().unwrap();
        if created_before.is_some() {
            state.calls.push("stale_aged");
            Ok(take(&state.stale_aged, n))
        } else {
            state.calls.push("stale_any");
            Ok(take(&state.stale_any, n))
        }
    }

    async fn sample_expired_claims(
        &self,
        n: usize,
        _expired_before: DateTime<Utc>,
    ) -> Result<Vec<WorkItem>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("expired_claims");
        Ok(take(&state.expired_claims, n))
    }

    async fn existing_record_urls(&self) -> Result<HashSet<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("existing_urls");
        Ok(state.existing_urls.clone())
    }

    async fn claim_item(
        &self,
        id: WorkItemId,
        _lease_expired_before: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("claim");
        if state.deny_claims.contains(&id) {
            return Ok(false);
        }
        state.claimed.push(id);
        Ok(true)
    }

    async fn complete_item(&self, id: WorkItemId) -> Result<()> {
        self.state.lock().unwrap().completed.push(id);
        Ok(())
    }

    async fn fail_item(&self, id: WorkItemId) -> Result<()> {
        self.state.lock().unwrap().failed.push(id);
        Ok(())
    }

    async fn sample_records_blank_description(&self, n: usize) -> Result<Vec<OrgRecord>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("blank_description");
        Ok(take_records(&state.blank_description, n))
    }

    async fn sample_records_funding_sentinel(
        &self,
        n: usize,
        _sentinel: &str,
    ) -> Result<Vec<OrgRecord>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("funding_sentinel");
        Ok(take_records(&state.funding_sentinel, n))
    }

    async fn sample_records_recent_founded(
        &self,
        n: usize,
        _year_pattern: &str,
        _not_updated_since: DateTime<Utc>,
    ) -> Result<Vec<OrgRecord>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("recent_founded");
        Ok(take_records(&state.recent_founded, n))
    }

    async fn sample_records_stale_financial(
        &self,
        n: usize,
        _not_updated_since: DateTime<Utc>,
    ) -> Result<Vec<OrgRecord>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("stale_financial");
        Ok(take_records(&state.stale_financial, n))
    }

    async fn sample_records_obfuscated(
        &self,
        n: usize,
        _marker: &str,
    ) -> Result<Vec<OrgRecord>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("obfuscated");
        Ok(take_records(&state.obfuscated, n))
    }

    async fn sample_flagged_items(&self, n: usize) -> Result<Vec<WorkItem>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("flagged");
        let count = n.min(state.flagged_items.len());
        Ok(state.flagged_items.drain(..count).collect())
    }

    async fn clear_update_flags(&self, ids: &[WorkItemId]) -> Result<()> {
        self.state.lock().unwrap().cleared_flags.extend_from_slice(ids);
        Ok(())
    }

    async fn find_records_for_urls(
        &self,
        urls: &[String],
        _not_updated_since: DateTime<Utc>,
    ) -> Result<Vec<OrgRecord>> {
        let state = self.state.lock().unwrap();
        Ok(urls
            .iter()
            .filter_map(|u| state.flagged_records.get(u).cloned())
            .collect())
    }

    async fn mark_records_queued(&self, ids: &[OrgRecordId]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_queue_mark {
            bail!("simulated bulk write failure");
        }
        state.queued.extend_from_slice(ids);
        Ok(())
    }

    async fn insert_record(&self, record: &OrgRecord) -> Result<()> {
        self.state.lock().unwrap().inserted_records.push(record.clone());
        Ok(())
    }

    async fn update_record_document(&self, id: OrgRecordId, doc: &ScrapeDocument) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .updated_documents
            .push((id, doc.clone()));
        Ok(())
    }

    async fn mark_record_corrupted(&self, id: OrgRecordId) -> Result<()> {
        self.state.lock().unwrap().corrupted_marks.push(id);
        Ok(())
    }

    async fn quarantine_copy(&self, record: &OrgRecord) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .quarantined_urls
            .push(record.url.clone());
        Ok(())
    }

    async fn increment_stat(&self, key: &str, by: i64) -> Result<()> {
        *self
            .state
            .lock()
            .unwrap()
            .stats
            .entry(key.to_string())
            .or_insert(0) += by;
        Ok(())
    }

    async fn delete_stale_running(&self, slot: i32) -> Result<()> {
        self.state.lock().unwrap().stale_running_deleted.push(slot);
        Ok(())
    }

    async fn insert_run_outcome(&self, outcome: &RunOutcome) -> Result<()> {
        self.state.lock().unwrap().run_outcomes.push(outcome.clone());
        Ok(())
    }

    async fn finalize_run_outcome(
        &self,
        id: Uuid,
        status: RunStatus,
        _ended_at: DateTime<Utc>,
        duration_secs: f64,
        output_tail: &str,
    ) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .finalized
            .push((id, status, duration_secs, output_tail.to_string()));
        Ok(())
    }
}

/// Test fixture: a pending work item for a url.
pub fn fixture_item(url: &str) -> WorkItem {
    WorkItem {
        id: Uuid::new_v4(),
        url: url.to_string(),
        status: WorkItemStatus::Pending,
        is_read: false,
        update_first: false,
        created_at: Some(Utc::now()),
        claimed_at: None,
        processed_at: None,
    }
}

/// Test fixture: a persisted record for a url.
pub fn fixture_record(url: &str) -> OrgRecord {
    OrgRecord {
        id: Uuid::new_v4(),
        url: url.to_string(),
        name: "Fixture Org".to_string(),
        summary: None,
        financial: None,
        news: None,
        tech: None,
        corrupted: false,
        is_updated: false,
        update_queued_at: None,
        updated_at: None,
        last_processed_at: None,
        created_at: Utc::now(),
    }
}
