//! Selection of persisted records for the update-refresh role.

use anyhow::Result;
use chrono::{Datelike, Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{FUNDING_OBFUSCATION_SENTINEL, OBFUSCATION_MARKER};
use crate::models::OrgRecord;
use crate::storage::Storage;

/// How many draws the flagged-urls tier may consume per batch.
const MAX_FLAGGED_DRAWS: usize = 3;

#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Staleness horizon for founded-recently and flagged records
    pub stale_after: Duration,
    /// Tighter horizon for records with live financial data
    pub financial_stale_after: Duration,
    /// Width of the "founded recently" year window
    pub recent_years: i32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::days(30),
            financial_stale_after: Duration::days(7),
            recent_years: 6,
        }
    }
}

/// Picks which persisted records the update workers refresh next.
///
/// Tier order: blank descriptions, obfuscated funding totals,
/// recently-founded stale records, stale financial data, partially
/// obfuscated fields, then externally flagged update-first urls.
/// Corrupted records are excluded at the store level in every tier.
pub struct RecordRefreshSelector<S> {
    storage: Arc<S>,
    config: RefreshConfig,
}

impl<S: Storage> RecordRefreshSelector<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self::with_config(storage, RefreshConfig::default())
    }

    pub fn with_config(storage: Arc<S>, config: RefreshConfig) -> Self {
        Self { storage, config }
    }

    /// Select up to `n` distinct records and queue-mark them.
    pub async fn select_batch(&self, n: i64) -> Result<Vec<OrgRecord>> {
        if n <= 0 {
            return Ok(Vec::new());
        }
        let n = n as usize;
        let now = Utc::now();
        let stale_cutoff = now - self.config.stale_after;
        let financial_cutoff = now - self.config.financial_stale_after;

        let mut batch: Vec<OrgRecord> = Vec::new();

        if batch.len() < n {
            let need = n - batch.len();
            batch.extend(self.storage.sample_records_blank_description(need).await?);
            debug!(total = batch.len(), "tier: blank descriptions");
        }

        if batch.len() < n {
            let need = n - batch.len();
            batch.extend(
                self.storage
                    .sample_records_funding_sentinel(need, FUNDING_OBFUSCATION_SENTINEL)
                    .await?,
            );
            debug!(total = batch.len(), "tier: funding sentinel");
        }

        if batch.len() < n {
            let need = n - batch.len();
            batch.extend(
                self.storage
                    .sample_records_recent_founded(need, &recent_year_pattern(now.year(), self.config.recent_years), stale_cutoff)
                    .await?,
            );
            debug!(total = batch.len(), "tier: recently founded, stale");
        }

        if batch.len() < n {
            let need = n - batch.len();
            batch.extend(
                self.storage
                    .sample_records_stale_financial(need, financial_cutoff)
                    .await?,
            );
            debug!(total = batch.len(), "tier: stale financial");
        }

        if batch.len() < n {
            let need = n - batch.len();
            batch.extend(
                self.storage
                    .sample_records_obfuscated(need, OBFUSCATION_MARKER)
                    .await?,
            );
            debug!(total = batch.len(), "tier: obfuscated fields");
        }

        // Flagged urls: each draw consumes (clears) the flag whether
        // or not a matching record survives the staleness filter.
        if batch.len() < n {
            for _ in 0..MAX_FLAGGED_DRAWS {
                if batch.len() >= n {
                    break;
                }
                let remaining = n - batch.len();
                let flagged = self.storage.sample_flagged_items(remaining).await?;
                if flagged.is_empty() {
                    break;
                }
                let urls: Vec<String> = flagged.iter().map(|f| f.url.clone()).collect();
                let ids: Vec<_> = flagged.iter().map(|f| f.id).collect();
                batch.extend(
                    self.storage
                        .find_records_for_urls(&urls, stale_cutoff)
                        .await?,
                );
                self.storage.clear_update_flags(&ids).await?;
            }
        }

        let mut seen = HashSet::new();
        batch.retain(|r| seen.insert(r.id));
        batch.truncate(n);

        // Best-effort queue-mark: a failed bulk write must not block
        // the already-selected batch.
        if !batch.is_empty() {
            let ids: Vec<_> = batch.iter().map(|r| r.id).collect();
            if let Err(e) = self.storage.mark_records_queued(&ids).await {
                warn!(error = %e, count = ids.len(), "queue-mark bulk write failed");
            } else {
                info!(count = ids.len(), "queued records for refresh");
            }
        }

        Ok(batch)
    }
}

/// Regex alternation over the last `span` calendar years, e.g.
/// `(2021|2022|2023|2024|2025|2026)`.
fn recent_year_pattern(current_year: i32, span: i32) -> String {
    let years: Vec<String> = ((current_year - span + 1)..=current_year)
        .map(|y| y.to_string())
        .collect();
    format!("({})", years.join("|"))
}
