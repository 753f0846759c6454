//! Selection of raw work items for the new-ingestion role.

use anyhow::Result;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{WorkItem, WorkItemId};
use crate::storage::Storage;

/// Tuning for the tiered cascade.
#[derive(Debug, Clone)]
pub struct WorkQueueConfig {
    /// Items created before now - this are "aged" for tier 2
    pub stale_age: Duration,
    /// A claim older than this is abandoned and may be taken over
    pub claim_lease: Duration,
    /// Sample multiplier so tiers survive the dedup/existence filter
    pub oversample: usize,
}

impl Default for WorkQueueConfig {
    fn default() -> Self {
        Self {
            stale_age: Duration::days(30),
            claim_lease: Duration::hours(2),
            oversample: 2,
        }
    }
}

/// Picks which targets the new-ingestion workers scrape next.
///
/// Tier order: virgin pending items, then aged unread/pending, then
/// unread/pending of any age, then expired claims left behind by
/// hard-killed workers. Each returned item has already been claimed
/// atomically; a batch shorter than requested means the queue is
/// drained and the caller should back off.
pub struct WorkQueueSelector<S> {
    storage: Arc<S>,
    config: WorkQueueConfig,
}

impl<S: Storage> WorkQueueSelector<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self::with_config(storage, WorkQueueConfig::default())
    }

    pub fn with_config(storage: Arc<S>, config: WorkQueueConfig) -> Self {
        Self { storage, config }
    }

    /// Select up to `n` distinct work items and claim them.
    pub async fn select_batch(&self, n: i64) -> Result<Vec<WorkItem>> {
        if n <= 0 {
            return Ok(Vec::new());
        }
        let n = n as usize;
        let now = Utc::now();

        // Urls that already have a record never re-enter ingestion.
        let existing = self.storage.existing_record_urls().await?;

        let mut batch: Vec<WorkItem> = Vec::new();

        // Tier 1: virgin work
        self.fill_tier(&mut batch, n, &existing, |need| {
            let storage = Arc::clone(&self.storage);
            async move { storage.sample_pending_items(need).await }
        })
        .await?;

        // Tier 2: stale/unread, aged
        if batch.len() < n {
            let cutoff = now - self.config.stale_age;
            self.fill_tier(&mut batch, n, &existing, |need| {
                let storage = Arc::clone(&self.storage);
                async move { storage.sample_stale_items(need, Some(cutoff)).await }
            })
            .await?;
        }

        // Tier 3: stale/unread, any age
        if batch.len() < n {
            self.fill_tier(&mut batch, n, &existing, |need| {
                let storage = Arc::clone(&self.storage);
                async move { storage.sample_stale_items(need, None).await }
            })
            .await?;
        }

        // Tier 4: claims abandoned by hard-killed workers. Items whose
        // url already has a record finished their real work before the
        // kill; close them out instead of re-scraping.
        if batch.len() < n {
            let lease_cutoff = now - self.config.claim_lease;
            let need = (n - batch.len()) * self.config.oversample;
            let abandoned = self
                .storage
                .sample_expired_claims(need, lease_cutoff)
                .await?;
            for item in abandoned {
                if existing.contains(&item.url) {
                    debug!(url = %item.url, "abandoned claim already has a record, completing");
                    self.storage.complete_item(item.id).await?;
                } else if batch.len() < n {
                    batch.push(item);
                }
            }
        }

        dedup_by_id(&mut batch);
        batch.truncate(n);

        // Atomic per-item claim: a miss means another worker won the
        // race and the item simply drops out of this batch.
        let lease_cutoff = now - self.config.claim_lease;
        let mut claimed = Vec::with_capacity(batch.len());
        for item in batch {
            if self.storage.claim_item(item.id, lease_cutoff).await? {
                claimed.push(item);
            } else {
                debug!(url = %item.url, "lost claim race, skipping");
            }
        }

        if claimed.len() < n {
            info!(
                selected = claimed.len(),
                requested = n,
                "work queue under-filled the batch"
            );
        }
        Ok(claimed)
    }

    /// Run one sampling tier: oversample, drop urls that already have
    /// a record, drop ids already batched, take what is still needed.
    async fn fill_tier<F, Fut>(
        &self,
        batch: &mut Vec<WorkItem>,
        n: usize,
        existing: &HashSet<String>,
        sample: F,
    ) -> Result<()>
    where
        F: FnOnce(usize) -> Fut,
        Fut: std::future::Future<Output = Result<Vec<WorkItem>>>,
    {
        let need = n - batch.len();
        let sampled = match sample(need * self.config.oversample).await {
            Ok(sampled) => sampled,
            Err(e) => {
                // A failed tier read under-fills the batch; later
                // tiers may still fill it.
                warn!(error = %e, "tier sample failed");
                return Ok(());
            }
        };
        let have: HashSet<WorkItemId> = batch.iter().map(|i| i.id).collect();
        batch.extend(
            sampled
                .into_iter()
                .filter(|item| !existing.contains(&item.url) && !have.contains(&item.id))
                .take(need),
        );
        Ok(())
    }
}

fn dedup_by_id(items: &mut Vec<WorkItem>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mock::{fixture_item, MockStorage};

    fn items(urls: &[&str]) -> Vec<WorkItem> {
        urls.iter().map(|u| fixture_item(u)).collect()
    }

    #[tokio::test]
    async fn non_positive_n_touches_nothing() {
        let storage = Arc::new(MockStorage::new());
        let selector = WorkQueueSelector::new(Arc::clone(&storage));

        assert!(selector.select_batch(0).await.unwrap().is_empty());
        assert!(selector.select_batch(-3).await.unwrap().is_empty());
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn tier_one_fill_skips_later_tiers() {
        let storage = Arc::new(
            MockStorage::new().with_pending(items(&["u1", "u2", "u3", "u4"])),
        );
        let selector = WorkQueueSelector::new(Arc::clone(&storage));

        let batch = selector.select_batch(2).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(storage.call_count("pending"), 1);
        assert_eq!(storage.call_count("stale_aged"), 0);
        assert_eq!(storage.call_count("stale_any"), 0);
        assert_eq!(storage.call_count("expired_claims"), 0);
    }

    #[tokio::test]
    async fn underfilled_tier_falls_through() {
        let storage = Arc::new(
            MockStorage::new()
                .with_pending(items(&["u1"]))
                .with_stale_aged(items(&["u2"]))
                .with_stale_any(items(&["u3", "u4"])),
        );
        let selector = WorkQueueSelector::new(Arc::clone(&storage));

        let batch = selector.select_batch(3).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(storage.call_count("pending"), 1);
        assert_eq!(storage.call_count("stale_aged"), 1);
        assert_eq!(storage.call_count("stale_any"), 1);
    }

    #[tokio::test]
    async fn existing_urls_filtered_and_batch_distinct() {
        let mut pending = items(&["known", "fresh"]);
        // Same item sampled by two tiers must appear once
        let dup = pending[1].clone();
        let storage = Arc::new(
            MockStorage::new()
                .with_pending(pending.drain(..).collect::<Vec<_>>())
                .with_stale_any(vec![dup])
                .with_existing_urls(&["known"]),
        );
        let selector = WorkQueueSelector::new(Arc::clone(&storage));

        let batch = selector.select_batch(5).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].url, "fresh");

        let mut ids: Vec<_> = batch.iter().map(|i| i.id).collect();
        ids.dedup();
        assert_eq!(ids.len(), batch.len());
    }

    #[tokio::test]
    async fn every_returned_item_is_claimed_exactly_once() {
        let storage = Arc::new(MockStorage::new().with_pending(items(&["u1", "u2"])));
        let selector = WorkQueueSelector::new(Arc::clone(&storage));

        let batch = selector.select_batch(2).await.unwrap();
        let claimed = storage.claimed_ids();
        assert_eq!(claimed.len(), 2);
        for item in &batch {
            assert_eq!(claimed.iter().filter(|id| **id == item.id).count(), 1);
        }
    }

    #[tokio::test]
    async fn lost_claim_race_drops_item() {
        let pending = items(&["u1", "u2"]);
        let lost = pending[0].id;
        let storage = Arc::new(
            MockStorage::new()
                .with_pending(pending)
                .deny_claims(&[lost]),
        );
        let selector = WorkQueueSelector::new(Arc::clone(&storage));

        let batch = selector.select_batch(2).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].url, "u2");
    }

    #[tokio::test]
    async fn abandoned_claim_with_record_is_completed_not_rescraped() {
        let abandoned = items(&["done", "half"]);
        let done_id = abandoned[0].id;
        let storage = Arc::new(
            MockStorage::new()
                .with_expired_claims(abandoned)
                .with_existing_urls(&["done"]),
        );
        let selector = WorkQueueSelector::new(Arc::clone(&storage));

        let batch = selector.select_batch(2).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].url, "half");
        assert_eq!(storage.completed_ids(), vec![done_id]);
    }
}
