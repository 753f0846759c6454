//! The worker process: batch loop, per-target scrape, and result
//! classification for both roles.
//!
//! A worker owns exactly one credential for its whole lifetime. It
//! logs in once, then pulls batches from its role's selector until
//! the batch cap is hit or the queue drains. Per-item failures are
//! contained; only authentication exhaustion aborts the run.

pub mod retry;
pub mod session;

pub use retry::{ErrorClass, RetryPolicy};
pub use session::{BaseHttpClient, FetchOutcome, HttpResponse, ReqwestClient, ScraperSession};

use anyhow::Result;
use extraction::{BaseFieldExtractor, FieldGroup, ScrapeDocument};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::BatchSettings;
use crate::models::{OrgRecord, WorkItem, WorkerRole};
use crate::selector::{RecordRefreshSelector, WorkQueueSelector};
use crate::storage::Storage;
use retry::jittered_sleep;

// Sub-resource paths relative to a profile url.
const FINANCIAL_PATH: &str = "/financial_details";
const NEWS_PATH: &str = "/news_and_analysis";
const TECH_PATH: &str = "/tech_details";

const STAT_NEW_RECORDS: &str = "new_records";
const STAT_UPDATED_RECORDS: &str = "updated_records";
const STAT_CORRUPT_RECORDS: &str = "corrupt_records";

/// Deliberate throttling between requests, items, and batches.
///
/// One credential must look like one patient human, so every request
/// is separated by a randomized pause.
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Between sub-page fetches of the same target
    pub page_min: Duration,
    pub page_max: Duration,
    /// Between items of a batch
    pub item_min: Duration,
    pub item_max: Duration,
    /// After an empty batch, before giving up
    pub idle_min: Duration,
    pub idle_max: Duration,
    /// After a failed batch selection, before retrying
    pub retry_pause: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            page_min: Duration::from_secs(3),
            page_max: Duration::from_secs(10),
            item_min: Duration::from_secs(2),
            item_max: Duration::from_secs(5),
            idle_min: Duration::from_secs(50),
            idle_max: Duration::from_secs(100),
            retry_pause: Duration::from_secs(30),
        }
    }
}

impl Pacing {
    /// No pauses at all, for tests.
    pub fn zero() -> Self {
        Self {
            page_min: Duration::ZERO,
            page_max: Duration::ZERO,
            item_min: Duration::ZERO,
            item_max: Duration::ZERO,
            idle_min: Duration::ZERO,
            idle_max: Duration::ZERO,
            retry_pause: Duration::ZERO,
        }
    }
}

/// What one target's scrape boiled down to.
enum ScrapeOutcome {
    /// All reachable sub-resources fetched and merged
    Document(ScrapeDocument),
    /// The primary page 404ed, the target no longer exists
    TargetGone,
    /// Retries exhausted somewhere, nothing usable
    Failed,
}

/// One worker run, bound to a single credential and role.
pub struct Worker<S, C, E> {
    storage: Arc<S>,
    session: ScraperSession<C>,
    extractor: E,
    settings: BatchSettings,
    pacing: Pacing,
}

impl<S, C, E> Worker<S, C, E>
where
    S: Storage,
    C: BaseHttpClient,
    E: BaseFieldExtractor,
{
    pub fn new(
        storage: Arc<S>,
        session: ScraperSession<C>,
        extractor: E,
        settings: BatchSettings,
    ) -> Self {
        Self {
            storage,
            session,
            extractor,
            settings,
            pacing: Pacing::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Authenticate, then drive the batch loop for the given role.
    pub async fn run(&self, role: WorkerRole) -> Result<()> {
        info!(role = %role, credential = self.session.credential_id(), "worker starting");
        self.session.login().await?;
        match role {
            WorkerRole::New => self.run_new().await,
            WorkerRole::Update => self.run_update().await,
        }
    }

    async fn run_new(&self) -> Result<()> {
        let selector = WorkQueueSelector::new(Arc::clone(&self.storage));
        for batch_no in 1..=self.settings.max_batches {
            let items = match selector.select_batch(self.settings.batch_size as i64).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(batch_no, error = %e, "batch selection failed");
                    tokio::time::sleep(self.pacing.retry_pause).await;
                    continue;
                }
            };
            if items.is_empty() {
                info!(batch_no, "work queue drained");
                jittered_sleep(self.pacing.idle_min, self.pacing.idle_max).await;
                break;
            }
            info!(batch_no, count = items.len(), "ingesting batch");
            for item in &items {
                let outcome = self.scrape_target(&item.url).await;
                if let Err(e) = self.finish_new_item(item, outcome).await {
                    warn!(url = %item.url, error = %e, "failed to persist item result");
                }
                jittered_sleep(self.pacing.item_min, self.pacing.item_max).await;
            }
        }
        Ok(())
    }

    async fn run_update(&self) -> Result<()> {
        let selector = RecordRefreshSelector::new(Arc::clone(&self.storage));
        for batch_no in 1..=self.settings.max_batches {
            let records = match selector.select_batch(self.settings.batch_size as i64).await
            {
                Ok(records) => records,
                Err(e) => {
                    warn!(batch_no, error = %e, "batch selection failed");
                    tokio::time::sleep(self.pacing.retry_pause).await;
                    continue;
                }
            };
            if records.is_empty() {
                info!(batch_no, "nothing left to refresh");
                jittered_sleep(self.pacing.idle_min, self.pacing.idle_max).await;
                break;
            }
            info!(batch_no, count = records.len(), "refreshing batch");
            for record in &records {
                let outcome = self.scrape_target(&record.url).await;
                if let Err(e) = self.finish_update(record, outcome).await {
                    warn!(url = %record.url, error = %e, "failed to persist refresh result");
                }
                jittered_sleep(self.pacing.item_min, self.pacing.item_max).await;
            }
        }
        Ok(())
    }

    /// Fetch the primary page, then every sub-page the summary links
    /// to, merging the extracted groups.
    ///
    /// A primary 404 short-circuits before any sub-page request. Any
    /// sub-page miss fails the whole target rather than persisting a
    /// partial document: a linked sub-page that 404s, fails to fetch,
    /// or fails to extract aborts the item.
    async fn scrape_target(&self, url: &str) -> ScrapeOutcome {
        jittered_sleep(self.pacing.page_min, self.pacing.page_max).await;
        let body = match self.session.fetch(url).await {
            FetchOutcome::Success(body) => body,
            FetchOutcome::NotFound => return ScrapeOutcome::TargetGone,
            FetchOutcome::Failed => return ScrapeOutcome::Failed,
        };

        let (summary, links) = match self.extractor.extract_summary(&body) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(url, error = %e, "summary extraction failed");
                return ScrapeOutcome::Failed;
            }
        };

        let mut doc = ScrapeDocument::new();
        doc.merge(FieldGroup::Summary(summary));

        if links.financial {
            let Some(body) = self.fetch_sub_page(url, FINANCIAL_PATH).await else {
                return ScrapeOutcome::Failed;
            };
            match self.extractor.extract_financial(&body) {
                Ok(group) => {
                    doc.merge(FieldGroup::Financial(group));
                }
                Err(e) => {
                    warn!(url, error = %e, "financial extraction failed");
                    return ScrapeOutcome::Failed;
                }
            }
        }

        if links.news {
            let Some(body) = self.fetch_sub_page(url, NEWS_PATH).await else {
                return ScrapeOutcome::Failed;
            };
            match self.extractor.extract_news(&body) {
                Ok(group) => {
                    doc.merge(FieldGroup::News(group));
                }
                Err(e) => {
                    warn!(url, error = %e, "news extraction failed");
                    return ScrapeOutcome::Failed;
                }
            }
        }

        if links.tech {
            let Some(body) = self.fetch_sub_page(url, TECH_PATH).await else {
                return ScrapeOutcome::Failed;
            };
            match self.extractor.extract_tech(&body) {
                Ok(group) => {
                    doc.merge(FieldGroup::Tech(group));
                }
                Err(e) => {
                    warn!(url, error = %e, "tech extraction failed");
                    return ScrapeOutcome::Failed;
                }
            }
        }

        ScrapeOutcome::Document(doc)
    }

    /// A linked sub-page is mandatory once the summary advertises it,
    /// so a 404 here is a failed fetch, not a skip.
    async fn fetch_sub_page(&self, base_url: &str, path: &str) -> Option<String> {
        jittered_sleep(self.pacing.page_min, self.pacing.page_max).await;
        let url = format!("{}{}", base_url.trim_end_matches('/'), path);
        match self.session.fetch(&url).await {
            FetchOutcome::Success(body) => Some(body),
            FetchOutcome::NotFound => {
                warn!(%url, "linked sub-page is missing");
                None
            }
            FetchOutcome::Failed => None,
        }
    }

    /// New role: a good document becomes a record, a gone target or a
    /// blank core field becomes a corrupted record (kept plus
    /// quarantine copy), a failed scrape marks the item failed for a
    /// later lease-expiry retry.
    async fn finish_new_item(&self, item: &WorkItem, outcome: ScrapeOutcome) -> Result<()> {
        match outcome {
            ScrapeOutcome::Document(doc) if doc.has_core_description() => {
                let record =
                    OrgRecord::from_document(item.url.clone(), item.display_name(), &doc);
                self.storage.insert_record(&record).await?;
                self.storage.increment_stat(STAT_NEW_RECORDS, 1).await?;
                self.storage.complete_item(item.id).await?;
                info!(url = %item.url, "new record ingested");
            }
            ScrapeOutcome::Document(doc) => {
                warn!(url = %item.url, "scraped document has no usable description");
                self.quarantine_new(item, &doc).await?;
            }
            ScrapeOutcome::TargetGone => {
                warn!(url = %item.url, "target no longer exists");
                self.quarantine_new(item, &ScrapeDocument::new()).await?;
            }
            ScrapeOutcome::Failed => {
                warn!(url = %item.url, "scrape failed, marking item for retry");
                self.storage.fail_item(item.id).await?;
            }
        }
        Ok(())
    }

    async fn quarantine_new(&self, item: &WorkItem, doc: &ScrapeDocument) -> Result<()> {
        let mut record = OrgRecord::from_document(item.url.clone(), item.display_name(), doc);
        record.corrupted = true;
        self.storage.insert_record(&record).await?;
        self.storage.quarantine_copy(&record).await?;
        self.storage.increment_stat(STAT_CORRUPT_RECORDS, 1).await?;
        // The item is done either way: re-scraping a gone target is
        // the refresh tiers' job, not the ingestion queue's.
        self.storage.complete_item(item.id).await?;
        Ok(())
    }

    /// Update role: a good document replaces the record's field
    /// groups, a gone target or blank core field flags the record
    /// corrupted in place, a failed scrape just leaves the queue mark
    /// for the next cycle.
    async fn finish_update(&self, record: &OrgRecord, outcome: ScrapeOutcome) -> Result<()> {
        match outcome {
            ScrapeOutcome::Document(doc) if doc.has_core_description() => {
                self.storage.update_record_document(record.id, &doc).await?;
                self.storage.increment_stat(STAT_UPDATED_RECORDS, 1).await?;
                info!(url = %record.url, "record refreshed");
            }
            ScrapeOutcome::Document(_) | ScrapeOutcome::TargetGone => {
                warn!(url = %record.url, "refresh came back unusable, flagging corrupted");
                self.storage.mark_record_corrupted(record.id).await?;
                self.storage.quarantine_copy(record).await?;
            }
            ScrapeOutcome::Failed => {
                warn!(url = %record.url, "refresh failed, leaving record queued");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::session::test_client::{marked, MockHttpClient};
    use super::*;
    use crate::models::Credential;
    use crate::storage::mock::{fixture_item, fixture_record, MockStorage};
    use extraction::{
        ExtractionError, FinancialFields, NewsFields, SubPageLinks, SummaryFields, TechFields,
    };

    struct StubExtractor {
        description: Option<String>,
        links: SubPageLinks,
        fail_financial: bool,
    }

    impl StubExtractor {
        fn with_description() -> Self {
            Self {
                description: Some("builds warehouse robots".to_string()),
                links: SubPageLinks::default(),
                fail_financial: false,
            }
        }

        fn blank() -> Self {
            Self {
                description: None,
                links: SubPageLinks::default(),
                fail_financial: false,
            }
        }

        fn financial_linked() -> Self {
            Self {
                links: SubPageLinks {
                    financial: true,
                    news: false,
                    tech: false,
                },
                ..Self::with_description()
            }
        }
    }

    impl BaseFieldExtractor for StubExtractor {
        fn extract_summary(
            &self,
            _body: &str,
        ) -> Result<(SummaryFields, SubPageLinks), ExtractionError> {
            Ok((
                SummaryFields {
                    name: Some("Acme".to_string()),
                    description: self.description.clone(),
                    ..Default::default()
                },
                self.links,
            ))
        }

        fn extract_financial(&self, _body: &str) -> Result<FinancialFields, ExtractionError> {
            if self.fail_financial {
                return Err(ExtractionError::MalformedPage {
                    sub_resource: "financial",
                    reason: "no funding table".to_string(),
                });
            }
            Ok(FinancialFields::default())
        }

        fn extract_news(&self, _body: &str) -> Result<NewsFields, ExtractionError> {
            Ok(NewsFields::default())
        }

        fn extract_tech(&self, _body: &str) -> Result<TechFields, ExtractionError> {
            Ok(TechFields::default())
        }
    }

    fn worker(
        storage: Arc<MockStorage>,
        client: Arc<MockHttpClient>,
        extractor: StubExtractor,
    ) -> Worker<MockStorage, Arc<MockHttpClient>, StubExtractor> {
        let session = ScraperSession::with_policies(
            client,
            Credential::new("worker@example.com", "pw"),
            "https://portal.example.com/sessions".to_string(),
            RetryPolicy::immediate(2),
            RetryPolicy::immediate(2),
        );
        Worker::new(
            storage,
            session,
            extractor,
            BatchSettings {
                batch_size: 10,
                max_batches: 1,
            },
        )
        .with_pacing(Pacing::zero())
    }

    const URL: &str = "https://portal.example.com/organization/acme-robotics";

    fn ok(body: String) -> HttpResponse {
        HttpResponse { status: 200, body }
    }

    fn status(code: u16) -> HttpResponse {
        HttpResponse {
            status: code,
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn successful_ingestion_inserts_and_counts() {
        let storage = Arc::new(MockStorage::new().with_pending(vec![fixture_item(URL)]));
        let client = Arc::new(
            MockHttpClient::new().with_page(URL, vec![ok(marked("profile"))]),
        );

        worker(Arc::clone(&storage), Arc::clone(&client), StubExtractor::with_description())
            .run(WorkerRole::New)
            .await
            .unwrap();

        let inserted = storage.inserted_records();
        assert_eq!(inserted.len(), 1);
        assert!(!inserted[0].corrupted);
        assert_eq!(inserted[0].name, "Acme Robotics");
        assert_eq!(storage.stat("new_records"), 1);
        assert_eq!(storage.completed_ids().len(), 1);
        assert!(storage.failed_ids().is_empty());
    }

    #[tokio::test]
    async fn gone_target_skips_sub_pages_entirely() {
        let storage = Arc::new(MockStorage::new().with_pending(vec![fixture_item(URL)]));
        let client = Arc::new(MockHttpClient::new().with_page(URL, vec![status(404)]));

        let extractor = StubExtractor {
            description: Some("would have linked everything".to_string()),
            links: SubPageLinks {
                financial: true,
                news: true,
                tech: true,
            },
            fail_financial: false,
        };
        worker(Arc::clone(&storage), Arc::clone(&client), extractor)
            .run(WorkerRole::New)
            .await
            .unwrap();

        // Only the primary page was requested
        assert_eq!(client.get_calls(), vec![URL.to_string()]);
        let inserted = storage.inserted_records();
        assert_eq!(inserted.len(), 1);
        assert!(inserted[0].corrupted);
        assert_eq!(storage.quarantined_urls(), vec![URL.to_string()]);
        assert_eq!(storage.completed_ids().len(), 1);
        assert_eq!(storage.stat("new_records"), 0);
    }

    #[tokio::test]
    async fn blank_description_is_quarantined_not_counted() {
        let storage = Arc::new(MockStorage::new().with_pending(vec![fixture_item(URL)]));
        let client = Arc::new(
            MockHttpClient::new().with_page(URL, vec![ok(marked("empty profile"))]),
        );

        worker(Arc::clone(&storage), Arc::clone(&client), StubExtractor::blank())
            .run(WorkerRole::New)
            .await
            .unwrap();

        let inserted = storage.inserted_records();
        assert_eq!(inserted.len(), 1);
        assert!(inserted[0].corrupted);
        assert_eq!(storage.quarantined_urls().len(), 1);
        assert_eq!(storage.stat("new_records"), 0);
        assert_eq!(storage.stat("corrupt_records"), 1);
    }

    #[tokio::test]
    async fn failed_fetch_marks_item_failed() {
        let storage = Arc::new(MockStorage::new().with_pending(vec![fixture_item(URL)]));
        let client = Arc::new(MockHttpClient::new().with_page(URL, vec![status(503)]));

        worker(Arc::clone(&storage), Arc::clone(&client), StubExtractor::with_description())
            .run(WorkerRole::New)
            .await
            .unwrap();

        assert_eq!(storage.failed_ids().len(), 1);
        assert!(storage.inserted_records().is_empty());
        assert!(storage.completed_ids().is_empty());
    }

    #[tokio::test]
    async fn linked_sub_pages_are_fetched_and_merged() {
        let storage = Arc::new(MockStorage::new().with_pending(vec![fixture_item(URL)]));
        let client = Arc::new(
            MockHttpClient::new()
                .with_page(URL, vec![ok(marked("profile"))])
                .with_page(
                    &format!("{URL}/financial_details"),
                    vec![ok(marked("financials"))],
                ),
        );

        worker(
            Arc::clone(&storage),
            Arc::clone(&client),
            StubExtractor::financial_linked(),
        )
        .run(WorkerRole::New)
        .await
        .unwrap();

        assert_eq!(client.get_calls().len(), 2);
        let inserted = storage.inserted_records();
        assert!(inserted[0].financial.is_some());
        assert_eq!(storage.stat("new_records"), 1);
    }

    #[tokio::test]
    async fn sub_page_failure_fails_the_whole_item() {
        let storage = Arc::new(MockStorage::new().with_pending(vec![fixture_item(URL)]));
        let client = Arc::new(
            MockHttpClient::new()
                .with_page(URL, vec![ok(marked("profile"))])
                .with_page(&format!("{URL}/financial_details"), vec![status(503)]),
        );

        worker(
            Arc::clone(&storage),
            Arc::clone(&client),
            StubExtractor::financial_linked(),
        )
        .run(WorkerRole::New)
        .await
        .unwrap();

        // No partial record
        assert!(storage.inserted_records().is_empty());
        assert_eq!(storage.failed_ids().len(), 1);
    }

    #[tokio::test]
    async fn missing_sub_page_fails_the_item_instead_of_partial_insert() {
        let storage = Arc::new(MockStorage::new().with_pending(vec![fixture_item(URL)]));
        let client = Arc::new(
            MockHttpClient::new()
                .with_page(URL, vec![ok(marked("profile"))])
                .with_page(&format!("{URL}/financial_details"), vec![status(404)]),
        );

        worker(
            Arc::clone(&storage),
            Arc::clone(&client),
            StubExtractor::financial_linked(),
        )
        .run(WorkerRole::New)
        .await
        .unwrap();

        assert!(storage.inserted_records().is_empty());
        assert_eq!(storage.stat("new_records"), 0);
        assert_eq!(storage.failed_ids().len(), 1);
        assert!(storage.completed_ids().is_empty());
    }

    #[tokio::test]
    async fn sub_page_extraction_error_fails_the_item() {
        let storage = Arc::new(MockStorage::new().with_pending(vec![fixture_item(URL)]));
        let client = Arc::new(
            MockHttpClient::new()
                .with_page(URL, vec![ok(marked("profile"))])
                .with_page(
                    &format!("{URL}/financial_details"),
                    vec![ok(marked("garbled"))],
                ),
        );

        let extractor = StubExtractor {
            fail_financial: true,
            ..StubExtractor::financial_linked()
        };
        worker(Arc::clone(&storage), Arc::clone(&client), extractor)
            .run(WorkerRole::New)
            .await
            .unwrap();

        assert!(storage.inserted_records().is_empty());
        assert_eq!(storage.failed_ids().len(), 1);
    }

    #[tokio::test]
    async fn refresh_replaces_document_and_counts() {
        let record = fixture_record(URL);
        let record_id = record.id;
        let storage = Arc::new(MockStorage::new().with_blank_description(vec![record]));
        let client = Arc::new(
            MockHttpClient::new().with_page(URL, vec![ok(marked("profile"))]),
        );

        worker(Arc::clone(&storage), Arc::clone(&client), StubExtractor::with_description())
            .run(WorkerRole::Update)
            .await
            .unwrap();

        let updated = storage.updated_documents();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].0, record_id);
        assert_eq!(storage.stat("updated_records"), 1);
        assert!(storage.corrupted_marks().is_empty());
    }

    #[tokio::test]
    async fn unusable_refresh_flags_record_corrupted() {
        let record = fixture_record(URL);
        let record_id = record.id;
        let storage = Arc::new(MockStorage::new().with_blank_description(vec![record]));
        let client = Arc::new(MockHttpClient::new().with_page(URL, vec![status(404)]));

        worker(Arc::clone(&storage), Arc::clone(&client), StubExtractor::with_description())
            .run(WorkerRole::Update)
            .await
            .unwrap();

        assert_eq!(storage.corrupted_marks(), vec![record_id]);
        assert_eq!(storage.quarantined_urls(), vec![URL.to_string()]);
        assert!(storage.updated_documents().is_empty());
    }

    #[tokio::test]
    async fn exhausted_login_aborts_the_run() {
        let storage = Arc::new(MockStorage::new());
        let client = Arc::new(MockHttpClient::new().with_login_statuses(vec![403]));

        let result = worker(Arc::clone(&storage), client, StubExtractor::blank())
            .run(WorkerRole::New)
            .await;

        assert!(result.is_err());
        assert!(storage.calls().is_empty());
    }
}
