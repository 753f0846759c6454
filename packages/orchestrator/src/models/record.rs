use chrono::{DateTime, Utc};
use extraction::{FinancialFields, NewsFields, ScrapeDocument, SummaryFields, TechFields};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

pub type OrgRecordId = Uuid;

/// The persisted, continuously refreshed result document for one
/// target. Field groups live in JSONB columns, one per sub-resource.
///
/// Records are never deleted. A corrupted record keeps its row (flag
/// plus a side copy in the quarantine table) so later refresh tiers
/// can still find and re-attempt it, while the duplicate-ingestion
/// existence check skips it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrgRecord {
    pub id: OrgRecordId,
    pub url: String,
    pub name: String,
    pub summary: Option<Json<SummaryFields>>,
    pub financial: Option<Json<FinancialFields>>,
    pub news: Option<Json<NewsFields>>,
    pub tech: Option<Json<TechFields>>,
    pub corrupted: bool,
    pub is_updated: bool,
    pub update_queued_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OrgRecord {
    /// Assemble a fresh record from a merged scrape document.
    pub fn from_document(url: String, name: String, doc: &ScrapeDocument) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            url,
            name,
            summary: doc.summary.clone().map(Json),
            financial: doc.financial.clone().map(Json),
            news: doc.news.clone().map(Json),
            tech: doc.tech.clone().map(Json),
            corrupted: false,
            is_updated: true,
            update_queued_at: None,
            updated_at: Some(now),
            last_processed_at: Some(now),
            created_at: now,
        }
    }
}
