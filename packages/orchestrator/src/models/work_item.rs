use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type WorkItemId = Uuid;

/// Lifecycle of a raw queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "work_item_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WorkItemStatus {
    Pending,
    Claimed,
    Completed,
    Failed,
}

impl WorkItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkItemStatus::Pending => "pending",
            WorkItemStatus::Claimed => "claimed",
            WorkItemStatus::Completed => "completed",
            WorkItemStatus::Failed => "failed",
        }
    }
}

/// One not-yet-fully-processed target in the shared queue.
///
/// Created by ingestion, mutated only by the selector (claim) and the
/// worker (complete/fail). `claimed_at` is the claim lease: a claim
/// older than the configured lease is considered abandoned and may be
/// taken over by another worker.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub url: String,
    pub status: WorkItemStatus,
    pub is_read: bool,
    /// Externally flagged "update this one first"
    pub update_first: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// Best-effort display name derived from the target url
    /// (`…/organization/acme-robotics` → `Acme Robotics`).
    pub fn display_name(&self) -> String {
        self.url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(|slug| {
                slug.split('-')
                    .map(|w| {
                        let mut chars = w.chars();
                        match chars.next() {
                            Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                            None => String::new(),
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_else(|| "Unknown".to_string())
    }
}
