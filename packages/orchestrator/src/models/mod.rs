pub mod credential;
pub mod record;
pub mod run_outcome;
pub mod work_item;

pub use credential::Credential;
pub use record::{OrgRecord, OrgRecordId};
pub use run_outcome::{RunOutcome, RunStatus};
pub use work_item::{WorkItem, WorkItemId, WorkItemStatus};

use serde::{Deserialize, Serialize};

/// Which scraper a worker slot runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum WorkerRole {
    /// Refresh existing records (the update scraper)
    Update,
    /// Ingest not-yet-scraped targets (the new scraper)
    New,
}

impl WorkerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerRole::Update => "update",
            WorkerRole::New => "new",
        }
    }
}

impl std::fmt::Display for WorkerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkerRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "update" => Ok(WorkerRole::Update),
            "new" => Ok(WorkerRole::New),
            other => Err(anyhow::anyhow!("unknown worker role: {other}")),
        }
    }
}
