use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::WorkerRole;

/// Result state of one supervised worker launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "run_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Timeout,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Timeout => "timeout",
        }
    }
}

/// The supervisor's record of one worker-process execution.
///
/// Exactly one row exists per launch: created when the process
/// starts, finalized on exit with the duration and the tail of the
/// live log.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RunOutcome {
    pub id: Uuid,
    pub slot: i32,
    #[sqlx(try_from = "String")]
    pub role: RoleColumn,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
    pub status: RunStatus,
    pub output_tail: Option<String>,
}

/// Newtype so `WorkerRole` round-trips through a plain text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleColumn(pub WorkerRole);

impl TryFrom<String> for RoleColumn {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse().map(RoleColumn)
    }
}

impl RunOutcome {
    pub fn begin(slot: i32, role: WorkerRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot,
            role: RoleColumn(role),
            started_at: Utc::now(),
            ended_at: None,
            duration_secs: None,
            status: RunStatus::Running,
            output_tail: None,
        }
    }
}
