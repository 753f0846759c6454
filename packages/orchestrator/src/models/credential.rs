use serde::{Deserialize, Serialize};

use super::WorkerRole;

/// One rate-limited portal account.
///
/// Credentials come from the config file and live for the whole run;
/// the distributor marks which role a credential is bound to, nothing
/// ever deletes one mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Login identifier (the portal uses email addresses)
    pub id: String,
    pub secret: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(skip)]
    pub role_in_use: Option<WorkerRole>,
}

fn default_active() -> bool {
    true
}

impl Credential {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            active: true,
            role_in_use: None,
        }
    }
}
