//! Credential pool and worker-role distribution.
//!
//! The pool owns the credentials for the whole run; the only mutation
//! it ever performs is marking which role a credential is bound to.

use tracing::{info, warn};

use crate::config::RunMode;
use crate::errors::OrchestratorError;
use crate::models::{Credential, WorkerRole};

/// How many workers of each role to run this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Distribution {
    pub update: usize,
    pub new: usize,
    /// One credential total: run a single worker and flip its role
    /// every cycle instead of splitting the pool.
    pub alternating: bool,
}

/// Compute the role split for `active_count` credentials.
///
/// Manual counts win over the automatic tiers and are clamped to the
/// pool size rather than rejected. Automatic tiers: a lone credential
/// alternates roles, small pools split with a bias toward updating,
/// and from four credentials up the whole pool updates (new targets
/// arrive far slower than existing records go stale).
pub fn distribute(
    active_count: usize,
    manual_update: Option<usize>,
    manual_new: Option<usize>,
) -> Result<Distribution, OrchestratorError> {
    if active_count == 0 {
        return Err(OrchestratorError::NoActiveCredentials);
    }

    if manual_update.is_some() || manual_new.is_some() {
        let requested_update =
            manual_update.unwrap_or_else(|| active_count.saturating_sub(manual_new.unwrap_or(0)));
        let requested_new =
            manual_new.unwrap_or_else(|| active_count.saturating_sub(requested_update));

        if requested_update + requested_new > active_count {
            warn!(
                requested = requested_update + requested_new,
                available = active_count,
                "requested worker counts exceed the credential pool, clamping"
            );
        }
        let update = requested_update.min(active_count);
        let new = requested_new.min(active_count - update);
        return Ok(Distribution {
            update,
            new,
            alternating: false,
        });
    }

    let distribution = match active_count {
        1 => Distribution {
            update: 1,
            new: 0,
            alternating: true,
        },
        2 => Distribution {
            update: 1,
            new: 1,
            alternating: false,
        },
        3 => Distribution {
            update: 2,
            new: 1,
            alternating: false,
        },
        n => Distribution {
            update: n,
            new: 0,
            alternating: false,
        },
    };
    Ok(distribution)
}

/// The run's credential pool.
pub struct AccountPool {
    credentials: Vec<Credential>,
}

impl AccountPool {
    pub fn new(credentials: Vec<Credential>) -> Self {
        Self { credentials }
    }

    pub fn active_count(&self) -> usize {
        self.credentials.iter().filter(|c| c.active).count()
    }

    /// Plan this cycle's distribution, folding the run mode in: a
    /// role-restricted mode zeroes the other role and keeps a
    /// supplied count for its own, defaulting to the whole pool.
    pub fn plan(
        &self,
        mode: RunMode,
        manual_update: Option<usize>,
        manual_new: Option<usize>,
    ) -> Result<Distribution, OrchestratorError> {
        let active = self.active_count();
        let (manual_update, manual_new) = match mode {
            RunMode::All => (manual_update, manual_new),
            RunMode::UpdateOnly => (Some(manual_update.unwrap_or(active)), Some(0)),
            RunMode::NewOnly => (Some(0), Some(manual_new.unwrap_or(active))),
        };
        let distribution = distribute(active, manual_update, manual_new)?;
        info!(
            active,
            update = distribution.update,
            new = distribution.new,
            alternating = distribution.alternating,
            "distributed credential pool"
        );
        Ok(distribution)
    }

    /// Bind active credentials to roles per the distribution, update
    /// workers first. Returns the two role groups in slot order.
    pub fn assign(&mut self, distribution: &Distribution) -> (Vec<Credential>, Vec<Credential>) {
        let mut update = Vec::with_capacity(distribution.update);
        let mut new = Vec::with_capacity(distribution.new);
        for credential in self.credentials.iter_mut().filter(|c| c.active) {
            if update.len() < distribution.update {
                credential.role_in_use = Some(WorkerRole::Update);
                update.push(credential.clone());
            } else if new.len() < distribution.new {
                credential.role_in_use = Some(WorkerRole::New);
                new.push(credential.clone());
            } else {
                credential.role_in_use = None;
            }
        }
        (update, new)
    }

    /// The single credential used in alternating mode.
    pub fn first_active(&self) -> Option<&Credential> {
        self.credentials.iter().find(|c| c.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(update: usize, new: usize, alternating: bool) -> Distribution {
        Distribution {
            update,
            new,
            alternating,
        }
    }

    #[test]
    fn automatic_tiers() {
        assert_eq!(distribute(1, None, None).unwrap(), dist(1, 0, true));
        assert_eq!(distribute(2, None, None).unwrap(), dist(1, 1, false));
        assert_eq!(distribute(3, None, None).unwrap(), dist(2, 1, false));
        assert_eq!(distribute(5, None, None).unwrap(), dist(5, 0, false));
    }

    #[test]
    fn manual_counts_override_tiers() {
        assert_eq!(distribute(4, Some(1), Some(3)).unwrap(), dist(1, 3, false));
        // Unspecified side takes the remainder
        assert_eq!(distribute(4, Some(1), None).unwrap(), dist(1, 3, false));
        assert_eq!(distribute(4, None, Some(1)).unwrap(), dist(3, 1, false));
    }

    #[test]
    fn excessive_manual_request_is_clamped() {
        assert_eq!(distribute(3, Some(5), None).unwrap(), dist(3, 0, false));
        assert_eq!(distribute(3, Some(2), Some(4)).unwrap(), dist(2, 1, false));
    }

    #[test]
    fn empty_pool_is_fatal() {
        assert!(matches!(
            distribute(0, None, None),
            Err(OrchestratorError::NoActiveCredentials)
        ));
    }

    #[test]
    fn mode_restricts_roles() {
        let pool = AccountPool::new(vec![
            Credential::new("a@example.com", "pw"),
            Credential::new("b@example.com", "pw"),
            Credential::new("c@example.com", "pw"),
        ]);
        assert_eq!(
            pool.plan(RunMode::NewOnly, None, None).unwrap(),
            dist(0, 3, false)
        );
        assert_eq!(
            pool.plan(RunMode::UpdateOnly, None, None).unwrap(),
            dist(3, 0, false)
        );
    }

    #[test]
    fn mode_keeps_a_supplied_count_for_its_role() {
        let pool = AccountPool::new(vec![
            Credential::new("a@example.com", "pw"),
            Credential::new("b@example.com", "pw"),
            Credential::new("c@example.com", "pw"),
        ]);
        assert_eq!(
            pool.plan(RunMode::UpdateOnly, Some(1), None).unwrap(),
            dist(1, 0, false)
        );
        assert_eq!(
            pool.plan(RunMode::NewOnly, None, Some(2)).unwrap(),
            dist(0, 2, false)
        );
        // Still clamped to the pool
        assert_eq!(
            pool.plan(RunMode::UpdateOnly, Some(9), None).unwrap(),
            dist(3, 0, false)
        );
    }

    #[test]
    fn inactive_credentials_are_skipped_on_assignment() {
        let mut inactive = Credential::new("off@example.com", "pw");
        inactive.active = false;
        let mut pool = AccountPool::new(vec![
            inactive,
            Credential::new("a@example.com", "pw"),
            Credential::new("b@example.com", "pw"),
        ]);

        let distribution = pool.plan(RunMode::All, None, None).unwrap();
        let (update, new) = pool.assign(&distribution);
        assert_eq!(update.len(), 1);
        assert_eq!(new.len(), 1);
        assert_eq!(update[0].id, "a@example.com");
        assert_eq!(update[0].role_in_use, Some(WorkerRole::Update));
    }
}
