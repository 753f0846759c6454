//! The outer run cycle: distribute credentials, supervise a fleet of
//! workers to completion, pause, repeat.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::RunMode;
use crate::distributor::AccountPool;
use crate::errors::OrchestratorError;
use crate::models::WorkerRole;
use crate::storage::Storage;
use crate::supervisor::{await_all, ProcessSupervisor};
use crate::worker::retry::jittered_sleep;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Safety cap on cycles. Large enough that a healthy system never
    /// reaches it; the real stop is the fatal-error path.
    pub max_cycles: usize,
    /// Pause between parallel-fleet cycles
    pub inter_cycle_pause: Duration,
    /// Pause between alternating single-worker cycles
    pub alternating_pause: Duration,
    /// Randomized backoff before restarting after a failed cycle
    pub error_backoff_min: Duration,
    pub error_backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_cycles: 100_000,
            inter_cycle_pause: Duration::from_secs(10),
            alternating_pause: Duration::from_secs(5),
            error_backoff_min: Duration::from_secs(30),
            error_backoff_max: Duration::from_secs(60),
        }
    }
}

/// Drives cycles until the safety cap.
///
/// Credential activity is re-read every cycle, so activating or
/// deactivating an account takes effect without a restart. A failed
/// cycle logs and backs off; only an empty credential pool stops the
/// whole run.
pub struct RunCycleController<S> {
    supervisor: ProcessSupervisor<S>,
    pool: AccountPool,
    mode: RunMode,
    manual_update: Option<usize>,
    manual_new: Option<usize>,
    config: ControllerConfig,
    /// Role the next alternating cycle runs
    next_role: WorkerRole,
}

impl<S: Storage + 'static> RunCycleController<S> {
    pub fn new(
        supervisor: ProcessSupervisor<S>,
        pool: AccountPool,
        mode: RunMode,
        manual_update: Option<usize>,
        manual_new: Option<usize>,
    ) -> Self {
        Self::with_config(
            supervisor,
            pool,
            mode,
            manual_update,
            manual_new,
            ControllerConfig::default(),
        )
    }

    pub fn with_config(
        supervisor: ProcessSupervisor<S>,
        pool: AccountPool,
        mode: RunMode,
        manual_update: Option<usize>,
        manual_new: Option<usize>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            supervisor,
            pool,
            mode,
            manual_update,
            manual_new,
            config,
            next_role: WorkerRole::Update,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        for cycle in 1..=self.config.max_cycles {
            match self.run_cycle(cycle).await {
                Ok(alternating) => {
                    let pause = if alternating {
                        self.config.alternating_pause
                    } else {
                        self.config.inter_cycle_pause
                    };
                    tokio::time::sleep(pause).await;
                }
                Err(e) => {
                    if is_fatal(&e) {
                        error!(cycle, error = %e, "cannot continue");
                        return Err(e);
                    }
                    error!(cycle, error = %e, "cycle failed, backing off");
                    jittered_sleep(self.config.error_backoff_min, self.config.error_backoff_max)
                        .await;
                }
            }
        }
        info!(cycles = self.config.max_cycles, "cycle cap reached, stopping");
        Ok(())
    }

    /// One cycle. Returns whether it ran in alternating mode.
    async fn run_cycle(&mut self, cycle: usize) -> Result<bool> {
        let distribution = self
            .pool
            .plan(self.mode, self.manual_update, self.manual_new)?;
        info!(cycle, update = distribution.update, new = distribution.new, "starting cycle");

        if distribution.alternating {
            self.run_alternating_cycle().await?;
            return Ok(true);
        }

        let (update, new) = self.pool.assign(&distribution);
        let mut handles = Vec::with_capacity(update.len() + new.len());
        let mut slot = 0;
        for credential in &update {
            slot += 1;
            handles.push(
                self.supervisor
                    .launch(WorkerRole::Update, credential, slot)
                    .await?,
            );
        }
        for credential in &new {
            slot += 1;
            handles.push(
                self.supervisor
                    .launch(WorkerRole::New, credential, slot)
                    .await?,
            );
        }

        for (slot, result) in await_all(handles).await {
            if let Err(e) = result {
                warn!(slot, error = %e, "worker supervision failed");
            }
        }
        Ok(false)
    }

    /// One alternating-mode launch: the lone credential runs one role
    /// this cycle, the other role next cycle.
    async fn run_alternating_cycle(&mut self) -> Result<()> {
        let credential = self
            .pool
            .first_active()
            .cloned()
            .ok_or(OrchestratorError::NoActiveCredentials)?;
        let role = self.next_role;
        self.next_role = match role {
            WorkerRole::Update => WorkerRole::New,
            WorkerRole::New => WorkerRole::Update,
        };

        let handle = self.supervisor.launch(role, &credential, 1).await?;
        for (slot, result) in await_all(vec![handle]).await {
            if let Err(e) = result {
                warn!(slot, error = %e, "worker supervision failed");
            }
        }
        Ok(())
    }
}

fn is_fatal(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<OrchestratorError>(),
        Some(OrchestratorError::NoActiveCredentials)
    )
}
