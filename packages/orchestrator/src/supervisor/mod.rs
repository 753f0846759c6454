//! Worker process supervision.
//!
//! For each launch the supervisor spawns the worker binary under a
//! fresh pty, relays its output into the slot's live log and queued
//! input back to it, enforces a hard wall-clock timeout, and records
//! exactly one run outcome per launch.

pub mod channels;
pub mod pty;

pub use channels::{ChannelRegistry, InputQueue, LiveLog, LogRead, WorkerChannels};

use anyhow::{Context, Result};
use chrono::Utc;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::models::{Credential, RunOutcome, RunStatus, WorkerRole};
use crate::storage::Storage;

const OUTPUT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Force-kill boundary for one worker run
    pub hard_timeout: Duration,
    /// Input-queue poll cadence
    pub poll_interval: Duration,
    /// How much of the live log the run outcome keeps
    pub tail_chars: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            hard_timeout: Duration::from_secs(3600),
            poll_interval: Duration::from_millis(50),
            tail_chars: 2000,
        }
    }
}

/// An in-flight supervised worker.
pub struct WorkerHandle {
    pub slot: i32,
    task: tokio::task::JoinHandle<Result<RunStatus>>,
}

/// Launches and babysits worker processes.
pub struct ProcessSupervisor<S> {
    storage: Arc<S>,
    registry: Arc<ChannelRegistry>,
    /// The worker binary and the environment every worker inherits
    program: PathBuf,
    worker_env: Vec<(String, String)>,
    config: SupervisorConfig,
}

impl<S: Storage + 'static> ProcessSupervisor<S> {
    pub fn new(storage: Arc<S>, program: PathBuf, worker_env: Vec<(String, String)>) -> Self {
        Self::with_config(storage, program, worker_env, SupervisorConfig::default())
    }

    pub fn with_config(
        storage: Arc<S>,
        program: PathBuf,
        worker_env: Vec<(String, String)>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            storage,
            registry: Arc::new(ChannelRegistry::new()),
            program,
            worker_env,
            config,
        }
    }

    /// The channel registry external readers use for live logs and
    /// input.
    pub fn registry(&self) -> Arc<ChannelRegistry> {
        Arc::clone(&self.registry)
    }

    /// Launch one worker bound to a credential.
    pub async fn launch(
        &self,
        role: WorkerRole,
        credential: &Credential,
        slot: i32,
    ) -> Result<WorkerHandle> {
        let mut command = Command::new(&self.program);
        command
            .arg(role.as_str())
            .arg(&credential.id)
            .arg(&credential.secret)
            .arg(slot.to_string());
        for (key, value) in &self.worker_env {
            command.env(key, value);
        }
        self.launch_command(role, slot, command).await
    }

    /// Launch an arbitrary command under supervision. Split out from
    /// [`launch`] so tests can supervise stand-in processes.
    pub async fn launch_command(
        &self,
        role: WorkerRole,
        slot: i32,
        command: Command,
    ) -> Result<WorkerHandle> {
        // Never more than one "currently running" signal per slot
        self.storage.delete_stale_running(slot).await?;
        let outcome = RunOutcome::begin(slot, role);
        self.storage.insert_run_outcome(&outcome).await?;

        let channels = self.registry.register(slot);
        let spawned = pty::spawn(command)?;
        info!(slot, role = %role, pid = spawned.child.id(), "worker launched");

        let stop_input = Arc::new(AtomicBool::new(false));
        let output_relay =
            self.spawn_output_relay(Arc::clone(&channels.live_log), spawned.output);
        self.spawn_input_relay(
            Arc::clone(&channels.input),
            spawned.input,
            Arc::clone(&stop_input),
        );

        let storage = Arc::clone(&self.storage);
        let registry = Arc::clone(&self.registry);
        let config = self.config.clone();
        let live_log = Arc::clone(&channels.live_log);
        let outcome_id = outcome.id;
        let started_at = outcome.started_at;
        let mut child = spawned.child;
        let pid = child.id();

        let task = tokio::spawn(async move {
            let mut wait = tokio::task::spawn_blocking(move || child.wait());
            let status = match tokio::time::timeout(config.hard_timeout, &mut wait).await {
                Ok(join) => {
                    let exit = join.context("worker wait task panicked")??;
                    if exit.success() {
                        RunStatus::Success
                    } else {
                        warn!(slot, code = ?exit.code(), "worker exited with failure");
                        RunStatus::Failed
                    }
                }
                Err(_) => {
                    warn!(slot, "worker exceeded hard timeout, killing process group");
                    pty::kill_group(pid);
                    // Reap the killed child before moving on
                    let _ = (&mut wait).await;
                    RunStatus::Timeout
                }
            };

            stop_input.store(true, Ordering::Relaxed);
            // Let the relay drain the pty before snapshotting the tail;
            // it exits as soon as the closed pty reads as an error.
            let _ = tokio::task::spawn_blocking(move || output_relay.join()).await;
            let tail = live_log.tail_chars(config.tail_chars);
            registry.close(slot);

            let ended_at = Utc::now();
            let duration_secs =
                (ended_at - started_at).num_milliseconds() as f64 / 1000.0;
            storage
                .finalize_run_outcome(outcome_id, status, ended_at, duration_secs, &tail)
                .await?;
            info!(slot, status = status.as_str(), duration_secs, "worker finished");
            Ok(status)
        });

        Ok(WorkerHandle { slot, task })
    }

    /// Fixed-chunk reads from the controlling end into the live log,
    /// flushed per chunk so offset readers see output promptly. The
    /// thread ends when the pty closes (child exit reads as an error
    /// on Linux, not EOF).
    fn spawn_output_relay(
        &self,
        log: Arc<LiveLog>,
        mut output: std::fs::File,
    ) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            let mut buf = [0u8; OUTPUT_CHUNK_SIZE];
            loop {
                match output.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => log.append_chunk(&pty::strip_control_sequences(&buf[..n])),
                }
            }
        })
    }

    /// Polls the input queue and forwards new bytes verbatim.
    fn spawn_input_relay(
        &self,
        queue: Arc<InputQueue>,
        mut input: std::fs::File,
        stop: Arc<AtomicBool>,
    ) {
        let poll_interval = self.config.poll_interval;
        std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                let bytes = queue.take_new();
                if !bytes.is_empty() {
                    if input.write_all(&bytes).is_err() {
                        break;
                    }
                    let _ = input.flush();
                }
                std::thread::sleep(poll_interval);
            }
        });
    }
}

/// Wait for every launched worker, collecting per-slot results.
pub async fn await_all(handles: Vec<WorkerHandle>) -> Vec<(i32, Result<RunStatus>)> {
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let result = match handle.task.await {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("supervisor task for slot {} panicked: {e}", handle.slot)),
        };
        results.push((handle.slot, result));
    }
    results
}
