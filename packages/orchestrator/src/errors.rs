//! Error taxonomy for the orchestration layer.
//!
//! Propagation policy: per-item errors never escape the item loop,
//! per-batch errors never abort the worker process, per-worker
//! crashes never abort the outer controller. Only
//! `NoActiveCredentials` is allowed to terminate the whole system.

use thiserror::Error;

/// Fatal conditions at cycle start.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No credential in the pool is marked active, so nothing can run.
    #[error("no active credentials in the pool")]
    NoActiveCredentials,
}

/// Fatal conditions for one worker run.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Login retries exhausted. Fatal to this run, not to the cycle.
    #[error("authentication failed after {attempts} attempts for {credential_id}")]
    AuthExhausted {
        credential_id: String,
        attempts: u32,
    },
}
