//! Run identity registry.
//!
//! The registry is the engine's single piece of shared mutable state. It
//! tracks which identities are currently running and the last terminal
//! execution of each identity, and makes the duplicate-identity
//! check-and-insert atomic.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use crate::execution::{BatchStatus, ExecutionId, JobExecution};
use crate::params::RunIdentity;

/// Rejection raised synchronously at submission, before any step starts.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// An execution with this identity is currently running.
    #[error("job '{job}' is already running with these parameters")]
    AlreadyRunning { job: String },

    /// An execution with this identity already completed and restart was not
    /// requested.
    #[error("job '{job}' already completed with these parameters and restart was not requested")]
    AlreadyComplete { job: String },
}

#[derive(Default)]
struct State {
    next_execution_id: i64,
    running: HashMap<RunIdentity, ExecutionId>,
    finished: HashMap<RunIdentity, JobExecution>,
    run_ids: HashMap<String, i64>,
}

/// In-memory registry of run identities and their executions.
#[derive(Default)]
pub struct RunRegistry {
    state: Mutex<State>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("run registry lock poisoned")
    }

    /// Next `run.id` value for the given job name.
    pub(crate) fn next_run_id(&self, job_name: &str) -> i64 {
        let mut state = self.lock();
        let id = state.run_ids.entry(job_name.to_string()).or_insert(0);
        *id += 1;
        *id
    }

    /// Atomically claim an identity for execution.
    ///
    /// Rejects identities that are currently running, and identities that
    /// previously completed unless `restart` is set. A previously failed
    /// identity may always be claimed again. On success returns the new
    /// execution id plus the prior terminal execution, if any, for
    /// step-level reuse.
    pub(crate) fn try_register(
        &self,
        identity: &RunIdentity,
        restart: bool,
    ) -> Result<(ExecutionId, Option<JobExecution>), LaunchError> {
        let mut state = self.lock();

        if state.running.contains_key(identity) {
            return Err(LaunchError::AlreadyRunning {
                job: identity.job_name().to_string(),
            });
        }

        if let Some(previous) = state.finished.get(identity) {
            if previous.status == BatchStatus::Completed && !restart {
                return Err(LaunchError::AlreadyComplete {
                    job: identity.job_name().to_string(),
                });
            }
        }

        state.next_execution_id += 1;
        let id = ExecutionId(state.next_execution_id);
        state.running.insert(identity.clone(), id);
        let prior = state.finished.get(identity).cloned();
        Ok((id, prior))
    }

    /// Record an execution's terminal state and release its identity.
    pub(crate) fn settle(&self, identity: &RunIdentity, execution: JobExecution) {
        let mut state = self.lock();
        state.running.remove(identity);
        state.finished.insert(identity.clone(), execution);
    }

    /// The last terminal execution of an identity, if any.
    pub fn last_execution(&self, identity: &RunIdentity) -> Option<JobExecution> {
        self.lock().finished.get(identity).cloned()
    }

    /// Whether an execution with this identity is currently running.
    pub fn is_running(&self, identity: &RunIdentity) -> bool {
        self.lock().running.contains_key(identity)
    }

    /// Number of executions currently running.
    pub fn running_count(&self) -> usize {
        self.lock().running.len()
    }
}
