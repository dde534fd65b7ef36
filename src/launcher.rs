//! Asynchronous job submission.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::execution::{ExecutionId, JobExecution};
use crate::job::Job;
use crate::params::{RunIdentity, RunParameters};
use crate::registry::{LaunchError, RunRegistry};

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

/// Submits jobs for asynchronous execution on a bounded worker pool.
///
/// Submission returns immediately with a [`JobHandle`]; only the two
/// duplicate-identity rejections are raised synchronously. Submissions
/// beyond the pool's capacity queue on the pool rather than blocking the
/// caller. Within a job, steps run strictly sequentially.
pub struct JobLauncher {
    registry: Arc<RunRegistry>,
    permits: Arc<Semaphore>,
}

impl JobLauncher {
    /// Launcher with the default pool size: half the available processing
    /// units, at least one.
    pub fn new() -> Self {
        Self::with_pool_size(default_pool_size())
    }

    /// Launcher with an explicit worker pool size.
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` is 0.
    pub fn with_pool_size(pool_size: usize) -> Self {
        assert!(pool_size > 0, "worker pool requires at least one worker");
        Self {
            registry: Arc::new(RunRegistry::new()),
            permits: Arc::new(Semaphore::new(pool_size)),
        }
    }

    /// The identity registry backing this launcher.
    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    /// Submit a job for execution.
    ///
    /// For jobs built with an incrementer a fresh `run.id` is injected
    /// first, so every plain submission forms a new identity.
    pub fn submit(
        &self,
        job: Arc<Job>,
        parameters: RunParameters,
    ) -> Result<JobHandle, LaunchError> {
        self.launch(job, parameters, false)
    }

    /// Re-execute an identity that previously completed.
    ///
    /// Parameters must equal the original submission's exactly (including
    /// any injected `run.id` — take them from the prior execution). Within
    /// the restarted run, steps allowing start-if-complete reuse their prior
    /// execution instead of re-running.
    pub fn restart(
        &self,
        job: Arc<Job>,
        parameters: RunParameters,
    ) -> Result<JobHandle, LaunchError> {
        self.launch(job, parameters, true)
    }

    fn launch(
        &self,
        job: Arc<Job>,
        parameters: RunParameters,
        restart: bool,
    ) -> Result<JobHandle, LaunchError> {
        let parameters = if job.increments_run_id() && !restart {
            parameters.with_run_id(self.registry.next_run_id(job.name()))
        } else {
            parameters
        };

        let identity = RunIdentity::new(job.name(), parameters.clone());
        let (execution_id, prior) = self.registry.try_register(&identity, restart)?;

        debug!(job = %job.name(), id = execution_id.0, restart, "job accepted");

        let mut execution = JobExecution::new(execution_id, job.name(), parameters);
        let registry = self.registry.clone();
        let permits = self.permits.clone();
        let job_name = job.name().to_string();

        let task = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .expect("worker pool semaphore closed");

            job.execute(&mut execution, prior.as_ref()).await;
            registry.settle(&identity, execution.clone());
            execution
        });

        Ok(JobHandle {
            job_name,
            execution_id,
            task,
        })
    }
}

impl Default for JobLauncher {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to an accepted job execution.
#[derive(Debug)]
pub struct JobHandle {
    job_name: String,
    execution_id: ExecutionId,
    task: JoinHandle<JobExecution>,
}

impl JobHandle {
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Wait for the execution to reach a terminal state.
    ///
    /// Job and step failures are reported through the execution's status,
    /// never as an error here; only a panicked or aborted executor task
    /// errors.
    pub async fn wait(self) -> anyhow::Result<JobExecution> {
        self.task
            .await
            .map_err(|err| anyhow::anyhow!("job '{}' executor task failed: {err}", self.job_name))
    }
}
