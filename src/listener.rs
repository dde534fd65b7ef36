//! Job and step execution hooks.
//!
//! Listeners observe executions at well-defined points. They may log, emit
//! metrics, or widen the exit description; they can never change counts or
//! reverse a settled status — the lifecycle's status computation runs first
//! and is authoritative.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::execution::{JobExecution, StepExecution};

/// Hooks around a whole job run.
#[async_trait]
pub trait JobListener: Send + Sync {
    async fn before_job(&self, _execution: &JobExecution) {}

    /// Called after the job status has been settled.
    ///
    /// Returning `Some` replaces the job's exit description.
    async fn after_job(&self, _execution: &JobExecution) -> Option<String> {
        None
    }
}

/// Hooks around a single step run.
#[async_trait]
pub trait StepListener: Send + Sync {
    async fn before_step(&self, _execution: &StepExecution) {}

    /// Called after the step execution is terminal.
    ///
    /// Returning `Some` replaces the step's exit description.
    async fn after_step(&self, _execution: &StepExecution) -> Option<String> {
        None
    }
}

/// Logs job boundaries and normalizes the exit description.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogJobListener;

#[async_trait]
impl JobListener for LogJobListener {
    async fn before_job(&self, execution: &JobExecution) {
        info!(job = %execution.job_name, params = %execution.parameters, "job started");
    }

    async fn after_job(&self, execution: &JobExecution) -> Option<String> {
        if execution.status.is_running() {
            error!(job = %execution.job_name, "job reported before settling");
            Some("Job is still running".to_string())
        } else if execution.status.is_unsuccessful() {
            error!(job = %execution.job_name, exit = %execution.exit.description, "job failed");
            Some(format!("Job failed {}", execution.exit.description))
        } else {
            info!(job = %execution.job_name, "job completed");
            Some("Job completed successfully".to_string())
        }
    }
}

/// Logs step boundaries and the full count summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStepListener;

#[async_trait]
impl StepListener for LogStepListener {
    async fn before_step(&self, execution: &StepExecution) {
        info!(step = %execution.step_name, "step started");
    }

    async fn after_step(&self, execution: &StepExecution) -> Option<String> {
        info!(
            step = %execution.step_name,
            read = execution.read_count,
            write = execution.write_count,
            filter = execution.filter_count,
            commit = execution.commit_count,
            rollback = execution.rollback_count,
            skip = execution.skips.total(),
            "step finished"
        );
        info!("{}", execution.summary());

        if execution.status.is_unsuccessful() {
            warn!(step = %execution.step_name, exit = %execution.exit.description, "step failed");
            Some(format!("Step failed: {}", execution.exit.description))
        } else {
            Some("Step completed successfully".to_string())
        }
    }
}
