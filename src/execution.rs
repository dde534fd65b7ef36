//! Execution records and the status model.

use chrono::{DateTime, Utc};

use crate::params::RunParameters;

/// Unique identifier for a job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionId(pub i64);

/// Status of a job or step execution.
///
/// `Running` is the only non-terminal state; it moves to exactly one of
/// `Completed` or `Failed` and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Running,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_unsuccessful(&self) -> bool {
        matches!(self, Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

/// Exit code plus a human-readable description.
///
/// The code tracks the status; the description starts empty and may be
/// widened by the executor (failure cause) and by after-hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: String,
    pub description: String,
}

impl ExitStatus {
    pub fn executing() -> Self {
        Self {
            code: "EXECUTING".to_string(),
            description: String::new(),
        }
    }

    pub fn completed() -> Self {
        Self {
            code: "COMPLETED".to_string(),
            description: String::new(),
        }
    }

    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            code: "FAILED".to_string(),
            description: description.into(),
        }
    }
}

/// Skip counters, by phase.
///
/// Only read-level skips can occur here: the processor is a total function
/// and a sink failure is fatal rather than skippable. The other two phases
/// stay at zero but remain part of the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkipCounts {
    pub read: u64,
    pub process: u64,
    pub write: u64,
}

impl SkipCounts {
    pub fn total(&self) -> u64 {
        self.read + self.process + self.write
    }
}

/// Mutable record of one step's progress.
///
/// Created when the step begins, updated only by the chunk executor and the
/// step's after-hooks, frozen at step end. Counts obey conservation:
/// `read_count == write_count + filter_count + skips.read`.
#[derive(Debug, Clone)]
pub struct StepExecution {
    pub job_execution_id: ExecutionId,
    pub step_name: String,
    pub status: BatchStatus,
    pub exit: ExitStatus,
    pub read_count: u64,
    pub write_count: u64,
    pub filter_count: u64,
    pub commit_count: u64,
    pub rollback_count: u64,
    pub skips: SkipCounts,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl StepExecution {
    pub fn new(job_execution_id: ExecutionId, step_name: impl Into<String>) -> Self {
        Self {
            job_execution_id,
            step_name: step_name.into(),
            status: BatchStatus::Running,
            exit: ExitStatus::executing(),
            read_count: 0,
            write_count: 0,
            filter_count: 0,
            commit_count: 0,
            rollback_count: 0,
            skips: SkipCounts::default(),
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub(crate) fn mark_completed(&mut self) {
        self.status = BatchStatus::Completed;
        self.exit = ExitStatus::completed();
        self.end_time = Some(Utc::now());
    }

    pub(crate) fn mark_failed(&mut self, description: impl Into<String>) {
        self.status = BatchStatus::Failed;
        self.exit = ExitStatus::failed(description);
        self.end_time = Some(Utc::now());
    }

    /// One-line count summary for log output.
    pub fn summary(&self) -> String {
        format!(
            "{}: status={} exit={} read={} write={} filter={} commit={} rollback={} skip={}",
            self.step_name,
            self.status.as_str(),
            self.exit.code,
            self.read_count,
            self.write_count,
            self.filter_count,
            self.commit_count,
            self.rollback_count,
            self.skips.total(),
        )
    }
}

/// Aggregate record of one job run.
///
/// The terminal status is derived from the step outcomes; callers never
/// assert it directly.
#[derive(Debug, Clone)]
pub struct JobExecution {
    pub id: ExecutionId,
    pub job_name: String,
    pub parameters: RunParameters,
    pub status: BatchStatus,
    pub exit: ExitStatus,
    pub step_executions: Vec<StepExecution>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl JobExecution {
    pub(crate) fn new(id: ExecutionId, job_name: impl Into<String>, parameters: RunParameters) -> Self {
        Self {
            id,
            job_name: job_name.into(),
            parameters,
            status: BatchStatus::Running,
            exit: ExitStatus::executing(),
            step_executions: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// The execution of a step by name, if the step ran.
    pub fn step_execution(&self, step_name: &str) -> Option<&StepExecution> {
        self.step_executions
            .iter()
            .find(|s| s.step_name == step_name)
    }

    /// Derive the job status from its steps and freeze the execution.
    ///
    /// Any failed step fails the job; otherwise all recorded steps completed
    /// and so did the job. Runs before after-job hooks, which may widen the
    /// exit description but not the status.
    pub(crate) fn settle(&mut self) {
        let failed = self
            .step_executions
            .iter()
            .find(|s| s.status.is_unsuccessful());

        match failed {
            Some(step) => {
                self.status = BatchStatus::Failed;
                self.exit = ExitStatus::failed(format!(
                    "step '{}' failed: {}",
                    step.step_name, step.exit.description
                ));
            }
            None => {
                self.status = BatchStatus::Completed;
                self.exit = ExitStatus::completed();
            }
        }
        self.end_time = Some(Utc::now());
    }
}
