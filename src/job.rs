//! Job definition and sequential step execution.

use std::sync::Arc;

use tracing::info;

use crate::execution::{BatchStatus, JobExecution};
use crate::listener::{JobListener, StepListener};
use crate::step::StepRunner;

/// A named, ordered sequence of steps with its listeners.
///
/// Jobs are immutable once built; submit them through
/// [`crate::launcher::JobLauncher`].
pub struct Job {
    name: String,
    steps: Vec<Arc<dyn StepRunner>>,
    job_listeners: Vec<Arc<dyn JobListener>>,
    step_listeners: Vec<Arc<dyn StepListener>>,
    increment_run_id: bool,
}

impl Job {
    /// Start building a job with the given name.
    pub fn builder(name: impl Into<String>) -> JobBuilder {
        JobBuilder {
            name: name.into(),
            steps: Vec::new(),
            job_listeners: Vec::new(),
            step_listeners: Vec::new(),
            increment_run_id: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub(crate) fn increments_run_id(&self) -> bool {
        self.increment_run_id
    }

    /// Run the job in place: before-job hooks, steps in order with fail-fast,
    /// derived status, after-job hooks.
    ///
    /// `prior` is the last terminal execution of the same run identity, used
    /// to reuse completed steps that allow it. Earlier steps' committed
    /// chunks are never compensated when a later step fails.
    pub(crate) async fn execute(&self, execution: &mut JobExecution, prior: Option<&JobExecution>) {
        for listener in &self.job_listeners {
            listener.before_job(execution).await;
        }

        for step in &self.steps {
            let reusable = prior
                .and_then(|p| p.step_execution(step.name()))
                .filter(|prev| {
                    prev.status == BatchStatus::Completed && step.allow_start_if_complete()
                });

            let step_execution = match reusable {
                Some(previous) => {
                    info!(
                        job = %self.name,
                        step = %step.name(),
                        "step already complete, reusing prior execution"
                    );
                    let mut reused = previous.clone();
                    reused.job_execution_id = execution.id;
                    reused
                }
                None => {
                    step.run(execution.id, &execution.parameters, &self.step_listeners)
                        .await
                }
            };

            let failed = step_execution.status.is_unsuccessful();
            execution.step_executions.push(step_execution);
            if failed {
                break;
            }
        }

        execution.settle();

        for listener in &self.job_listeners {
            if let Some(description) = listener.after_job(execution).await {
                execution.exit.description = description;
            }
        }
    }
}

/// Builder for [`Job`].
pub struct JobBuilder {
    name: String,
    steps: Vec<Arc<dyn StepRunner>>,
    job_listeners: Vec<Arc<dyn JobListener>>,
    step_listeners: Vec<Arc<dyn StepListener>>,
    increment_run_id: bool,
}

impl JobBuilder {
    /// Append a step. Steps run in registration order.
    pub fn step(mut self, step: impl StepRunner + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Register a job listener. Listeners are invoked in registration order.
    pub fn listener(mut self, listener: impl JobListener + 'static) -> Self {
        self.job_listeners.push(Arc::new(listener));
        self
    }

    /// Register a step listener applied to every step of this job.
    pub fn step_listener(mut self, listener: impl StepListener + 'static) -> Self {
        self.step_listeners.push(Arc::new(listener));
        self
    }

    /// Inject a fresh `run.id` parameter on every plain submission, so each
    /// submission forms a new run identity.
    pub fn incrementer(mut self) -> Self {
        self.increment_run_id = true;
        self
    }

    /// Build the job.
    ///
    /// # Panics
    ///
    /// Panics if no step was added.
    pub fn build(self) -> Job {
        assert!(!self.steps.is_empty(), "a job requires at least one step");
        Job {
            name: self.name,
            steps: self.steps,
            job_listeners: self.job_listeners,
            step_listeners: self.step_listeners,
            increment_run_id: self.increment_run_id,
        }
    }
}
