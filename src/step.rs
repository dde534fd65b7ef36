//! Step definitions and type-erased step execution.
//!
//! A [`ChunkStep`] binds a (source, processor, sink) triple to a chunk
//! executor. The triple is rebuilt per run from the run parameters through
//! factory closures: this replaces run-scoped dependency injection with
//! explicit parameter passing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;

use crate::chunk::ChunkExecutor;
use crate::execution::{ExecutionId, StepExecution};
use crate::item::{Processor, Sink, Source};
use crate::listener::StepListener;
use crate::params::RunParameters;

/// Boxed future returned by source factories.
pub type SourceFuture<R> = Pin<Box<dyn Future<Output = anyhow::Result<R>> + Send>>;

type SourceFactory<R> = Arc<dyn Fn(RunParameters) -> SourceFuture<R> + Send + Sync>;
type ProcessorFactory<P> = Arc<dyn Fn(&RunParameters) -> anyhow::Result<P> + Send + Sync>;
type SinkFactory<W> = Arc<dyn Fn(&RunParameters) -> anyhow::Result<W> + Send + Sync>;

/// A runnable step, erased over its item types so a job can hold a
/// heterogeneous sequence of steps.
#[async_trait]
pub trait StepRunner: Send + Sync {
    fn name(&self) -> &str;

    /// Whether a prior completed execution of this step may be reused on a
    /// restart of the same run identity.
    fn allow_start_if_complete(&self) -> bool;

    /// Execute the step against the given run parameters.
    ///
    /// Never errors: failures land on the returned execution as a `Failed`
    /// status with a describing exit.
    async fn run(
        &self,
        job_execution_id: ExecutionId,
        parameters: &RunParameters,
        listeners: &[Arc<dyn StepListener>],
    ) -> StepExecution;
}

/// A chunk-oriented step over a concrete (source, processor, sink) triple.
pub struct ChunkStep<R, P, W> {
    name: String,
    executor: ChunkExecutor,
    allow_start_if_complete: bool,
    source_factory: SourceFactory<R>,
    processor_factory: ProcessorFactory<P>,
    sink_factory: SinkFactory<W>,
}

impl<R, P, W> ChunkStep<R, P, W>
where
    R: Source + 'static,
    P: Processor<Input = R::Item> + 'static,
    W: Sink<Item = P::Output> + 'static,
{
    async fn materialize(&self, parameters: &RunParameters) -> anyhow::Result<(R, P, W)> {
        let source = (self.source_factory)(parameters.clone())
            .await
            .context("building source")?;
        let processor = (self.processor_factory)(parameters).context("building processor")?;
        let sink = (self.sink_factory)(parameters).context("building sink")?;
        Ok((source, processor, sink))
    }
}

#[async_trait]
impl<R, P, W> StepRunner for ChunkStep<R, P, W>
where
    R: Source + 'static,
    P: Processor<Input = R::Item> + 'static,
    W: Sink<Item = P::Output> + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn allow_start_if_complete(&self) -> bool {
        self.allow_start_if_complete
    }

    async fn run(
        &self,
        job_execution_id: ExecutionId,
        parameters: &RunParameters,
        listeners: &[Arc<dyn StepListener>],
    ) -> StepExecution {
        let mut step = StepExecution::new(job_execution_id, self.name.as_str());

        for listener in listeners {
            listener.before_step(&step).await;
        }

        match self.materialize(parameters).await {
            Ok((mut source, processor, mut sink)) => {
                self.executor
                    .execute(&mut source, &processor, &mut sink, &mut step)
                    .await;
            }
            Err(err) => step.mark_failed(format!("step setup failed: {:#}", err)),
        }

        for listener in listeners {
            if let Some(description) = listener.after_step(&step).await {
                step.exit.description = description;
            }
        }

        step
    }
}

/// Builder for [`ChunkStep`].
pub struct StepBuilder<R, P, W> {
    name: String,
    chunk_size: usize,
    skip_limit: u64,
    allow_start_if_complete: bool,
    source_factory: Option<SourceFactory<R>>,
    processor_factory: Option<ProcessorFactory<P>>,
    sink_factory: Option<SinkFactory<W>>,
}

impl<R, P, W> StepBuilder<R, P, W>
where
    R: Source + 'static,
    P: Processor<Input = R::Item> + 'static,
    W: Sink<Item = P::Output> + 'static,
{
    /// Start building a step. Chunk size defaults to 100.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chunk_size: 100,
            skip_limit: 0,
            allow_start_if_complete: false,
            source_factory: None,
            processor_factory: None,
            sink_factory: None,
        }
    }

    /// Set the number of kept records committed per transaction.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is 0.
    pub fn chunk(mut self, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be at least 1");
        self.chunk_size = chunk_size;
        self
    }

    /// Tolerate up to `limit` unreadable records before failing the step.
    pub fn skip_limit(mut self, limit: u64) -> Self {
        self.skip_limit = limit;
        self
    }

    /// Allow a prior completed execution of this step to be reused when the
    /// job is restarted under the same identity.
    pub fn allow_start_if_complete(mut self, allow: bool) -> Self {
        self.allow_start_if_complete = allow;
        self
    }

    /// Source factory, invoked once per run with the run parameters.
    pub fn source<F, Fut>(mut self, factory: F) -> Self
    where
        F: Fn(RunParameters) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        self.source_factory = Some(Arc::new(move |params: RunParameters| -> SourceFuture<R> {
            Box::pin(factory(params))
        }));
        self
    }

    /// Processor factory. Use [`crate::item::PassThrough`] for steps that
    /// write every record they read.
    pub fn processor<F>(mut self, factory: F) -> Self
    where
        F: Fn(&RunParameters) -> anyhow::Result<P> + Send + Sync + 'static,
    {
        self.processor_factory = Some(Arc::new(factory));
        self
    }

    /// Sink factory.
    pub fn sink<F>(mut self, factory: F) -> Self
    where
        F: Fn(&RunParameters) -> anyhow::Result<W> + Send + Sync + 'static,
    {
        self.sink_factory = Some(Arc::new(factory));
        self
    }

    /// Build the step.
    ///
    /// # Panics
    ///
    /// Panics if the source, processor or sink factory is missing.
    pub fn build(self) -> ChunkStep<R, P, W> {
        ChunkStep {
            name: self.name,
            executor: ChunkExecutor::new(self.chunk_size).with_skip_limit(self.skip_limit),
            allow_start_if_complete: self.allow_start_if_complete,
            source_factory: self.source_factory.expect("step requires a source factory"),
            processor_factory: self
                .processor_factory
                .expect("step requires a processor factory"),
            sink_factory: self.sink_factory.expect("step requires a sink factory"),
        }
    }
}
