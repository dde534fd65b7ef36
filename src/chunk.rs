//! Chunk-oriented step execution.
//!
//! The executor drives one step: pull up to `chunk_size` records from the
//! source, run each through the processor, and commit the kept set through
//! the sink as one unit of work. Counts and terminal status land on the
//! step's [`StepExecution`].

use tracing::{debug, warn};

use crate::execution::StepExecution;
use crate::item::{Processor, Sink, Source};

/// Drives the read/process/write loop for a single step.
///
/// Chunk size governs transactional granularity: each committed chunk is
/// independently durable, and a failed commit abandons only the records of
/// that chunk. Records are processed and committed in source order.
#[derive(Debug, Clone, Copy)]
pub struct ChunkExecutor {
    chunk_size: usize,
    skip_limit: u64,
}

impl ChunkExecutor {
    /// Create an executor committing every `chunk_size` kept records.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is 0.
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be at least 1");
        Self {
            chunk_size,
            skip_limit: 0,
        }
    }

    /// Tolerate up to `limit` unreadable records per step.
    ///
    /// The default is 0: a malformed record fails the step.
    pub fn with_skip_limit(mut self, limit: u64) -> Self {
        self.skip_limit = limit;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Run the step to completion or first fatal failure.
    ///
    /// On return the step execution is terminal: `Completed` when the source
    /// was exhausted and every chunk committed, `Failed` on a read error past
    /// the skip limit or on a commit failure. Chunks committed before a
    /// failure stay committed.
    pub async fn execute<R, P, W>(
        &self,
        source: &mut R,
        processor: &P,
        sink: &mut W,
        step: &mut StepExecution,
    ) where
        R: Source,
        P: Processor<Input = R::Item>,
        W: Sink<Item = P::Output>,
    {
        loop {
            let mut kept: Vec<P::Output> = Vec::with_capacity(self.chunk_size);
            let mut pulled = 0usize;
            let mut exhausted = false;

            while pulled < self.chunk_size {
                match source.read().await {
                    Ok(Some(item)) => {
                        pulled += 1;
                        step.read_count += 1;
                        match processor.process(item) {
                            Some(output) => kept.push(output),
                            None => step.filter_count += 1,
                        }
                    }
                    Ok(None) => {
                        exhausted = true;
                        break;
                    }
                    Err(err) => {
                        if step.skips.read < self.skip_limit {
                            step.read_count += 1;
                            step.skips.read += 1;
                            warn!(
                                step = %step.step_name,
                                error = %err,
                                skipped = step.skips.read,
                                "unreadable record skipped"
                            );
                            continue;
                        }
                        step.mark_failed(format!("read failed: {}", err));
                        return;
                    }
                }
            }

            if !kept.is_empty() {
                match sink.write(&kept).await {
                    Ok(()) => {
                        step.write_count += kept.len() as u64;
                        step.commit_count += 1;
                        debug!(
                            step = %step.step_name,
                            written = kept.len(),
                            commits = step.commit_count,
                            "chunk committed"
                        );
                    }
                    Err(err) => {
                        step.rollback_count += 1;
                        step.mark_failed(format!("commit failed: {}", err));
                        return;
                    }
                }
            }

            if exhausted {
                break;
            }
        }

        step.mark_completed();
    }
}
