//! Chunk executor properties: conservation, chunking, failure handling.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use batchflow::{
    BatchStatus, ChunkExecutor, ExecutionId, PassThrough, Processor, Sink, SinkError, Source,
    SourceError, StepExecution, VecSource,
};

/// Sink recording every committed chunk.
#[derive(Clone, Default)]
struct CollectingSink {
    chunks: Arc<Mutex<Vec<Vec<i64>>>>,
}

impl CollectingSink {
    fn committed(&self) -> Vec<Vec<i64>> {
        self.chunks.lock().unwrap().clone()
    }

    fn flattened(&self) -> Vec<i64> {
        self.committed().into_iter().flatten().collect()
    }
}

#[async_trait]
impl Sink for CollectingSink {
    type Item = i64;

    async fn write(&mut self, items: &[i64]) -> Result<(), SinkError> {
        self.chunks.lock().unwrap().push(items.to_vec());
        Ok(())
    }
}

/// Sink failing on the nth commit attempt (1-indexed).
struct FailingSink {
    inner: CollectingSink,
    fail_on_commit: usize,
    attempts: usize,
}

impl FailingSink {
    fn new(inner: CollectingSink, fail_on_commit: usize) -> Self {
        Self {
            inner,
            fail_on_commit,
            attempts: 0,
        }
    }
}

#[async_trait]
impl Sink for FailingSink {
    type Item = i64;

    async fn write(&mut self, items: &[i64]) -> Result<(), SinkError> {
        self.attempts += 1;
        if self.attempts == self.fail_on_commit {
            return Err(SinkError::Storage("constraint violation".to_string()));
        }
        self.inner.write(items).await
    }
}

/// Source yielding scripted outcomes, then exhaustion.
struct ScriptedSource {
    outcomes: std::vec::IntoIter<Result<i64, ()>>,
}

impl ScriptedSource {
    fn new(outcomes: Vec<Result<i64, ()>>) -> Self {
        Self {
            outcomes: outcomes.into_iter(),
        }
    }
}

#[async_trait]
impl Source for ScriptedSource {
    type Item = i64;

    async fn read(&mut self) -> Result<Option<i64>, SourceError> {
        match self.outcomes.next() {
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(())) => Err(SourceError::malformed(0, "unparseable record")),
            None => Ok(None),
        }
    }
}

/// Keeps values strictly greater than the threshold.
struct MinValueFilter(i64);

impl Processor for MinValueFilter {
    type Input = i64;
    type Output = i64;

    fn process(&self, value: i64) -> Option<i64> {
        (value > self.0).then_some(value)
    }
}

fn step() -> StepExecution {
    StepExecution::new(ExecutionId(1), "test_step")
}

#[tokio::test]
async fn filtering_conserves_records() {
    let mut source = VecSource::new(vec![500, 1500, 1000, 2000]);
    let mut sink = CollectingSink::default();
    let mut step = step();

    ChunkExecutor::new(1000)
        .execute(&mut source, &MinValueFilter(1000), &mut sink.clone(), &mut step)
        .await;

    assert_eq!(step.status, BatchStatus::Completed);
    assert_eq!(step.read_count, 4);
    assert_eq!(step.write_count, 2);
    assert_eq!(step.filter_count, 2);
    assert_eq!(step.commit_count, 1);
    assert_eq!(step.read_count, step.write_count + step.filter_count);
    assert_eq!(sink.flattened(), vec![1500, 2000]);
}

#[tokio::test]
async fn commit_count_is_ceil_of_kept_over_chunk_size() {
    for (n, chunk_size, expected_commits) in [(5u64, 2, 3u64), (6, 2, 3), (6, 3, 2), (5, 5, 1), (1, 100, 1)] {
        let items: Vec<i64> = (0..n as i64).collect();
        let mut source = VecSource::new(items);
        let mut sink = CollectingSink::default();
        let mut step = step();

        ChunkExecutor::new(chunk_size)
            .execute(
                &mut source,
                &PassThrough::<i64>::new(),
                &mut sink.clone(),
                &mut step,
            )
            .await;

        assert_eq!(step.status, BatchStatus::Completed);
        assert_eq!(step.commit_count, expected_commits, "n={n} chunk={chunk_size}");
        assert_eq!(step.write_count, n);
    }
}

#[tokio::test]
async fn fully_filtered_chunks_do_not_commit() {
    let mut source = VecSource::new(vec![1, 2, 3, 4]);
    let mut sink = CollectingSink::default();
    let mut step = step();

    ChunkExecutor::new(2)
        .execute(&mut source, &MinValueFilter(100), &mut sink.clone(), &mut step)
        .await;

    assert_eq!(step.status, BatchStatus::Completed);
    assert_eq!(step.read_count, 4);
    assert_eq!(step.filter_count, 4);
    assert_eq!(step.write_count, 0);
    assert_eq!(step.commit_count, 0);
    assert!(sink.committed().is_empty());
}

#[tokio::test]
async fn empty_source_completes_without_commits() {
    let mut source = VecSource::new(Vec::new());
    let mut sink = CollectingSink::default();
    let mut step = step();

    ChunkExecutor::new(10)
        .execute(
            &mut source,
            &PassThrough::<i64>::new(),
            &mut sink.clone(),
            &mut step,
        )
        .await;

    assert_eq!(step.status, BatchStatus::Completed);
    assert_eq!(step.read_count, 0);
    assert_eq!(step.commit_count, 0);
}

#[tokio::test]
async fn sink_failure_stops_the_step_and_keeps_earlier_commits() {
    let collecting = CollectingSink::default();
    let mut sink = FailingSink::new(collecting.clone(), 2);
    let mut source = VecSource::new(vec![10, 20, 30, 40, 50]);
    let mut step = step();

    ChunkExecutor::new(2)
        .execute(&mut source, &PassThrough::<i64>::new(), &mut sink, &mut step)
        .await;

    assert_eq!(step.status, BatchStatus::Failed);
    assert!(step.exit.description.contains("commit failed"));
    assert_eq!(step.commit_count, 1);
    assert_eq!(step.rollback_count, 1);
    assert_eq!(step.write_count, 2);
    // The failed chunk and everything after it never reached storage.
    assert_eq!(collecting.flattened(), vec![10, 20]);
}

#[tokio::test]
async fn read_error_is_fatal_by_default() {
    let mut source = ScriptedSource::new(vec![Ok(1), Ok(2), Err(())]);
    let mut sink = CollectingSink::default();
    let mut step = step();

    ChunkExecutor::new(10)
        .execute(
            &mut source,
            &PassThrough::<i64>::new(),
            &mut sink.clone(),
            &mut step,
        )
        .await;

    assert_eq!(step.status, BatchStatus::Failed);
    assert!(step.exit.description.contains("read failed"));
    assert_eq!(step.read_count, 2);
    assert_eq!(step.commit_count, 0);
    assert!(sink.committed().is_empty());
}

#[tokio::test]
async fn skip_limit_tolerates_unreadable_records() {
    let mut source = ScriptedSource::new(vec![Ok(1), Err(()), Ok(2), Ok(3)]);
    let mut sink = CollectingSink::default();
    let mut step = step();

    ChunkExecutor::new(2)
        .with_skip_limit(1)
        .execute(
            &mut source,
            &PassThrough::<i64>::new(),
            &mut sink.clone(),
            &mut step,
        )
        .await;

    assert_eq!(step.status, BatchStatus::Completed);
    assert_eq!(step.read_count, 4);
    assert_eq!(step.skips.read, 1);
    assert_eq!(step.write_count, 3);
    assert_eq!(
        step.read_count,
        step.write_count + step.filter_count + step.skips.read
    );
}

#[tokio::test]
async fn second_unreadable_record_exceeds_the_limit() {
    let mut source = ScriptedSource::new(vec![Ok(1), Err(()), Ok(2), Err(()), Ok(3)]);
    let mut sink = CollectingSink::default();
    let mut step = step();

    ChunkExecutor::new(10)
        .with_skip_limit(1)
        .execute(
            &mut source,
            &PassThrough::<i64>::new(),
            &mut sink.clone(),
            &mut step,
        )
        .await;

    assert_eq!(step.status, BatchStatus::Failed);
    assert_eq!(step.skips.read, 1);
}

#[tokio::test]
async fn records_commit_in_source_order() {
    let items: Vec<i64> = (0..25).collect();
    let mut source = VecSource::new(items.clone());
    let mut sink = CollectingSink::default();
    let mut step = step();

    ChunkExecutor::new(4)
        .execute(
            &mut source,
            &PassThrough::<i64>::new(),
            &mut sink.clone(),
            &mut step,
        )
        .await;

    assert_eq!(sink.flattened(), items);
    assert_eq!(step.commit_count, 7); // ceil(25 / 4)
    for chunk in sink.committed().iter().take(6) {
        assert_eq!(chunk.len(), 4);
    }
    assert_eq!(sink.committed().last().unwrap().len(), 1);
}
