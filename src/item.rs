//! Source, processor and sink traits, and their error types.

use std::marker::PhantomData;

use async_trait::async_trait;
use thiserror::Error;

/// Error raised while pulling records from a source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The underlying byte stream failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be parsed into the item type.
    #[error("malformed record at line {line}: {message}")]
    Malformed { line: u64, message: String },
}

impl SourceError {
    pub fn malformed(line: u64, message: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            message: message.into(),
        }
    }
}

/// Error raised when a sink fails to commit a chunk.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Produces a lazy, finite sequence of records.
///
/// `read` returns `Ok(None)` on exhaustion. Implementations are consumed by
/// exactly one step execution; a fresh source is built per run from the run
/// parameters.
#[async_trait]
pub trait Source: Send {
    type Item: Send;

    async fn read(&mut self) -> Result<Option<Self::Item>, SourceError>;
}

/// Pure record transform.
///
/// Returning `None` filters the record: it is deliberately excluded from
/// output and is not an error.
pub trait Processor: Send + Sync {
    type Input: Send;
    type Output: Send;

    fn process(&self, input: Self::Input) -> Option<Self::Output>;
}

/// Durably persists a batch of records as one atomic unit.
#[async_trait]
pub trait Sink: Send {
    type Item: Send + Sync;

    async fn write(&mut self, items: &[Self::Item]) -> Result<(), SinkError>;
}

/// Identity processor for steps that write every record they read.
pub struct PassThrough<T>(PhantomData<fn(T)>);

impl<T> PassThrough<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for PassThrough<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Processor for PassThrough<T> {
    type Input = T;
    type Output = T;

    fn process(&self, input: T) -> Option<T> {
        Some(input)
    }
}

/// In-memory source over a vector, in submission order.
///
/// Mostly useful in tests and small fixed workloads.
pub struct VecSource<T> {
    items: std::vec::IntoIter<T>,
}

impl<T> VecSource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into_iter(),
        }
    }
}

#[async_trait]
impl<T: Send> Source for VecSource<T> {
    type Item = T;

    async fn read(&mut self) -> Result<Option<T>, SourceError> {
        Ok(self.items.next())
    }
}
