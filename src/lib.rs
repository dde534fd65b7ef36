//! # Batchflow
//!
//! The embeddable batch import engine.
//!
//! Chunk-oriented, restartable batch jobs that run in your process. No
//! infrastructure required.
//!
//! ## Why Batchflow?
//!
//! - **Transactional chunks** - Records commit in bounded batches; a failed
//!   chunk never poisons what was already committed
//! - **Restart-safe** - Run identities reject duplicates, completed steps
//!   can be reused on restart instead of reprocessed
//! - **Observable by default** - Read/write/filter/commit counts on every
//!   step, hooks at every job and step boundary
//! - **Embeddable** - A library, not a service
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use batchflow::{Job, JobLauncher, RunParameters, StepBuilder};
//!
//! let step = StepBuilder::new("load")
//!     .chunk(500)
//!     .source(|params| async move { Ok(build_source(&params)?) })
//!     .processor(|params| Ok(build_filter(params)?))
//!     .sink(|_| Ok(build_sink()))
//!     .build();
//!
//! let job = Arc::new(
//!     Job::builder("import")
//!         .step(step)
//!         .build(),
//! );
//!
//! let launcher = JobLauncher::new();
//! let handle = launcher.submit(job, RunParameters::default())?;
//! let execution = handle.wait().await?;
//! ```
//!
//! ## The organization importer
//!
//! The crate ships the CSV organization importer built on the engine:
//!
//! ```rust,ignore
//! use batchflow::ImportService;
//!
//! let service = ImportService::new(pool).await?;
//! service.startup()?;
//! service.start_with_threshold(2500)?;
//! service.upload("orgs.csv", "text/csv", bytes).await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `sqlite` (default) - SQLite-backed sink, upload store, run log, and the
//!   organization import service

pub mod chunk;
pub mod execution;
pub mod item;
pub mod job;
pub mod launcher;
pub mod listener;
pub mod organizations;
pub mod params;
pub mod registry;
pub mod step;

pub use chunk::ChunkExecutor;
pub use execution::{
    BatchStatus, ExecutionId, ExitStatus, JobExecution, SkipCounts, StepExecution,
};
pub use item::{PassThrough, Processor, Sink, SinkError, Source, SourceError, VecSource};
pub use job::{Job, JobBuilder};
pub use launcher::{JobHandle, JobLauncher};
pub use listener::{JobListener, LogJobListener, LogStepListener, StepListener};
pub use organizations::{CsvSource, MinEmployeesFilter, Organization};
pub use params::{ParamValue, RunIdentity, RunParameters, RunParametersBuilder, RUN_ID_KEY};
pub use registry::{LaunchError, RunRegistry};
pub use step::{ChunkStep, StepBuilder, StepRunner};

#[cfg(feature = "sqlite")]
pub mod importer;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use importer::ImportService;

#[cfg(feature = "sqlite")]
pub use sqlite::{FileId, SqliteFileStore, SqliteOrganizationWriter, SqliteRunLog};
