//! Organization import jobs and their trigger surface.
//!
//! Three triggers, all converging on [`JobLauncher::submit`]: the startup
//! import with fixed defaults, the threshold import parameterized by the
//! caller, and the upload import reading back a persisted blob.

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::info;

use crate::item::PassThrough;
use crate::job::Job;
use crate::launcher::{JobHandle, JobLauncher};
use crate::listener::{LogJobListener, LogStepListener};
use crate::organizations::{CsvSource, MinEmployeesFilter, Organization};
use crate::params::RunParameters;
use crate::registry::LaunchError;
use crate::sqlite::{self, FileId, SqliteFileStore, SqliteOrganizationWriter, SqliteRunLog};
use crate::step::StepBuilder;

/// Parameter naming a CSV file on disk. Absent means the bundled dataset.
pub const SOURCE_PATH_KEY: &str = "source.path";
/// Parameter holding the employee-count threshold.
pub const MIN_EMPLOYEES_KEY: &str = "min.employees";
/// Parameter referencing an uploaded file blob.
pub const FILE_ID_KEY: &str = "file.id";

/// Threshold used by the startup trigger.
pub const DEFAULT_MIN_EMPLOYEES: i64 = 1000;

/// The organization import application: three jobs over one SQLite store.
pub struct ImportService {
    launcher: Arc<JobLauncher>,
    file_store: SqliteFileStore,
    import_job: Arc<Job>,
    threshold_job: Arc<Job>,
    upload_job: Arc<Job>,
}

impl ImportService {
    /// Build the service on the given pool, creating tables as needed.
    pub async fn new(pool: SqlitePool) -> anyhow::Result<Self> {
        Self::with_launcher(pool, Arc::new(JobLauncher::new())).await
    }

    /// Build the service with a caller-provided launcher.
    pub async fn with_launcher(
        pool: SqlitePool,
        launcher: Arc<JobLauncher>,
    ) -> anyhow::Result<Self> {
        sqlite::run_migrations(&pool).await?;

        let file_store = SqliteFileStore::new(pool.clone());
        let run_log = SqliteRunLog::new(pool.clone());

        let import_job = Arc::new(filtered_import_job(
            "organization_import",
            "csv_import",
            1000,
            &pool,
            &run_log,
        ));
        let threshold_job = Arc::new(filtered_import_job(
            "threshold_import",
            "threshold_csv_import",
            500,
            &pool,
            &run_log,
        ));
        let upload_job = Arc::new(upload_import_job(&pool, &file_store, &run_log));

        Ok(Self {
            launcher,
            file_store,
            import_job,
            threshold_job,
            upload_job,
        })
    }

    /// Startup trigger: bundled dataset, default threshold.
    ///
    /// Intended to fire once when the hosting process becomes ready.
    pub fn startup(&self) -> Result<JobHandle, LaunchError> {
        let parameters = RunParameters::builder()
            .long(MIN_EMPLOYEES_KEY, DEFAULT_MIN_EMPLOYEES)
            .build();
        self.launcher.submit(self.import_job.clone(), parameters)
    }

    /// File-path trigger: import a CSV file from disk with the given threshold.
    pub fn import_file(
        &self,
        source_path: &str,
        min_employees: i64,
    ) -> Result<JobHandle, LaunchError> {
        let parameters = RunParameters::builder()
            .string(SOURCE_PATH_KEY, source_path)
            .long(MIN_EMPLOYEES_KEY, min_employees)
            .build();
        self.launcher.submit(self.import_job.clone(), parameters)
    }

    /// Threshold trigger: default source, caller-supplied threshold.
    pub fn start_with_threshold(&self, min_employees: i64) -> Result<JobHandle, LaunchError> {
        info!(min_employees, "starting threshold import");
        let parameters = RunParameters::builder()
            .long(MIN_EMPLOYEES_KEY, min_employees)
            .build();
        self.launcher.submit(self.threshold_job.clone(), parameters)
    }

    /// Upload trigger: persist the blob, then import every record from it.
    pub async fn upload(
        &self,
        file_name: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> anyhow::Result<JobHandle> {
        info!(file = %file_name, size = data.len(), "received upload");
        let file_id = self.file_store.save(file_name, content_type, &data).await?;

        let parameters = RunParameters::builder().long(FILE_ID_KEY, file_id.0).build();
        Ok(self.launcher.submit(self.upload_job.clone(), parameters)?)
    }

    pub fn launcher(&self) -> &Arc<JobLauncher> {
        &self.launcher
    }

    pub fn file_store(&self) -> &SqliteFileStore {
        &self.file_store
    }
}

/// CSV import with the employee-count filter, over a path parameter or the
/// bundled dataset.
fn filtered_import_job(
    job_name: &str,
    step_name: &str,
    chunk_size: usize,
    pool: &SqlitePool,
    run_log: &SqliteRunLog,
) -> Job {
    let writer_pool = pool.clone();

    let step = StepBuilder::new(step_name)
        .chunk(chunk_size)
        .allow_start_if_complete(true)
        .source(|params: RunParameters| async move {
            match params.get_string(SOURCE_PATH_KEY) {
                Some(path) => {
                    let path = path.to_string();
                    Ok(CsvSource::from_path(&path).await?)
                }
                None => Ok(CsvSource::bundled()),
            }
        })
        .processor(|params: &RunParameters| {
            let min_employees = params.get_long(MIN_EMPLOYEES_KEY).ok_or_else(|| {
                anyhow::anyhow!("missing required parameter '{}'", MIN_EMPLOYEES_KEY)
            })?;
            Ok(MinEmployeesFilter::new(min_employees))
        })
        .sink(move |_params: &RunParameters| Ok(SqliteOrganizationWriter::new(writer_pool.clone())))
        .build();

    Job::builder(job_name)
        .incrementer()
        .listener(LogJobListener)
        .listener(run_log.clone())
        .step_listener(LogStepListener)
        .step_listener(run_log.clone())
        .step(step)
        .build()
}

/// Import of an uploaded blob: no processor, every record is written.
fn upload_import_job(pool: &SqlitePool, file_store: &SqliteFileStore, run_log: &SqliteRunLog) -> Job {
    let writer_pool = pool.clone();
    let file_store = file_store.clone();

    let step = StepBuilder::new("upload_csv_import")
        .chunk(50)
        .allow_start_if_complete(true)
        .source(move |params: RunParameters| {
            let file_store = file_store.clone();
            async move {
                let file_id = params.get_long(FILE_ID_KEY).ok_or_else(|| {
                    anyhow::anyhow!("missing required parameter '{}'", FILE_ID_KEY)
                })?;
                let data = file_store.load(FileId(file_id)).await?;
                Ok(CsvSource::from_bytes(data))
            }
        })
        .processor(|_params: &RunParameters| Ok(PassThrough::<Organization>::new()))
        .sink(move |_params: &RunParameters| Ok(SqliteOrganizationWriter::new(writer_pool.clone())))
        .build();

    Job::builder("upload_import")
        .incrementer()
        .listener(LogJobListener)
        .listener(run_log.clone())
        .step_listener(LogStepListener)
        .step_listener(run_log.clone())
        .step(step)
        .build()
}
