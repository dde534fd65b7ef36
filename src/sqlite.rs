//! SQLite-backed sink, upload store and run log.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::error;

use crate::execution::{BatchStatus, JobExecution, StepExecution};
use crate::item::{Sink, SinkError};
use crate::listener::{JobListener, StepListener};
use crate::organizations::Organization;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS organizations (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    website TEXT NOT NULL,
    country TEXT NOT NULL,
    description TEXT NOT NULL,
    founded TEXT NOT NULL,
    industry TEXT NOT NULL,
    employees INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS import_files (
    id INTEGER PRIMARY KEY,
    file_name TEXT NOT NULL,
    content_type TEXT NOT NULL,
    size INTEGER NOT NULL,
    data BLOB NOT NULL,
    uploaded_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS batch_runs (
    id INTEGER PRIMARY KEY,
    execution_id INTEGER NOT NULL,
    job_name TEXT NOT NULL,
    parameters TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'running',
    exit_description TEXT,
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS batch_steps (
    id INTEGER PRIMARY KEY,
    execution_id INTEGER NOT NULL,
    step_name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'running',
    exit_description TEXT,
    read_count INTEGER NOT NULL DEFAULT 0,
    write_count INTEGER NOT NULL DEFAULT 0,
    filter_count INTEGER NOT NULL DEFAULT 0,
    commit_count INTEGER NOT NULL DEFAULT 0,
    rollback_count INTEGER NOT NULL DEFAULT 0,
    skip_count INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_batch_runs_job ON batch_runs(job_name, started_at);
CREATE INDEX IF NOT EXISTS idx_batch_runs_execution ON batch_runs(execution_id);
CREATE INDEX IF NOT EXISTS idx_batch_steps_execution ON batch_steps(execution_id);
"#;

/// Create the import and run-log tables.
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    for statement in SCHEMA.split(';') {
        let trimmed = statement.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

fn status_str(status: BatchStatus) -> &'static str {
    match status {
        BatchStatus::Running => "running",
        BatchStatus::Completed => "completed",
        BatchStatus::Failed => "failed",
    }
}

/// Sink writing organizations to the `organizations` table, one transaction
/// per chunk.
#[derive(Clone)]
pub struct SqliteOrganizationWriter {
    pool: SqlitePool,
}

impl SqliteOrganizationWriter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Sink for SqliteOrganizationWriter {
    type Item = Organization;

    async fn write(&mut self, items: &[Organization]) -> Result<(), SinkError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SinkError::Storage(e.to_string()))?;

        for organization in items {
            sqlx::query(
                r#"
                INSERT INTO organizations
                    (name, website, country, description, founded, industry, employees)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&organization.name)
            .bind(&organization.website)
            .bind(&organization.country)
            .bind(&organization.description)
            .bind(&organization.founded)
            .bind(&organization.industry)
            .bind(organization.employees as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| SinkError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| SinkError::Storage(e.to_string()))?;

        Ok(())
    }
}

/// Durable identifier of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub i64);

/// Store for uploaded file blobs.
#[derive(Clone)]
pub struct SqliteFileStore {
    pool: SqlitePool,
}

impl SqliteFileStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist an uploaded blob and return its durable identifier.
    pub async fn save(
        &self,
        file_name: &str,
        content_type: &str,
        data: &[u8],
    ) -> anyhow::Result<FileId> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO import_files (file_name, content_type, size, data)
            VALUES (?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(file_name)
        .bind(content_type)
        .bind(data.len() as i64)
        .bind(data)
        .fetch_one(&self.pool)
        .await?;

        Ok(FileId(id))
    }

    /// Load a previously uploaded blob.
    pub async fn load(&self, id: FileId) -> anyhow::Result<Vec<u8>> {
        let data: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT data FROM import_files WHERE id = ?")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        data.ok_or_else(|| anyhow::anyhow!("no uploaded file with id {}", id.0))
    }
}

/// Listener persisting run and step history.
///
/// Registered as both a job and a step listener; it never touches exit
/// descriptions. Log failures are reported and swallowed so telemetry can
/// never fail a run.
#[derive(Clone)]
pub struct SqliteRunLog {
    pool: SqlitePool,
}

impl SqliteRunLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobListener for SqliteRunLog {
    async fn before_job(&self, execution: &JobExecution) {
        let parameters = serde_json::to_string(&execution.parameters).unwrap_or_default();
        let result = sqlx::query(
            "INSERT INTO batch_runs (execution_id, job_name, parameters) VALUES (?, ?, ?)",
        )
        .bind(execution.id.0)
        .bind(&execution.job_name)
        .bind(parameters)
        .execute(&self.pool)
        .await;

        if let Err(err) = result {
            error!(job = %execution.job_name, error = %err, "failed to record run start");
        }
    }

    async fn after_job(&self, execution: &JobExecution) -> Option<String> {
        let result = sqlx::query(
            r#"
            UPDATE batch_runs
            SET status = ?, exit_description = ?, completed_at = datetime('now')
            WHERE execution_id = ?
            "#,
        )
        .bind(status_str(execution.status))
        .bind(&execution.exit.description)
        .bind(execution.id.0)
        .execute(&self.pool)
        .await;

        if let Err(err) = result {
            error!(job = %execution.job_name, error = %err, "failed to record run completion");
        }
        None
    }
}

#[async_trait]
impl StepListener for SqliteRunLog {
    async fn before_step(&self, execution: &StepExecution) {
        let result =
            sqlx::query("INSERT INTO batch_steps (execution_id, step_name) VALUES (?, ?)")
                .bind(execution.job_execution_id.0)
                .bind(&execution.step_name)
                .execute(&self.pool)
                .await;

        if let Err(err) = result {
            error!(step = %execution.step_name, error = %err, "failed to record step start");
        }
    }

    async fn after_step(&self, execution: &StepExecution) -> Option<String> {
        let result = sqlx::query(
            r#"
            UPDATE batch_steps
            SET status = ?, exit_description = ?,
                read_count = ?, write_count = ?, filter_count = ?,
                commit_count = ?, rollback_count = ?, skip_count = ?,
                completed_at = datetime('now')
            WHERE execution_id = ? AND step_name = ?
            "#,
        )
        .bind(status_str(execution.status))
        .bind(&execution.exit.description)
        .bind(execution.read_count as i64)
        .bind(execution.write_count as i64)
        .bind(execution.filter_count as i64)
        .bind(execution.commit_count as i64)
        .bind(execution.rollback_count as i64)
        .bind(execution.skips.total() as i64)
        .bind(execution.job_execution_id.0)
        .bind(&execution.step_name)
        .execute(&self.pool)
        .await;

        if let Err(err) = result {
            error!(step = %execution.step_name, error = %err, "failed to record step completion");
        }
        None
    }
}
