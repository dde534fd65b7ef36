//! Organization records and their CSV source.
//!
//! The file format is comma-separated with one header row and nine ordered
//! columns: `index, organizationId, name, website, country, description,
//! founded, industry, employees`. The first two columns are read but not
//! mapped.

use std::io::Cursor;
use std::path::Path;

use async_trait::async_trait;
use csv_async::{AsyncReader, AsyncReaderBuilder, StringRecord};
use tokio::io::AsyncRead;
use tracing::warn;

use crate::item::{Processor, Source, SourceError};

/// Default dataset shipped with the crate, standing in for a deployed file.
const BUNDLED_ORGANIZATIONS: &[u8] = include_bytes!("../data/organizations.csv");

const COLUMNS: usize = 9;
const COL_NAME: usize = 2;
const COL_WEBSITE: usize = 3;
const COL_COUNTRY: usize = 4;
const COL_DESCRIPTION: usize = 5;
const COL_FOUNDED: usize = 6;
const COL_INDUSTRY: usize = 7;
const COL_EMPLOYEES: usize = 8;

/// One imported organization. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub name: String,
    pub website: String,
    pub country: String,
    pub description: String,
    pub founded: String,
    pub industry: String,
    pub employees: u64,
}

type DynRead = Box<dyn AsyncRead + Unpin + Send>;

/// Lazy CSV source over a file or an in-memory blob.
///
/// Records are produced in file order. The header row is consumed up front
/// and never counts as a read.
pub struct CsvSource {
    reader: AsyncReader<DynRead>,
    record: StringRecord,
    lines_consumed: u64,
    skip_remaining: u64,
}

impl CsvSource {
    /// Source over an opened file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::from_reader(Box::new(file)))
    }

    /// Source over an in-memory blob, e.g. an uploaded file's bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::from_reader(Box::new(Cursor::new(bytes)))
    }

    /// Source over the bundled default dataset.
    pub fn bundled() -> Self {
        Self::from_bytes(BUNDLED_ORGANIZATIONS.to_vec())
    }

    fn from_reader(reader: DynRead) -> Self {
        let reader = AsyncReaderBuilder::new()
            .has_headers(true)
            .create_reader(reader);
        Self {
            reader,
            record: StringRecord::new(),
            lines_consumed: 0,
            skip_remaining: 0,
        }
    }

    /// Skip the first `offset` data records without counting them as reads.
    ///
    /// Supports resuming a partially processed file at a known offset.
    pub fn starting_at(mut self, offset: u64) -> Self {
        self.skip_remaining = offset;
        self
    }

    // Line number of the record about to be read: one header line, then
    // one-based data lines.
    fn next_line(&self) -> u64 {
        self.lines_consumed + 2
    }
}

#[async_trait]
impl Source for CsvSource {
    type Item = Organization;

    async fn read(&mut self) -> Result<Option<Organization>, SourceError> {
        loop {
            let line = self.next_line();
            let more = self
                .reader
                .read_record(&mut self.record)
                .await
                .map_err(|err| SourceError::malformed(line, err.to_string()))?;
            if !more {
                return Ok(None);
            }
            self.lines_consumed += 1;
            if self.skip_remaining > 0 {
                self.skip_remaining -= 1;
                continue;
            }
            return map_record(&self.record, line).map(Some);
        }
    }
}

fn map_record(record: &StringRecord, line: u64) -> Result<Organization, SourceError> {
    if record.len() != COLUMNS {
        return Err(SourceError::malformed(
            line,
            format!("expected {} columns, found {}", COLUMNS, record.len()),
        ));
    }

    let field = |index: usize| record.get(index).unwrap_or("").trim().to_string();

    let employees_raw = record.get(COL_EMPLOYEES).unwrap_or("").trim();
    let employees = employees_raw.parse::<u64>().map_err(|_| {
        SourceError::malformed(
            line,
            format!("employees is not a non-negative integer: '{employees_raw}'"),
        )
    })?;

    Ok(Organization {
        name: field(COL_NAME),
        website: field(COL_WEBSITE),
        country: field(COL_COUNTRY),
        description: field(COL_DESCRIPTION),
        founded: field(COL_FOUNDED),
        industry: field(COL_INDUSTRY),
        employees,
    })
}

/// Keeps organizations with strictly more employees than the threshold.
pub struct MinEmployeesFilter {
    min_employees: i64,
}

impl MinEmployeesFilter {
    pub fn new(min_employees: i64) -> Self {
        Self { min_employees }
    }
}

impl Processor for MinEmployeesFilter {
    type Input = Organization;
    type Output = Organization;

    fn process(&self, organization: Organization) -> Option<Organization> {
        if i128::from(organization.employees) > i128::from(self.min_employees) {
            Some(organization)
        } else {
            warn!(
                organization = %organization.name,
                employees = organization.employees,
                "organization filtered"
            );
            None
        }
    }
}
