//! Tabular data sources.

use crate::error::AgriError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw cells of a table, header first. Cells are untyped until validated
/// against a family schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DataBatch {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Where a table came from, recorded in the ingestion artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceInfo {
    pub source_type: String,
    pub location: String,
    pub accessed_at: chrono::DateTime<chrono::Utc>,
}

/// Trait for loading a table from a source.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Load the table, optionally limiting the number of rows.
    async fn load(&self, limit: Option<usize>) -> Result<DataBatch, AgriError>;

    fn source_info(&self) -> DataSourceInfo;
}

/// CSV file data source. Header names are trimmed; data rows are kept as
/// read, including ragged ones, so validation can count them.
pub struct CsvSource {
    pub path: PathBuf,
    pub delimiter: u8,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }
}

#[async_trait]
impl DataSource for CsvSource {
    async fn load(&self, limit: Option<usize>) -> Result<DataBatch, AgriError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AgriError::not_found(format!(
                    "source {} does not exist",
                    self.path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(content.as_slice());

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if columns.iter().all(String::is_empty) {
            return Err(AgriError::schema(format!(
                "{} has no header row",
                self.path.display()
            )));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            if limit.is_some_and(|max| rows.len() >= max) {
                break;
            }
            let record = record?;
            if record.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            rows.push(record.iter().map(str::to_string).collect());
        }

        tracing::debug!(
            path = %self.path.display(),
            columns = columns.len(),
            rows = rows.len(),
            "csv source loaded"
        );
        Ok(DataBatch { columns, rows })
    }

    fn source_info(&self) -> DataSourceInfo {
        DataSourceInfo {
            source_type: "csv".to_string(),
            location: self.path.display().to_string(),
            accessed_at: chrono::Utc::now(),
        }
    }
}

/// Serialize a header and rows to CSV bytes.
pub fn encode_csv(columns: &[String], rows: &[Vec<String>]) -> Result<Vec<u8>, AgriError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| AgriError::Io(e.into_error()))
}
