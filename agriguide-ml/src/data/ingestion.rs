//! Ingestion stage: load a source, validate it, split it, persist the split.

use crate::artifact::DataIngestionArtifact;
use crate::config::DataIngestionConfig;
use crate::data::schema::{FamilySchema, RawRecord, TaskType};
use crate::data::source::{CsvSource, DataSource, encode_csv};
use crate::data::split::{Split, random_split, stratified_split};
use crate::data::validate::validate_batch;
use crate::error::AgriError;
use crate::persistence::atomic_write;
use std::path::Path;
use tracing::info;

pub struct DataIngestion {
    config: DataIngestionConfig,
    source: Box<dyn DataSource>,
}

impl DataIngestion {
    /// Ingestion reading the CSV named in the config.
    pub fn new(config: DataIngestionConfig) -> Self {
        let source = Box::new(CsvSource::new(&config.source_path));
        Self { config, source }
    }

    /// Ingestion reading from any source.
    pub fn with_source(config: DataIngestionConfig, source: Box<dyn DataSource>) -> Self {
        Self { config, source }
    }

    pub async fn initiate(&self) -> Result<DataIngestionArtifact, AgriError> {
        let family = self.config.family;
        let schema = family.schema();
        let batch = self.source.load(None).await?;
        let (records, report) =
            validate_batch(&schema, &batch, self.config.allow_extra_columns)?;

        if records.is_empty() {
            return Err(AgriError::empty_dataset(format!(
                "{family} source has no valid rows ({} read, {} dropped)",
                report.total_rows, report.dropped_rows
            )));
        }

        let split = self.split(&schema, records)?;
        write_split(&schema, &split.train, &self.config.train_path).await?;
        write_split(&schema, &split.test, &self.config.test_path).await?;

        info!(
            family = %family,
            stage = "ingestion",
            source_rows = report.total_rows,
            train_rows = split.train.len(),
            test_rows = split.test.len(),
            dropped_rows = report.dropped_rows,
            "ingestion complete"
        );

        Ok(DataIngestionArtifact {
            family,
            source: self.source.source_info(),
            train_path: self.config.train_path.clone(),
            test_path: self.config.test_path.clone(),
            source_rows: report.total_rows,
            train_rows: split.train.len(),
            test_rows: split.test.len(),
            dropped_rows: report.dropped_rows,
            dropped_by_reason: report.dropped_by_reason,
            created_at: chrono::Utc::now(),
        })
    }

    fn split(&self, schema: &FamilySchema, records: Vec<RawRecord>) -> Result<Split, AgriError> {
        let (ratio, seed) = (self.config.test_ratio, self.config.seed);
        match schema.family.task() {
            TaskType::Classification => {
                let label = schema.target_column().ok_or_else(|| {
                    AgriError::schema(format!("{} schema has no label column", schema.family))
                })?;
                stratified_split(records, label, ratio, seed)
            }
            TaskType::Regression => Ok(random_split(records, ratio, seed)),
        }
    }
}

/// Persist records with the schema's columns, in schema order.
async fn write_split(
    schema: &FamilySchema,
    records: &[RawRecord],
    path: &Path,
) -> Result<(), AgriError> {
    let columns = schema.column_names();
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|r| {
            columns
                .iter()
                .map(|c| r.get(c).map(|v| v.to_cell()).unwrap_or_default())
                .collect()
        })
        .collect();
    atomic_write(path, &encode_csv(&columns, &rows)?).await?;
    Ok(())
}

/// Read a persisted split back into records.
pub async fn read_split(schema: &FamilySchema, path: &Path) -> Result<Vec<RawRecord>, AgriError> {
    let batch = CsvSource::new(path).load(None).await?;
    let (records, report) = validate_batch(schema, &batch, false)?;
    if report.dropped_rows > 0 {
        return Err(AgriError::transformation(format!(
            "persisted split {} has {} invalid rows",
            path.display(),
            report.dropped_rows
        )));
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::data::schema::Family;
    use crate::data::source::{DataBatch, DataSourceInfo};
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Table held in memory, for feeding ingestion without a file.
    struct MemorySource(DataBatch);

    #[async_trait]
    impl DataSource for MemorySource {
        async fn load(&self, limit: Option<usize>) -> Result<DataBatch, AgriError> {
            let mut batch = self.0.clone();
            if let Some(max) = limit {
                batch.rows.truncate(max);
            }
            Ok(batch)
        }

        fn source_info(&self) -> DataSourceInfo {
            DataSourceInfo {
                source_type: "memory".to_string(),
                location: "test".to_string(),
                accessed_at: chrono::Utc::now(),
            }
        }
    }

    fn config(dir: &Path, family: Family, source: &str) -> DataIngestionConfig {
        let source_path = dir.join("source.csv");
        std::fs::write(&source_path, source).unwrap();
        let mut pipeline = PipelineConfig {
            artifact_dir: dir.join("artifacts"),
            ..Default::default()
        };
        match family {
            Family::Crop => pipeline.crop.source = source_path,
            Family::Yield => pipeline.r#yield.source = source_path,
            Family::Fertilizer => pipeline.fertilizer.source = source_path,
        }
        DataIngestionConfig::new(&pipeline, family)
    }

    fn crop_csv(rows: usize) -> String {
        let mut csv = String::from("N,P,K,temperature,humidity,ph,rainfall,label\n");
        for i in 0..rows {
            let label = if i % 2 == 0 { "rice" } else { "maize" };
            csv.push_str(&format!("{},{},40,21.5,80.1,6.4,200.5,{label}\n", 10 + i, 30 + i));
        }
        csv
    }

    #[tokio::test]
    async fn test_ingestion_writes_split() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), Family::Crop, &crop_csv(20));
        let artifact = DataIngestion::new(cfg.clone()).initiate().await.unwrap();
        assert_eq!(artifact.source_rows, 20);
        assert_eq!(artifact.train_rows + artifact.test_rows, 20);
        assert_eq!(artifact.test_rows, 4);
        assert_eq!(artifact.source.source_type, "csv");
        assert!(cfg.train_path.exists());

        let train = read_split(&Family::Crop.schema(), &cfg.train_path).await.unwrap();
        assert_eq!(train.len(), artifact.train_rows);
    }

    #[tokio::test]
    async fn test_missing_column_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let cfg = config(
            dir.path(),
            Family::Crop,
            "N,P,K,temperature,humidity,ph,label\n1,2,3,4,5,6,rice\n",
        );
        let err = DataIngestion::new(cfg.clone()).initiate().await.unwrap_err();
        assert!(matches!(err, AgriError::Schema(_)));
        assert!(!cfg.train_path.exists());
    }

    #[tokio::test]
    async fn test_all_rows_invalid_is_empty_dataset() {
        let dir = TempDir::new().unwrap();
        let cfg = config(
            dir.path(),
            Family::Crop,
            "N,P,K,temperature,humidity,ph,rainfall,label\nx,2,3,4,5,6,7,rice\n1,2,3,4,5,6,7,\n",
        );
        let err = DataIngestion::new(cfg).initiate().await.unwrap_err();
        assert!(matches!(err, AgriError::EmptyDataset(_)));
    }

    #[tokio::test]
    async fn test_ingestion_from_memory_source() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), Family::Fertilizer, "unused\n");
        let columns: Vec<String> = [
            "Temparature", "Humidity", "Moisture", "Soil Type", "Crop Type",
            "Nitrogen", "Potassium", "Phosphorous", "Fertilizer Name",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();
        let rows: Vec<Vec<String>> = (0..10)
            .map(|i| {
                let name = if i % 2 == 0 { "Urea" } else { "DAP" };
                [
                    "26", "52", "38", "Sandy", "Maize", &(30 + i).to_string(), "0", "0", name,
                ]
                .iter()
                .map(|c| c.to_string())
                .collect()
            })
            .collect();
        let source = MemorySource(DataBatch { columns, rows });

        let artifact = DataIngestion::with_source(cfg.clone(), Box::new(source))
            .initiate()
            .await
            .unwrap();
        assert_eq!(artifact.source.source_type, "memory");
        assert_eq!(artifact.source_rows, 10);
        assert_eq!(artifact.train_rows + artifact.test_rows, 10);
        let test = read_split(&Family::Fertilizer.schema(), &cfg.test_path).await.unwrap();
        assert_eq!(test.len(), artifact.test_rows);
    }
}
