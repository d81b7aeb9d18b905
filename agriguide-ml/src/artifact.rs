//! Records of what each stage produced, handed to the next stage.

use crate::data::schema::Family;
use crate::data::source::DataSourceInfo;
use crate::features::cleaning::CleaningSummary;
use crate::features::transformer::FeatureContract;
use crate::training::metrics::ModelMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Output of ingestion: the persisted split and row accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataIngestionArtifact {
    pub family: Family,
    pub source: DataSourceInfo,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub source_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub dropped_rows: usize,
    pub dropped_by_reason: BTreeMap<String, usize>,
    pub created_at: DateTime<Utc>,
}

/// Output of transformation: the fitted transformer and the feature matrices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTransformationArtifact {
    pub family: Family,
    pub transformer_path: PathBuf,
    pub transformer_sha256: String,
    pub train_matrix_path: PathBuf,
    pub test_matrix_path: PathBuf,
    pub contract: FeatureContract,
    pub cleaning: CleaningSummary,
    pub train_rows: usize,
    pub test_rows: usize,
    /// Test rows dropped for carrying a category unseen in training.
    pub dropped_test_rows: usize,
}

/// Output of training: where the published artifacts live and how the model
/// scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTrainerArtifact {
    pub family: Family,
    pub transformer_path: PathBuf,
    pub model_path: PathBuf,
    pub model_sha256: String,
    /// Fingerprint of the transformer the model was trained against.
    pub contract_fingerprint: String,
    pub metrics: ModelMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auxiliary_metrics: Option<ModelMetrics>,
    /// Most important features by forest importance, highest first.
    #[serde(default)]
    pub top_features: Vec<(String, f64)>,
}
