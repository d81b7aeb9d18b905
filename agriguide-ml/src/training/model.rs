//! The persisted model artifact.

use crate::algorithms::{GaussianNaiveBayes, RandomForest};
use crate::config::ForestConfig;
use crate::data::schema::Family;
use crate::error::AgriError;
use crate::features::transformer::FittedTransformer;
use crate::training::metrics::ModelMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Companion model trained on the same matrix as the forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryModel {
    pub model: GaussianNaiveBayes,
    pub metrics: ModelMetrics,
}

/// Fitted estimator, its evaluation, and the contract it was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub family: Family,
    /// Fingerprint of the transformer that produced the training matrix.
    pub contract_fingerprint: String,
    pub feature_names: Vec<String>,
    /// Class names in code order; empty for the regressor.
    pub labels: Vec<String>,
    pub forest_config: ForestConfig,
    pub forest: RandomForest,
    pub metrics: ModelMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<AuxiliaryModel>,
    pub trained_at: DateTime<Utc>,
}

impl ModelArtifact {
    /// Fail unless this model was trained against `transformer`.
    pub fn check_compatible(&self, transformer: &FittedTransformer) -> Result<(), AgriError> {
        let contract = transformer.contract();
        if self.family != transformer.family() {
            return Err(AgriError::ArtifactMismatch(format!(
                "{} model paired with a {} transformer",
                self.family,
                transformer.family()
            )));
        }
        if self.contract_fingerprint != contract.fingerprint {
            return Err(AgriError::ArtifactMismatch(format!(
                "{} model was trained against transformer {}, loaded transformer is {}",
                self.family, self.contract_fingerprint, contract.fingerprint
            )));
        }
        if self.feature_names != contract.feature_names || self.forest.n_features() != contract.width() {
            return Err(AgriError::ArtifactMismatch(format!(
                "{} model features do not match the transformer contract",
                self.family
            )));
        }
        Ok(())
    }

    /// Top `n` features by forest importance.
    pub fn top_features(&self, n: usize) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .feature_names
            .iter()
            .map(String::as_str)
            .zip(self.forest.feature_importances().iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(n);
        ranked
    }
}
