//! Training stage for the fertilizer classifier.
//!
//! Same contract as [`ModelTrainer`](crate::training::ModelTrainer), with its
//! own transformer and model. Nothing fitted here is shared with the crop or
//! yield families.

use crate::artifact::{DataTransformationArtifact, ModelTrainerArtifact};
use crate::config::ModelTrainerConfig;
use crate::data::schema::Family;
use crate::error::AgriError;
use crate::persistence::{ArtifactCodec, ArtifactStore, JsonCodec};
use crate::training::metrics::ModelMetrics;
use crate::training::model::ModelArtifact;
use crate::training::trainer::{fit_classifier, load_inputs, persist};
use tracing::info;

pub struct FertilizerTrainer<C: ArtifactCodec = JsonCodec> {
    config: ModelTrainerConfig,
    store: ArtifactStore<C>,
}

impl FertilizerTrainer<JsonCodec> {
    pub fn new(config: ModelTrainerConfig) -> Self {
        Self::with_store(config, ArtifactStore::new(JsonCodec))
    }
}

impl<C: ArtifactCodec> FertilizerTrainer<C> {
    pub fn with_store(config: ModelTrainerConfig, store: ArtifactStore<C>) -> Self {
        Self { config, store }
    }

    pub async fn initiate(
        &self,
        transformation: &DataTransformationArtifact,
    ) -> Result<ModelTrainerArtifact, AgriError> {
        if self.config.family != Family::Fertilizer {
            return Err(AgriError::config(format!(
                "FertilizerTrainer cannot train the {} family",
                self.config.family
            )));
        }
        let inputs = load_inputs(&self.store, &self.config, transformation).await?;
        let (forest, metrics, labels) =
            fit_classifier(Family::Fertilizer, &inputs, &self.config.forest)?;
        info!(
            family = "fertilizer",
            accuracy = metrics.accuracy,
            classes = labels.len(),
            "fertilizer forest evaluated"
        );

        let model = ModelArtifact {
            family: Family::Fertilizer,
            contract_fingerprint: inputs.transformer.contract().fingerprint.clone(),
            feature_names: inputs.train.feature_names.clone(),
            labels,
            forest_config: self.config.forest.clone(),
            forest,
            metrics: ModelMetrics::Classification(metrics),
            auxiliary: None,
            trained_at: chrono::Utc::now(),
        };
        persist(&self.store, &self.config, &inputs.transformer, model).await
    }
}
