//! Transformation stage: clean the persisted split, fit the transformer on
//! the training rows, and write the transformer and both feature matrices.

use crate::artifact::{DataIngestionArtifact, DataTransformationArtifact};
use crate::config::{DataTransformationConfig, UnseenCategoryPolicy};
use crate::data::ingestion::read_split;
use crate::data::schema::Family;
use crate::error::AgriError;
use crate::features::cleaning::{YIELD_COLUMN, clean_splits};
use crate::features::transformer::FittedTransformer;
use crate::persistence::{ArtifactCodec, ArtifactStore, JsonCodec};
use tracing::{info, warn};

pub struct DataTransformation<C: ArtifactCodec = JsonCodec> {
    config: DataTransformationConfig,
    store: ArtifactStore<C>,
}

impl DataTransformation<JsonCodec> {
    pub fn new(config: DataTransformationConfig) -> Self {
        Self::with_store(config, ArtifactStore::new(JsonCodec))
    }
}

impl<C: ArtifactCodec> DataTransformation<C> {
    pub fn with_store(config: DataTransformationConfig, store: ArtifactStore<C>) -> Self {
        Self { config, store }
    }

    pub async fn initiate(
        &self,
        ingestion: &DataIngestionArtifact,
    ) -> Result<DataTransformationArtifact, AgriError> {
        let family = self.config.family;
        if ingestion.family != family {
            return Err(AgriError::ArtifactMismatch(format!(
                "{} ingestion artifact handed to the {family} transformation",
                ingestion.family
            )));
        }
        let schema = family.schema();
        let mut train = read_split(&schema, &self.config.train_path).await?;
        let mut test = read_split(&schema, &self.config.test_path).await?;

        let cleaning = clean_splits(family, &self.config.cleaning, &mut train, &mut test)?;
        if train.is_empty() {
            return Err(AgriError::empty_dataset(format!(
                "no {family} training rows left after cleaning"
            )));
        }

        let target_column = match family {
            Family::Yield => YIELD_COLUMN,
            _ => schema.target_column().ok_or_else(|| {
                AgriError::schema(format!("{family} schema has no label column"))
            })?,
        };
        let transformer = FittedTransformer::fit(&schema, &train, target_column)?;

        let (train_matrix, _) = transformer.transform_records(&train, false)?;
        let drop_unknown = self.config.unseen_test_category == UnseenCategoryPolicy::DropRow;
        let (test_matrix, dropped_test_rows) = transformer.transform_records(&test, drop_unknown)?;
        if dropped_test_rows > 0 {
            warn!(
                family = %family,
                dropped = dropped_test_rows,
                "dropped test rows with categories unseen in training"
            );
        }

        let transformer_sha256 = self
            .store
            .save(&self.config.transformer_path, &transformer)
            .await?;
        self.store
            .save(&self.config.train_matrix_path, &train_matrix)
            .await?;
        self.store
            .save(&self.config.test_matrix_path, &test_matrix)
            .await?;

        info!(
            family = %family,
            stage = "transformation",
            features = transformer.contract().width(),
            train_rows = train_matrix.n_samples(),
            test_rows = test_matrix.n_samples(),
            fingerprint = %transformer.contract().fingerprint,
            "transformation complete"
        );

        Ok(DataTransformationArtifact {
            family,
            transformer_path: self.config.transformer_path.clone(),
            transformer_sha256,
            train_matrix_path: self.config.train_matrix_path.clone(),
            test_matrix_path: self.config.test_matrix_path.clone(),
            contract: transformer.contract().clone(),
            cleaning,
            train_rows: train_matrix.n_samples(),
            test_rows: test_matrix.n_samples(),
            dropped_test_rows,
        })
    }
}
