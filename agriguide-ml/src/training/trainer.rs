//! Training stage for the crop classifier and the yield regressor, plus the
//! fitting and evaluation steps shared with the fertilizer trainer.

use crate::algorithms::{GaussianNaiveBayes, RandomForest};
use crate::artifact::{DataTransformationArtifact, ModelTrainerArtifact};
use crate::config::{ForestConfig, ModelTrainerConfig};
use crate::data::schema::{Family, TaskType};
use crate::error::AgriError;
use crate::features::matrix::FeatureMatrix;
use crate::features::transformer::FittedTransformer;
use crate::persistence::{ArtifactCodec, ArtifactStore, JsonCodec};
use crate::training::metrics::{ClassificationMetrics, ModelMetrics, RegressionMetrics};
use crate::training::model::{AuxiliaryModel, ModelArtifact};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Features listed in the training artifact.
const TOP_FEATURES: usize = 5;

/// Everything a trainer needs, loaded from the transformation outputs.
pub(crate) struct TrainingInputs {
    pub transformer: FittedTransformer,
    pub train: FeatureMatrix,
    pub test: FeatureMatrix,
}

pub(crate) async fn load_inputs<C: ArtifactCodec>(
    store: &ArtifactStore<C>,
    config: &ModelTrainerConfig,
    transformation: &DataTransformationArtifact,
) -> Result<TrainingInputs, AgriError> {
    if transformation.family != config.family {
        return Err(AgriError::ArtifactMismatch(format!(
            "{} transformation artifact handed to the {} trainer",
            transformation.family, config.family
        )));
    }
    let transformer: FittedTransformer = store.load(&config.transformer_path).await?;
    if transformer.contract().fingerprint != transformation.contract.fingerprint {
        return Err(AgriError::ArtifactMismatch(format!(
            "transformer on disk does not match the {} transformation artifact",
            config.family
        )));
    }
    let train: FeatureMatrix = store.load(&config.train_matrix_path).await?;
    let test: FeatureMatrix = store.load(&config.test_matrix_path).await?;
    for matrix in [&train, &test] {
        if matrix.feature_names != transformer.contract().feature_names {
            return Err(AgriError::ArtifactMismatch(format!(
                "{} feature matrix does not follow the transformer contract",
                config.family
            )));
        }
    }
    if train.is_empty() {
        return Err(AgriError::training(format!(
            "{} training matrix is empty",
            config.family
        )));
    }
    Ok(TrainingInputs {
        transformer,
        train,
        test,
    })
}

/// Fit and evaluate a forest classifier. Needs at least two distinct classes
/// in the training split.
pub(crate) fn fit_classifier(
    family: Family,
    inputs: &TrainingInputs,
    forest_config: &ForestConfig,
) -> Result<(RandomForest, ClassificationMetrics, Vec<String>), AgriError> {
    let labels = inputs
        .transformer
        .label_encoder()
        .ok_or_else(|| AgriError::training(format!("{family} transformer has no label encoder")))?
        .classes()
        .to_vec();
    let train_classes = inputs.train.class_targets()?;
    let distinct: BTreeSet<usize> = train_classes.iter().copied().collect();
    if distinct.len() < 2 {
        return Err(AgriError::training(format!(
            "{family} training split has {} distinct class(es); at least two are required",
            distinct.len()
        )));
    }

    let forest =
        RandomForest::fit_classifier(&inputs.train.rows, &train_classes, labels.len(), forest_config)?;
    let test_classes = inputs.test.class_targets()?;
    let predicted = predict_classes(&forest, &inputs.test)?;
    let metrics = ClassificationMetrics::compute(&test_classes, &predicted, &labels)?;
    if !metrics.missing_test_classes.is_empty() {
        warn!(
            family = %family,
            missing = ?metrics.missing_test_classes,
            "classes absent from the test split"
        );
    }
    Ok((forest, metrics, labels))
}

fn predict_classes(forest: &RandomForest, matrix: &FeatureMatrix) -> Result<Vec<usize>, AgriError> {
    Ok(forest
        .predict_batch(&matrix.rows)?
        .into_iter()
        .map(|p| p as usize)
        .collect())
}

/// Publish the transformer and the model into the serving directory and build
/// the stage artifact. Nothing reaches that directory before a model is fitted.
pub(crate) async fn persist<C: ArtifactCodec>(
    store: &ArtifactStore<C>,
    config: &ModelTrainerConfig,
    transformer: &FittedTransformer,
    model: ModelArtifact,
) -> Result<ModelTrainerArtifact, AgriError> {
    model.check_compatible(transformer)?;
    store
        .save(&config.serving_transformer_path, transformer)
        .await?;
    let model_sha256 = store.save(&config.model_path, &model).await?;
    let (metric, value) = model.metrics.headline();
    let top_features = model
        .top_features(TOP_FEATURES)
        .into_iter()
        .map(|(name, importance)| (name.to_string(), importance))
        .collect();
    info!(
        family = %model.family,
        stage = "training",
        trees = model.forest.n_trees(),
        metric,
        value,
        "model persisted"
    );
    Ok(ModelTrainerArtifact {
        family: model.family,
        transformer_path: config.serving_transformer_path.clone(),
        model_path: config.model_path.clone(),
        model_sha256,
        contract_fingerprint: model.contract_fingerprint,
        metrics: model.metrics,
        auxiliary_metrics: model.auxiliary.map(|a| a.metrics),
        top_features,
    })
}

/// Trainer for the crop classifier and the yield regressor.
pub struct ModelTrainer<C: ArtifactCodec = JsonCodec> {
    config: ModelTrainerConfig,
    store: ArtifactStore<C>,
}

impl ModelTrainer<JsonCodec> {
    pub fn new(config: ModelTrainerConfig) -> Self {
        Self::with_store(config, ArtifactStore::new(JsonCodec))
    }
}

impl<C: ArtifactCodec> ModelTrainer<C> {
    pub fn with_store(config: ModelTrainerConfig, store: ArtifactStore<C>) -> Self {
        Self { config, store }
    }

    pub async fn initiate(
        &self,
        transformation: &DataTransformationArtifact,
    ) -> Result<ModelTrainerArtifact, AgriError> {
        let family = self.config.family;
        if family == Family::Fertilizer {
            return Err(AgriError::config(
                "the fertilizer family is trained by FertilizerTrainer",
            ));
        }
        let inputs = load_inputs(&self.store, &self.config, transformation).await?;
        let forest_config = &self.config.forest;

        let model = match family.task() {
            TaskType::Classification => {
                let (forest, metrics, labels) = fit_classifier(family, &inputs, forest_config)?;
                info!(family = %family, accuracy = metrics.accuracy, "random forest evaluated");
                let auxiliary = if self.config.auxiliary_model {
                    Some(self.fit_auxiliary(&inputs, &labels)?)
                } else {
                    None
                };
                ModelArtifact {
                    family,
                    contract_fingerprint: inputs.transformer.contract().fingerprint.clone(),
                    feature_names: inputs.train.feature_names.clone(),
                    labels,
                    forest_config: forest_config.clone(),
                    forest,
                    metrics: ModelMetrics::Classification(metrics),
                    auxiliary,
                    trained_at: chrono::Utc::now(),
                }
            }
            TaskType::Regression => {
                let forest = RandomForest::fit_regressor(
                    &inputs.train.rows,
                    &inputs.train.targets,
                    forest_config,
                )?;
                let predicted = forest.predict_batch(&inputs.test.rows)?;
                let metrics = RegressionMetrics::compute(&inputs.test.targets, &predicted)?;
                info!(
                    family = %family,
                    r_squared = metrics.r_squared,
                    mae = metrics.mae,
                    "random forest regressor evaluated"
                );
                ModelArtifact {
                    family,
                    contract_fingerprint: inputs.transformer.contract().fingerprint.clone(),
                    feature_names: inputs.train.feature_names.clone(),
                    labels: Vec::new(),
                    forest_config: forest_config.clone(),
                    forest,
                    metrics: ModelMetrics::Regression(metrics),
                    auxiliary: None,
                    trained_at: chrono::Utc::now(),
                }
            }
        };

        persist(&self.store, &self.config, &inputs.transformer, model).await
    }

    fn fit_auxiliary(
        &self,
        inputs: &TrainingInputs,
        labels: &[String],
    ) -> Result<AuxiliaryModel, AgriError> {
        let train_classes = inputs.train.class_targets()?;
        let model = GaussianNaiveBayes::fit(&inputs.train.rows, &train_classes, labels.len())?;
        let predicted = inputs
            .test
            .rows
            .iter()
            .map(|r| model.predict(r))
            .collect::<Result<Vec<_>, _>>()?;
        let metrics =
            ClassificationMetrics::compute(&inputs.test.class_targets()?, &predicted, labels)?;
        info!(family = %self.config.family, accuracy = metrics.accuracy, "naive Bayes evaluated");
        Ok(AuxiliaryModel {
            model,
            metrics: ModelMetrics::Classification(metrics),
        })
    }
}
