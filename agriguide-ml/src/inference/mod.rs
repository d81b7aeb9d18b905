//! Serving-time predictions from persisted artifacts.
//!
//! An [`InferenceContext`] is loaded once and then only read, so it can be
//! wrapped in an `Arc` and shared by any number of concurrent requests.

pub mod advice;
pub mod input;

pub use advice::{Level, SoilAdvice, soil_advice};
pub use input::{CropInput, FertilizerInput, YieldInput};

use crate::config::PipelineConfig;
use crate::data::schema::{Family, RawRecord, TaskType};
use crate::error::{AgriError, ErrorKind};
use crate::features::transformer::FittedTransformer;
use crate::persistence::{ArtifactStore, JsonCodec};
use crate::training::model::ModelArtifact;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// A transformer and the model trained against it.
#[derive(Debug, Clone)]
pub struct FamilyPredictor {
    transformer: FittedTransformer,
    model: ModelArtifact,
}

impl FamilyPredictor {
    /// Pair a transformer with a model, rejecting pairs from different runs.
    pub fn new(transformer: FittedTransformer, model: ModelArtifact) -> Result<Self, AgriError> {
        model.check_compatible(&transformer)?;
        Ok(Self { transformer, model })
    }

    pub fn family(&self) -> Family {
        self.model.family
    }

    pub fn transformer(&self) -> &FittedTransformer {
        &self.transformer
    }

    pub fn model(&self) -> &ModelArtifact {
        &self.model
    }

    pub fn transform(&self, record: &RawRecord) -> Result<Vec<f64>, AgriError> {
        self.transformer.transform_input(record)
    }

    pub fn predict(&self, features: &[f64]) -> Result<f64, AgriError> {
        self.model.forest.predict(features)
    }

    /// Most probable class and its probability.
    fn classify(&self, record: &RawRecord) -> Result<(String, f64), AgriError> {
        let features = self.transform(record)?;
        let proba = self.model.forest.predict_proba(&features)?;
        let (code, p) = proba
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, p)| if p > best.1 { (i, p) } else { best });
        let label = self.model.labels.get(code).cloned().ok_or_else(|| {
            AgriError::ArtifactMismatch(format!(
                "{} model predicted class {code} outside its {} labels",
                self.family(),
                self.model.labels.len()
            ))
        })?;
        Ok((label, p))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropPrediction {
    pub crop: String,
    /// Percent, two decimals.
    pub confidence: f64,
    pub soil_advice: SoilAdvice,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldPrediction {
    pub yield_per_hectare: f64,
    pub total_yield: f64,
    pub area: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FertilizerPrediction {
    pub fertilizer: String,
    pub confidence: f64,
    pub soil_advice: SoilAdvice,
}

/// Known values of each categorical input, for selection lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryOptions {
    pub states: Vec<String>,
    pub seasons: Vec<String>,
    pub crops: Vec<String>,
    pub soil_types: Vec<String>,
    pub crop_types: Vec<String>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Loaded predictors for every family that has artifacts on disk.
#[derive(Debug, Clone, Default)]
pub struct InferenceContext {
    crop: Option<FamilyPredictor>,
    r#yield: Option<FamilyPredictor>,
    fertilizer: Option<FamilyPredictor>,
    /// Families whose artifacts were present but unusable, with the reason.
    rejected: BTreeMap<Family, String>,
}

impl InferenceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the transformer and model of each family from the config's model
    /// directory.
    ///
    /// Families are independent: one with no artifacts is reported as
    /// `NotFound` when used, and one whose artifacts are corrupt or do not
    /// belong together is reported as `ArtifactMismatch` when used. Neither
    /// keeps the other families from loading. I/O failures are returned.
    pub async fn load(config: &PipelineConfig) -> Result<Self, AgriError> {
        let store = ArtifactStore::new(JsonCodec);
        let mut context = Self::new();
        for family in Family::ALL {
            let transformer_path = config.transformer_path(family);
            let model_path = config.model_path(family);
            if !transformer_path.exists() || !model_path.exists() {
                warn!(family = %family, dir = %config.family_model_dir(family).display(), "no trained artifacts");
                continue;
            }
            match load_predictor(&store, &transformer_path, &model_path).await {
                Ok(predictor) => {
                    context = context.with_predictor(predictor);
                    info!(family = %family, "predictor loaded");
                }
                Err(e) if e.kind() == ErrorKind::Artifact => {
                    warn!(family = %family, error = %e, "artifacts rejected");
                    context.rejected.insert(family, e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(context)
    }

    pub fn with_predictor(mut self, predictor: FamilyPredictor) -> Self {
        let slot = match predictor.family() {
            Family::Crop => &mut self.crop,
            Family::Yield => &mut self.r#yield,
            Family::Fertilizer => &mut self.fertilizer,
        };
        self.rejected.remove(&predictor.family());
        *slot = Some(predictor);
        self
    }

    pub fn predictor(&self, family: Family) -> Result<&FamilyPredictor, AgriError> {
        let slot = match family {
            Family::Crop => &self.crop,
            Family::Yield => &self.r#yield,
            Family::Fertilizer => &self.fertilizer,
        };
        slot.as_ref().ok_or_else(|| match self.rejected.get(&family) {
            Some(reason) => AgriError::ArtifactMismatch(reason.clone()),
            None => AgriError::not_found(format!("no trained {family} model is loaded")),
        })
    }

    /// Families whose artifacts were found but could not be served.
    pub fn rejected(&self) -> Vec<Family> {
        self.rejected.keys().copied().collect()
    }

    pub fn available(&self) -> Vec<Family> {
        Family::ALL
            .into_iter()
            .filter(|f| self.predictor(*f).is_ok())
            .collect()
    }

    pub fn predict_crop(&self, input: &CropInput) -> Result<CropPrediction, AgriError> {
        input.validate()?;
        let predictor = self.predictor(Family::Crop)?;
        let (crop, p) = predictor.classify(&input.to_record())?;
        Ok(CropPrediction {
            crop,
            confidence: round2(p * 100.0),
            soil_advice: soil_advice(input.nitrogen, input.phosphorus, input.potassium, input.ph),
        })
    }

    pub fn predict_yield(&self, input: &YieldInput) -> Result<YieldPrediction, AgriError> {
        input.validate()?;
        let predictor = self.predictor(Family::Yield)?;
        if predictor.model.forest.task() != TaskType::Regression {
            return Err(AgriError::ArtifactMismatch(
                "yield model is not a regressor".into(),
            ));
        }
        let features = predictor.transform(&input.to_record())?;
        let per_hectare = predictor.predict(&features)?;
        Ok(YieldPrediction {
            yield_per_hectare: round2(per_hectare),
            total_yield: round2(per_hectare * input.area),
            area: input.area,
        })
    }

    pub fn predict_fertilizer(
        &self,
        input: &FertilizerInput,
    ) -> Result<FertilizerPrediction, AgriError> {
        input.validate()?;
        let predictor = self.predictor(Family::Fertilizer)?;
        let (fertilizer, p) = predictor.classify(&input.to_record())?;
        Ok(FertilizerPrediction {
            fertilizer,
            confidence: round2(p * 100.0),
            soil_advice: soil_advice(
                input.nitrogen,
                input.phosphorous,
                input.potassium,
                advice::NEUTRAL_PH,
            ),
        })
    }

    /// Categories the `family` transformer was fitted on for `column`.
    pub fn categories(&self, family: Family, column: &str) -> Result<&[String], AgriError> {
        self.predictor(family)?
            .transformer
            .categories(column)
            .ok_or_else(|| {
                AgriError::invalid_input(format!("{family} has no categorical column '{column}'"))
            })
    }

    /// Every known category; lists of unloaded families are empty.
    pub fn category_options(&self) -> CategoryOptions {
        let list = |family, column| {
            self.categories(family, column)
                .map(<[String]>::to_vec)
                .unwrap_or_default()
        };
        CategoryOptions {
            states: list(Family::Yield, "State_Name"),
            seasons: list(Family::Yield, "Season"),
            crops: list(Family::Yield, "Crop"),
            soil_types: list(Family::Fertilizer, "Soil Type"),
            crop_types: list(Family::Fertilizer, "Crop Type"),
        }
    }
}

async fn load_predictor(
    store: &ArtifactStore<JsonCodec>,
    transformer_path: &std::path::Path,
    model_path: &std::path::Path,
) -> Result<FamilyPredictor, AgriError> {
    let transformer: FittedTransformer = store.load(transformer_path).await?;
    let model: ModelArtifact = store.load(model_path).await?;
    FamilyPredictor::new(transformer, model)
}
