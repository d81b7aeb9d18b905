//! Pipeline configuration.
//!
//! Uses `figment` for layered configuration: defaults -> `agriguide.toml` ->
//! environment -> explicit overrides. Per-stage configs are derived from the
//! validated [`PipelineConfig`] and the artifact of the previous stage.

use crate::artifact::{DataIngestionArtifact, DataTransformationArtifact};
use crate::data::schema::Family;
use crate::error::AgriError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Name of the workspace config file.
pub const CONFIG_FILE: &str = "agriguide.toml";

/// What a run does after one family fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop; families not yet started are reported as skipped.
    #[default]
    Halt,
    /// Keep training the remaining families.
    Continue,
}

/// Handling of test-split categories that never appeared in training.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnseenCategoryPolicy {
    /// Fail the transformation stage with an unknown-category error.
    #[default]
    Fail,
    /// Drop the row from the test matrix and count it.
    DropRow,
}

/// Number of candidate features tried at each split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    #[default]
    Sqrt,
    Log2,
    All,
}

impl MaxFeatures {
    /// Resolve against the feature count, rounding down; always at least one.
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = match self {
            Self::Sqrt => (n_features as f64).sqrt().floor() as usize,
            Self::Log2 => (n_features as f64).log2().floor() as usize,
            Self::All => n_features,
        };
        n.clamp(1, n_features.max(1))
    }
}

/// Random-forest hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    #[serde(default)]
    pub max_features: MaxFeatures,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl ForestConfig {
    fn new(n_trees: usize, max_depth: usize, min_samples_split: usize, min_samples_leaf: usize) -> Self {
        Self {
            n_trees,
            max_depth,
            min_samples_split,
            min_samples_leaf,
            max_features: MaxFeatures::Sqrt,
            seed: default_seed(),
        }
    }

    fn validate(&self, family: Family) -> Result<(), AgriError> {
        if self.n_trees == 0 {
            return Err(AgriError::config(format!("{family}: n_trees must be at least 1")));
        }
        if self.max_depth == 0 {
            return Err(AgriError::config(format!("{family}: max_depth must be at least 1")));
        }
        if self.min_samples_split < 2 {
            return Err(AgriError::config(format!(
                "{family}: min_samples_split must be at least 2"
            )));
        }
        if self.min_samples_leaf == 0 {
            return Err(AgriError::config(format!(
                "{family}: min_samples_leaf must be at least 1"
            )));
        }
        Ok(())
    }
}

/// Settings for one model family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyConfig {
    /// Source CSV.
    pub source: PathBuf,
    /// Accept source columns outside the schema.
    #[serde(default)]
    pub allow_extra_columns: bool,
    /// Also train the Gaussian naive Bayes companion model.
    #[serde(default)]
    pub auxiliary_model: bool,
    pub forest: ForestConfig,
}

/// Train/test split settings shared by all families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    #[serde(default = "default_test_ratio")]
    pub test_ratio: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_ratio: default_test_ratio(),
            seed: default_seed(),
        }
    }
}

/// Outlier handling applied on the training split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// IQR-clip the crop family's numeric inputs.
    #[serde(default = "default_true")]
    pub clip_outliers: bool,
    #[serde(default = "default_iqr_multiplier")]
    pub iqr_multiplier: f64,
    /// Upper quantile of the derived yield kept in training.
    #[serde(default = "default_yield_quantile_cap")]
    pub yield_quantile_cap: f64,
    /// Hard ceiling on yield, tonnes per hectare.
    #[serde(default = "default_max_reasonable_yield")]
    pub max_reasonable_yield: f64,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            clip_outliers: true,
            iqr_multiplier: default_iqr_multiplier(),
            yield_quantile_cap: default_yield_quantile_cap(),
            max_reasonable_yield: default_max_reasonable_yield(),
        }
    }
}

/// Top-level configuration of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Intermediate artifacts and the run report.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    /// Transformer and model artifacts loaded at inference time.
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    /// Families to train, in order.
    #[serde(default = "default_families")]
    pub families: Vec<Family>,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Run families as separate tasks.
    #[serde(default)]
    pub concurrent: bool,
    #[serde(default)]
    pub unseen_test_category: UnseenCategoryPolicy,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub cleaning: CleaningConfig,
    #[serde(default = "default_crop")]
    pub crop: FamilyConfig,
    #[serde(default = "default_yield")]
    pub r#yield: FamilyConfig,
    #[serde(default = "default_fertilizer")]
    pub fertilizer: FamilyConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            model_dir: default_model_dir(),
            families: default_families(),
            failure_policy: FailurePolicy::default(),
            concurrent: false,
            unseen_test_category: UnseenCategoryPolicy::default(),
            split: SplitConfig::default(),
            cleaning: CleaningConfig::default(),
            crop: default_crop(),
            r#yield: default_yield(),
            fertilizer: default_fertilizer(),
        }
    }
}

impl PipelineConfig {
    pub fn family(&self, family: Family) -> &FamilyConfig {
        match family {
            Family::Crop => &self.crop,
            Family::Yield => &self.r#yield,
            Family::Fertilizer => &self.fertilizer,
        }
    }

    pub fn family_artifact_dir(&self, family: Family) -> PathBuf {
        self.artifact_dir.join(family.as_str())
    }

    pub fn family_model_dir(&self, family: Family) -> PathBuf {
        self.model_dir.join(family.as_str())
    }

    /// Serving transformer, published next to the model once training succeeds.
    pub fn transformer_path(&self, family: Family) -> PathBuf {
        self.family_model_dir(family).join("transformer.json")
    }

    /// Transformer as fitted by the transformation stage, before training.
    pub fn staged_transformer_path(&self, family: Family) -> PathBuf {
        self.family_artifact_dir(family)
            .join("transformation")
            .join("transformer.json")
    }

    pub fn model_path(&self, family: Family) -> PathBuf {
        self.family_model_dir(family).join("model.json")
    }

    pub fn report_path(&self) -> PathBuf {
        self.artifact_dir.join("pipeline_report.json")
    }

    /// Anchor every relative path at `root`.
    pub fn resolve_paths(&mut self, root: &Path) {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = root.join(&*p);
            }
        };
        anchor(&mut self.artifact_dir);
        anchor(&mut self.model_dir);
        anchor(&mut self.crop.source);
        anchor(&mut self.r#yield.source);
        anchor(&mut self.fertilizer.source);
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<(), AgriError> {
        if self.families.is_empty() {
            return Err(AgriError::config("at least one family must be selected"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.families.iter().find(|f| !seen.insert(**f)) {
            return Err(AgriError::config(format!("family '{dup}' is listed twice")));
        }
        let ratio = self.split.test_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(AgriError::config(format!(
                "test_ratio must be strictly between 0 and 1, got {ratio}"
            )));
        }
        let cleaning = &self.cleaning;
        if !(cleaning.iqr_multiplier > 0.0 && cleaning.iqr_multiplier.is_finite()) {
            return Err(AgriError::config("iqr_multiplier must be positive"));
        }
        if !(cleaning.yield_quantile_cap > 0.0 && cleaning.yield_quantile_cap <= 1.0) {
            return Err(AgriError::config("yield_quantile_cap must be in (0, 1]"));
        }
        if !(cleaning.max_reasonable_yield > 0.0) {
            return Err(AgriError::config("max_reasonable_yield must be positive"));
        }
        if self.artifact_dir.as_os_str().is_empty() || self.model_dir.as_os_str().is_empty() {
            return Err(AgriError::config("artifact_dir and model_dir must be set"));
        }
        for family in Family::ALL {
            let fc = self.family(family);
            if fc.source.as_os_str().is_empty() {
                return Err(AgriError::config(format!("{family}: source path is empty")));
            }
            fc.forest.validate(family)?;
        }
        Ok(())
    }
}

/// Explicit overrides, typically from command-line flags. Unset fields leave
/// the lower layers untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub families: Option<Vec<Family>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_policy: Option<FailurePolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrent: Option<bool>,
}

/// Load configuration from layered sources and validate it.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides
/// 2. Environment variables (`AGRIGUIDE_SPLIT__SEED`, `AGRIGUIDE_CROP__FOREST__N_TREES`, ...)
/// 3. `<workspace>/agriguide.toml`
/// 4. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<PipelineConfig, AgriError> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(ws) = workspace {
        let ws_config = ws.join(CONFIG_FILE);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    figment = figment.merge(Env::prefixed("AGRIGUIDE_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: PipelineConfig = figment
        .extract()
        .map_err(|e| AgriError::config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Inputs of the ingestion stage for one family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataIngestionConfig {
    pub family: Family,
    pub source_path: PathBuf,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub test_ratio: f64,
    pub seed: u64,
    pub allow_extra_columns: bool,
}

impl DataIngestionConfig {
    pub fn new(config: &PipelineConfig, family: Family) -> Self {
        let dir = config.family_artifact_dir(family).join("ingestion");
        let fc = config.family(family);
        Self {
            family,
            source_path: fc.source.clone(),
            train_path: dir.join("train.csv"),
            test_path: dir.join("test.csv"),
            test_ratio: config.split.test_ratio,
            seed: config.split.seed,
            allow_extra_columns: fc.allow_extra_columns,
        }
    }
}

/// Inputs of the transformation stage, wired from the ingestion artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTransformationConfig {
    pub family: Family,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub train_matrix_path: PathBuf,
    pub test_matrix_path: PathBuf,
    pub transformer_path: PathBuf,
    pub cleaning: CleaningConfig,
    pub unseen_test_category: UnseenCategoryPolicy,
}

impl DataTransformationConfig {
    pub fn new(config: &PipelineConfig, ingestion: &DataIngestionArtifact) -> Self {
        let family = ingestion.family;
        let dir = config.family_artifact_dir(family).join("transformation");
        Self {
            family,
            train_path: ingestion.train_path.clone(),
            test_path: ingestion.test_path.clone(),
            train_matrix_path: dir.join("train_matrix.json"),
            test_matrix_path: dir.join("test_matrix.json"),
            transformer_path: config.staged_transformer_path(family),
            cleaning: config.cleaning.clone(),
            unseen_test_category: config.unseen_test_category,
        }
    }
}

/// Inputs of the training stage, wired from the transformation artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTrainerConfig {
    pub family: Family,
    pub train_matrix_path: PathBuf,
    pub test_matrix_path: PathBuf,
    /// Staged transformer written by the transformation stage.
    pub transformer_path: PathBuf,
    /// Where the transformer is published alongside the model.
    pub serving_transformer_path: PathBuf,
    pub model_path: PathBuf,
    pub forest: ForestConfig,
    pub auxiliary_model: bool,
}

impl ModelTrainerConfig {
    pub fn new(config: &PipelineConfig, transformation: &DataTransformationArtifact) -> Self {
        let family = transformation.family;
        let fc = config.family(family);
        Self {
            family,
            train_matrix_path: transformation.train_matrix_path.clone(),
            test_matrix_path: transformation.test_matrix_path.clone(),
            transformer_path: transformation.transformer_path.clone(),
            serving_transformer_path: config.transformer_path(family),
            model_path: config.model_path(family),
            forest: fc.forest.clone(),
            auxiliary_model: fc.auxiliary_model,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_seed() -> u64 {
    42
}

fn default_test_ratio() -> f64 {
    0.2
}

fn default_iqr_multiplier() -> f64 {
    1.5
}

fn default_yield_quantile_cap() -> f64 {
    0.995
}

fn default_max_reasonable_yield() -> f64 {
    20.0
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_families() -> Vec<Family> {
    Family::ALL.to_vec()
}

fn default_crop() -> FamilyConfig {
    FamilyConfig {
        source: PathBuf::from("raw_data/Crop_recommendation.csv"),
        allow_extra_columns: false,
        auxiliary_model: true,
        forest: ForestConfig::new(100, 20, 2, 1),
    }
}

fn default_yield() -> FamilyConfig {
    FamilyConfig {
        source: PathBuf::from("raw_data/crop_production.csv"),
        allow_extra_columns: false,
        auxiliary_model: false,
        forest: ForestConfig::new(50, 15, 2, 1),
    }
}

fn default_fertilizer() -> FamilyConfig {
    FamilyConfig {
        source: PathBuf::from("raw_data/Fertilizer_Prediction.csv"),
        allow_extra_columns: false,
        auxiliary_model: false,
        forest: ForestConfig::new(100, 10, 5, 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.families, Family::ALL.to_vec());
        assert_eq!(config.crop.forest.n_trees, 100);
        assert_eq!(config.r#yield.forest.max_depth, 15);
        assert_eq!(config.fertilizer.forest.min_samples_leaf, 2);
        assert_eq!(config.unseen_test_category, UnseenCategoryPolicy::Fail);
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        let mut config = PipelineConfig::default();
        config.split.test_ratio = 1.0;
        assert!(matches!(config.validate(), Err(AgriError::Config(_))));
        config.split.test_ratio = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_trees_rejected() {
        let mut config = PipelineConfig::default();
        config.fertilizer.forest.n_trees = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fertilizer"));
    }

    #[test]
    fn test_duplicate_family_rejected() {
        let config = PipelineConfig {
            families: vec![Family::Crop, Family::Crop],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_workspace_toml() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
failure_policy = "continue"
families = ["yield"]

[split]
seed = 7

[yield.forest]
n_trees = 5
max_depth = 4
min_samples_split = 2
min_samples_leaf = 1
"#,
        )
        .unwrap();
        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.families, vec![Family::Yield]);
        assert_eq!(config.split.seed, 7);
        assert_eq!(config.split.test_ratio, 0.2);
        assert_eq!(config.r#yield.forest.n_trees, 5);
        assert_eq!(config.crop.forest.n_trees, 100);
    }

    #[test]
    fn test_overrides_win() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "concurrent = false\n").unwrap();
        let overrides = ConfigOverrides {
            concurrent: Some(true),
            families: Some(vec![Family::Fertilizer]),
            ..Default::default()
        };
        let config = load_config(Some(dir.path()), Some(&overrides)).unwrap();
        assert!(config.concurrent);
        assert_eq!(config.families, vec![Family::Fertilizer]);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[split]\ntest_ratio = 2.5\n").unwrap();
        assert!(matches!(
            load_config(Some(dir.path()), None),
            Err(AgriError::Config(_))
        ));
    }

    #[test]
    fn test_max_features_resolve() {
        assert_eq!(MaxFeatures::Sqrt.resolve(12), 3);
        assert_eq!(MaxFeatures::Sqrt.resolve(80), 8);
        assert_eq!(MaxFeatures::Log2.resolve(12), 3);
        assert_eq!(MaxFeatures::All.resolve(7), 7);
        assert_eq!(MaxFeatures::Log2.resolve(1), 1);
        assert_eq!(MaxFeatures::Sqrt.resolve(0), 1);
    }

    #[test]
    fn test_stage_paths_are_per_family() {
        let config = PipelineConfig::default();
        let crop = DataIngestionConfig::new(&config, Family::Crop);
        let yld = DataIngestionConfig::new(&config, Family::Yield);
        assert_ne!(crop.train_path, yld.train_path);
        assert!(crop.train_path.ends_with("crop/ingestion/train.csv"));
        assert!(config.model_path(Family::Yield).ends_with("yield/model.json"));
        assert!(
            config
                .staged_transformer_path(Family::Yield)
                .starts_with(config.family_artifact_dir(Family::Yield))
        );
        assert_ne!(
            config.staged_transformer_path(Family::Crop),
            config.transformer_path(Family::Crop)
        );
    }

    #[test]
    fn test_resolve_paths_keeps_absolute() {
        let mut config = PipelineConfig::default();
        config.model_dir = PathBuf::from("/srv/models");
        config.resolve_paths(Path::new("/work"));
        assert_eq!(config.model_dir, PathBuf::from("/srv/models"));
        assert_eq!(config.artifact_dir, PathBuf::from("/work/artifacts"));
        assert!(config.crop.source.starts_with("/work/raw_data"));
    }
}
