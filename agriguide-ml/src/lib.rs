//! # agriguide-ml: training pipeline and inference for AgriGuide
//!
//! Turns raw agricultural CSV data into three independent models:
//! a crop classifier, a yield regressor and a fertilizer classifier.
//!
//! ## Stages
//!
//! Each family runs through the same sequence, orchestrated by
//! [`TrainingPipeline`]:
//! 1. **Ingestion**: schema validation, row filtering, seeded train/test split
//! 2. **Transformation**: cleaning, categorical encoding, standard scaling,
//!    fitted on the training split only and frozen into a [`FittedTransformer`]
//! 3. **Training**: random forest fit and held-out evaluation
//! 4. **Persistence**: transformer and model written atomically as JSON
//!
//! At serving time an [`InferenceContext`] loads the persisted pairs once and
//! replays the frozen feature contract for every prediction.

// Foundation
pub mod config;
pub mod error;
pub mod persistence;

// Stages
pub mod artifact;
pub mod data;
pub mod features;
pub mod training;

// Estimators
pub mod algorithms;

// Orchestration & serving
pub mod inference;
pub mod pipeline;

// Re-exports
pub use config::{FailurePolicy, PipelineConfig, load_config};
pub use data::schema::{Family, RawRecord, RawValue, TaskType};
pub use error::{AgriError, ErrorKind};
pub use features::transformer::{FeatureContract, FittedTransformer};
pub use inference::{CropInput, FertilizerInput, InferenceContext, YieldInput};
pub use pipeline::{PipelineReport, TrainingPipeline};
