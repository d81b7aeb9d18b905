//! Model training: trainers, persisted model artifacts and metrics.

pub mod fertilizer;
pub mod metrics;
pub mod model;
pub mod trainer;

pub use fertilizer::FertilizerTrainer;
pub use metrics::{ClassReport, ClassificationMetrics, ModelMetrics, RegressionMetrics};
pub use model::{AuxiliaryModel, ModelArtifact};
pub use trainer::ModelTrainer;
