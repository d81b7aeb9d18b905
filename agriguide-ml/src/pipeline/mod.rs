//! Training-run orchestration.

pub mod orchestrator;
pub mod report;
pub mod state;

pub use orchestrator::TrainingPipeline;
pub use report::{FailureRecord, FamilyReport, FamilyStatus, PipelineReport};
pub use state::{FamilyRun, PipelineState, Stage};
