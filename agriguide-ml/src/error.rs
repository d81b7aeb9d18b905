//! Error types for the agriguide-ml crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for pipeline and inference operations.
#[derive(Debug, Error)]
pub enum AgriError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    #[error("Transformation error: {0}")]
    Transformation(String),

    #[error("Transformation error: unknown category '{value}' in column '{column}'")]
    UnknownCategory { column: String, value: String },

    #[error("Training error: {0}")]
    Training(String),

    #[error("Artifact mismatch: {0}")]
    ArtifactMismatch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid pipeline transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Task error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Coarse classification of an [`AgriError`], used in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Schema,
    EmptyDataset,
    Transformation,
    Training,
    Artifact,
    Config,
    InvalidInput,
    Pipeline,
    Io,
}

impl AgriError {
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn empty_dataset(msg: impl Into<String>) -> Self {
        Self::EmptyDataset(msg.into())
    }

    pub fn transformation(msg: impl Into<String>) -> Self {
        Self::Transformation(msg.into())
    }

    pub fn unknown_category(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::UnknownCategory {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema(_) => ErrorKind::Schema,
            Self::EmptyDataset(_) => ErrorKind::EmptyDataset,
            Self::Transformation(_) | Self::UnknownCategory { .. } => ErrorKind::Transformation,
            Self::Training(_) => ErrorKind::Training,
            Self::ArtifactMismatch(_) | Self::NotFound(_) | Self::Serde(_) => ErrorKind::Artifact,
            Self::Config(_) => ErrorKind::Config,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InvalidTransition { .. } => ErrorKind::Pipeline,
            Self::Io(_) | Self::Csv(_) | Self::Join(_) => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_category_is_a_transformation_error() {
        let err = AgriError::unknown_category("Soil Type", "Volcanic");
        assert_eq!(err.kind(), ErrorKind::Transformation);
        assert!(err.to_string().contains("Volcanic"));
        assert!(err.to_string().starts_with("Transformation error"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::EmptyDataset).unwrap();
        assert_eq!(json, "\"empty_dataset\"");
    }
}
