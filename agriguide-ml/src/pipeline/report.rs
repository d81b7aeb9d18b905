//! Run report: per-family outcome of one training run.

use crate::artifact::{DataIngestionArtifact, DataTransformationArtifact, ModelTrainerArtifact};
use crate::config::FailurePolicy;
use crate::data::schema::Family;
use crate::error::{AgriError, ErrorKind};
use crate::pipeline::state::{FamilyRun, PipelineState, Stage, StateTransition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a family did not finish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

impl FailureRecord {
    pub fn new(stage: Stage, error: &AgriError) -> Self {
        Self {
            stage,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FamilyStatus {
    Succeeded,
    Failed,
    /// Not run because an earlier family failed under `Halt`.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyReport {
    pub family: Family,
    pub status: FamilyStatus,
    pub state: PipelineState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion: Option<DataIngestionArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<DataTransformationArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub training: Option<ModelTrainerArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
    #[serde(default)]
    pub transitions: Vec<StateTransition>,
}

impl FamilyReport {
    pub fn skipped(family: Family) -> Self {
        Self {
            family,
            status: FamilyStatus::Skipped,
            state: PipelineState::Idle,
            ingestion: None,
            transformation: None,
            training: None,
            failure: None,
            transitions: Vec::new(),
        }
    }

    /// Report for a run that stopped in a terminal state.
    pub fn from_run(run: FamilyRun, failure: Option<FailureRecord>) -> Self {
        let status = if failure.is_some() {
            FamilyStatus::Failed
        } else {
            FamilyStatus::Succeeded
        };
        Self {
            family: run.family,
            status,
            state: run.state,
            ingestion: None,
            transformation: None,
            training: None,
            failure,
            transitions: run.transitions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub failure_policy: FailurePolicy,
    pub concurrent: bool,
    pub families: Vec<FamilyReport>,
}

impl PipelineReport {
    pub fn family(&self, family: Family) -> Option<&FamilyReport> {
        self.families.iter().find(|r| r.family == family)
    }

    fn count(&self, status: FamilyStatus) -> usize {
        self.families.iter().filter(|r| r.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(FamilyStatus::Succeeded)
    }

    pub fn failed(&self) -> usize {
        self.count(FamilyStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(FamilyStatus::Skipped)
    }

    /// True when no requested family produced a model.
    pub fn all_failed(&self) -> bool {
        self.succeeded() == 0
    }

    /// Some families succeeded and some did not.
    pub fn is_partial(&self) -> bool {
        self.succeeded() > 0 && self.succeeded() < self.families.len()
    }
}
