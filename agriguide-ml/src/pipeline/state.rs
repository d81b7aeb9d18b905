//! Per-family pipeline state machine.

use crate::data::schema::Family;
use crate::error::AgriError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a family's run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Ingesting,
    Transforming,
    Training,
    /// Model and transformer written; the run is complete.
    Persisted,
    Failed,
}

impl PipelineState {
    /// Forward edges plus `Failed` from every non-terminal state.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Ingesting)
                | (Ingesting, Transforming)
                | (Transforming, Training)
                | (Training, Persisted)
                | (Idle | Ingesting | Transforming | Training, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Persisted | Self::Failed)
    }

    /// Stage being executed in this state.
    pub fn stage(self) -> Option<Stage> {
        match self {
            Self::Ingesting => Some(Stage::Ingestion),
            Self::Transforming => Some(Stage::Transformation),
            Self::Training => Some(Stage::Training),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Ingesting => "ingesting",
            Self::Transforming => "transforming",
            Self::Training => "training",
            Self::Persisted => "persisted",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Pipeline stage, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Setup,
    Ingestion,
    Transformation,
    Training,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: PipelineState,
    pub to: PipelineState,
    pub at: DateTime<Utc>,
}

/// State and transition history of one family's run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyRun {
    pub family: Family,
    pub state: PipelineState,
    pub transitions: Vec<StateTransition>,
}

impl FamilyRun {
    pub fn new(family: Family) -> Self {
        Self {
            family,
            state: PipelineState::Idle,
            transitions: Vec::new(),
        }
    }

    /// Move to `next`, rejecting edges the state machine does not have.
    pub fn transition(&mut self, next: PipelineState) -> Result<(), AgriError> {
        if !self.state.can_transition_to(next) {
            return Err(AgriError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(family = %self.family, from = %self.state, to = %next, "state transition");
        self.transitions.push(StateTransition {
            from: self.state,
            to: next,
            at: Utc::now(),
        });
        self.state = next;
        Ok(())
    }

    /// Mark the run failed and return the stage it failed in.
    pub fn fail(&mut self) -> Stage {
        let stage = self.state.stage().unwrap_or(Stage::Setup);
        if self.state.can_transition_to(PipelineState::Failed) {
            self.transitions.push(StateTransition {
                from: self.state,
                to: PipelineState::Failed,
                at: Utc::now(),
            });
            self.state = PipelineState::Failed;
        }
        stage
    }
}
