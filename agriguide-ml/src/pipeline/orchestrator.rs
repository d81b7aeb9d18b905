//! Sequences the stages of every selected family and collects the outcome.

use crate::config::{
    DataIngestionConfig, DataTransformationConfig, FailurePolicy, ModelTrainerConfig,
    PipelineConfig,
};
use crate::data::ingestion::DataIngestion;
use crate::data::schema::Family;
use crate::error::AgriError;
use crate::features::transformation::DataTransformation;
use crate::persistence::{ArtifactStore, JsonCodec};
use crate::pipeline::report::{FailureRecord, FamilyReport, FamilyStatus, PipelineReport};
use crate::pipeline::state::{FamilyRun, PipelineState};
use crate::training::{FertilizerTrainer, ModelTrainer};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Runs the training pipeline described by a validated config.
pub struct TrainingPipeline {
    config: Arc<PipelineConfig>,
    store: ArtifactStore<JsonCodec>,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, AgriError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            store: ArtifactStore::new(JsonCodec),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Train every selected family and persist the run report.
    ///
    /// Family failures are recorded in the report; only failing to write the
    /// report itself is returned as an error.
    pub async fn run(&self) -> Result<PipelineReport, AgriError> {
        let run_id = Uuid::new_v4();
        let started_at = chrono::Utc::now();
        info!(
            %run_id,
            families = ?self.config.families,
            policy = ?self.config.failure_policy,
            concurrent = self.config.concurrent,
            "training run started"
        );

        let families = if self.config.concurrent {
            self.run_concurrent().await
        } else {
            self.run_sequential().await
        };

        let report = PipelineReport {
            run_id,
            started_at,
            finished_at: chrono::Utc::now(),
            failure_policy: self.config.failure_policy,
            concurrent: self.config.concurrent,
            families,
        };
        self.store.save(&self.config.report_path(), &report).await?;
        info!(
            %run_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            "training run finished"
        );
        Ok(report)
    }

    async fn run_sequential(&self) -> Vec<FamilyReport> {
        let mut reports = Vec::with_capacity(self.config.families.len());
        let mut halted = false;
        for &family in &self.config.families {
            if halted {
                warn!(family = %family, "skipped after an earlier failure");
                reports.push(FamilyReport::skipped(family));
                continue;
            }
            let report = run_family(&self.config, family).await;
            halted = report.status == FamilyStatus::Failed
                && self.config.failure_policy == FailurePolicy::Halt;
            reports.push(report);
        }
        reports
    }

    /// One task per family. Under `Halt`, the first failure aborts the tasks
    /// still running and they are reported as skipped.
    async fn run_concurrent(&self) -> Vec<FamilyReport> {
        let mut tasks = JoinSet::new();
        let mut task_families = HashMap::new();
        for &family in &self.config.families {
            let config = Arc::clone(&self.config);
            let handle = tasks.spawn(async move { run_family(&config, family).await });
            task_families.insert(handle.id(), family);
        }

        let mut finished: HashMap<Family, FamilyReport> = HashMap::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let report = match joined {
                Ok((_, report)) => report,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => match task_families.get(&e.id()) {
                    Some(&family) => panicked(family, e),
                    None => {
                        error!(error = %e, "unknown task panicked");
                        continue;
                    }
                },
            };
            let halt = report.status == FamilyStatus::Failed
                && self.config.failure_policy == FailurePolicy::Halt;
            finished.insert(report.family, report);
            if halt {
                tasks.abort_all();
            }
        }

        self.config
            .families
            .iter()
            .map(|f| finished.remove(f).unwrap_or_else(|| FamilyReport::skipped(*f)))
            .collect()
    }
}

/// Failed report for a family whose task panicked. The stage it was in is
/// lost with the task, so the failure is attributed to setup.
fn panicked(family: Family, e: JoinError) -> FamilyReport {
    let mut run = FamilyRun::new(family);
    let stage = run.fail();
    let err = AgriError::from(e);
    error!(family = %family, error = %err, "family task panicked");
    FamilyReport::from_run(run, Some(FailureRecord::new(stage, &err)))
}

/// Run all stages of one family. Never fails: errors end up in the report.
async fn run_family(config: &PipelineConfig, family: Family) -> FamilyReport {
    let mut run = FamilyRun::new(family);
    let mut partial = FamilyReport::skipped(family);
    let outcome = execute(config, &mut run, &mut partial).await;

    let failure = match outcome {
        Ok(()) => None,
        Err(e) => {
            let stage = run.fail();
            error!(family = %family, ?stage, kind = ?e.kind(), error = %e, "family failed");
            Some(FailureRecord::new(stage, &e))
        }
    };
    FamilyReport {
        ingestion: partial.ingestion,
        transformation: partial.transformation,
        training: partial.training,
        ..FamilyReport::from_run(run, failure)
    }
}

async fn execute(
    config: &PipelineConfig,
    run: &mut FamilyRun,
    report: &mut FamilyReport,
) -> Result<(), AgriError> {
    let family = run.family;

    run.transition(PipelineState::Ingesting)?;
    let ingestion = DataIngestion::new(DataIngestionConfig::new(config, family))
        .initiate()
        .await?;
    report.ingestion = Some(ingestion.clone());

    run.transition(PipelineState::Transforming)?;
    let transformation = DataTransformation::new(DataTransformationConfig::new(config, &ingestion))
        .initiate(&ingestion)
        .await?;
    report.transformation = Some(transformation.clone());

    run.transition(PipelineState::Training)?;
    let trainer_config = ModelTrainerConfig::new(config, &transformation);
    let training = match family {
        Family::Fertilizer => {
            FertilizerTrainer::new(trainer_config)
                .initiate(&transformation)
                .await?
        }
        Family::Crop | Family::Yield => {
            ModelTrainer::new(trainer_config)
                .initiate(&transformation)
                .await?
        }
    };
    report.training = Some(training);

    run.transition(PipelineState::Persisted)?;
    info!(family = %family, "family complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pipeline::state::Stage;

    #[tokio::test]
    async fn test_panicked_task_is_reported_failed() {
        let err = tokio::spawn(async { panic!("split exploded") })
            .await
            .unwrap_err();
        let report = panicked(Family::Yield, err);
        assert_eq!(report.status, FamilyStatus::Failed);
        assert_eq!(report.state, PipelineState::Failed);
        let failure = report.failure.unwrap();
        assert_eq!(failure.stage, Stage::Setup);
        assert_eq!(failure.kind, ErrorKind::Io);
        assert!(failure.message.contains("panic"));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_up_front() {
        let mut config = PipelineConfig::default();
        config.families.clear();
        assert!(TrainingPipeline::new(config).is_err());
    }
}
