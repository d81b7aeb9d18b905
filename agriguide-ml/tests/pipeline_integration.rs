//! End-to-end tests of the training pipeline and the inference context.
//!
//! Every test builds small synthetic CSV sources in a temp directory and runs
//! the real stages against them.

use agriguide_ml::config::{PipelineConfig, UnseenCategoryPolicy};
use agriguide_ml::data::split::stratified_split;
use agriguide_ml::error::{AgriError, ErrorKind};
use agriguide_ml::inference::{CropInput, FertilizerInput, InferenceContext, YieldInput};
use agriguide_ml::persistence::{ArtifactStore, JsonCodec};
use agriguide_ml::pipeline::{FamilyStatus, PipelineState, Stage, TrainingPipeline};
use agriguide_ml::training::ModelArtifact;
use agriguide_ml::{FailurePolicy, Family, RawRecord};
use pretty_assertions::assert_eq;
use std::path::Path;
use tempfile::TempDir;

/// 20 rows, two well-separated classes, interleaved.
fn crop_csv() -> String {
    let mut csv = String::from("N,P,K,temperature,humidity,ph,rainfall,label\n");
    for i in 0..10 {
        let f = i as f64;
        csv.push_str(&format!(
            "{},{},{},{},{},{:.2},{},rice\n",
            80 + i * 2,
            40 + i,
            40 + i % 5,
            22.0 + f * 0.5,
            80 + i,
            6.0 + f * 0.05,
            200 + i * 9
        ));
        csv.push_str(&format!(
            "{},{},{},{},{},{:.2},{},maize\n",
            15 + i * 2,
            12 + i,
            15 + i % 5,
            30.0 + f * 0.5,
            45 + i,
            7.2 + f * 0.05,
            60 + i * 3
        ));
    }
    csv
}

fn yield_csv() -> String {
    let mut csv =
        String::from("State_Name,District_Name,Crop_Year,Season,Crop,Area,Production\n");
    let states = ["Punjab", "Goa"];
    let seasons = ["Kharif", "Rabi"];
    let crops = ["Rice", "Wheat"];
    for i in 0..40 {
        let area = 10.0 + (i % 10) as f64 * 2.0;
        let per_hectare = 2.0 + (i % 5) as f64 * 0.5;
        csv.push_str(&format!(
            "{},District {},{},{},{},{},{}\n",
            states[i % 2],
            i % 3,
            2000 + i % 4,
            seasons[(i / 2) % 2],
            crops[(i / 4) % 2],
            area,
            area * per_hectare
        ));
    }
    csv
}

fn fertilizer_csv() -> String {
    let mut csv = String::from(
        "Temparature,Humidity,Moisture,Soil Type,Crop Type,Nitrogen,Potassium,Phosphorous,Fertilizer Name\n",
    );
    let soils = ["Sandy", "Loamy"];
    let crops = ["Maize", "Paddy"];
    for i in 0..20 {
        let (nitrogen, phosphorous, name) = if i % 2 == 0 {
            (35 + i, 0, "Urea")
        } else {
            (5 + i % 4, 35 + i, "DAP")
        };
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{}\n",
            26 + i % 6,
            50 + i % 8,
            30 + i % 10,
            soils[(i / 2) % 2],
            crops[(i / 4) % 2],
            nitrogen,
            i % 3,
            phosphorous,
            name
        ));
    }
    csv
}

fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

/// Config rooted in `dir` training `families`, with small forests.
fn config_in(dir: &Path, families: &[Family]) -> PipelineConfig {
    let mut config = PipelineConfig {
        artifact_dir: dir.join("artifacts"),
        model_dir: dir.join("models"),
        families: families.to_vec(),
        ..PipelineConfig::default()
    };
    config.crop.source = dir.join("crop.csv");
    config.r#yield.source = dir.join("yield.csv");
    config.fertilizer.source = dir.join("fertilizer.csv");
    config.crop.forest.n_trees = 15;
    config.r#yield.forest.n_trees = 10;
    config.fertilizer.forest.n_trees = 15;
    config
}

async fn train(config: PipelineConfig) -> agriguide_ml::PipelineReport {
    TrainingPipeline::new(config).unwrap().run().await.unwrap()
}

#[tokio::test]
async fn test_crop_pipeline_is_reproducible() {
    let mut fingerprints = Vec::new();
    let mut metrics = Vec::new();
    let mut forests = Vec::new();

    for _ in 0..2 {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "crop.csv", &crop_csv());
        let config = config_in(dir.path(), &[Family::Crop]);
        let model_path = config.model_path(Family::Crop);
        let report = train(config).await;

        let crop = report.family(Family::Crop).unwrap();
        assert_eq!(crop.status, FamilyStatus::Succeeded);
        assert_eq!(crop.state, PipelineState::Persisted);
        let ingestion = crop.ingestion.as_ref().unwrap();
        assert_eq!(ingestion.source_rows, 20);
        assert_eq!(ingestion.test_rows, 4);

        let transformation = crop.transformation.as_ref().unwrap();
        let training = crop.training.as_ref().unwrap();
        assert_eq!(training.contract_fingerprint, transformation.contract.fingerprint);
        assert!(!training.top_features.is_empty());
        assert_ne!(transformation.transformer_path, training.transformer_path);
        fingerprints.push(transformation.transformer_sha256.clone());
        metrics.push(training.metrics.clone());

        let model: ModelArtifact = ArtifactStore::new(JsonCodec).load(&model_path).await.unwrap();
        assert!(model.auxiliary.is_some());
        forests.push(model.forest);
    }

    assert_eq!(fingerprints[0], fingerprints[1]);
    assert_eq!(metrics[0], metrics[1]);
    assert_eq!(forests[0], forests[1]);
    let (metric, value) = metrics[0].headline();
    assert_eq!(metric, "accuracy");
    assert!(value >= 0.75, "accuracy {value}");
}

#[tokio::test]
async fn test_missing_column_fails_without_artifacts() {
    let dir = TempDir::new().unwrap();
    let csv: String = crop_csv()
        .lines()
        .map(|line| {
            let mut cells: Vec<&str> = line.split(',').collect();
            cells.remove(6);
            cells.join(",") + "\n"
        })
        .collect();
    write(dir.path(), "crop.csv", &csv);
    let config = config_in(dir.path(), &[Family::Crop]);
    let report = train(config.clone()).await;

    let crop = report.family(Family::Crop).unwrap();
    assert_eq!(crop.status, FamilyStatus::Failed);
    let failure = crop.failure.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::Schema);
    assert_eq!(failure.stage, Stage::Ingestion);
    assert!(failure.message.contains("rainfall"));
    assert!(!config.family_artifact_dir(Family::Crop).exists());
    assert!(!config.family_model_dir(Family::Crop).exists());
    assert!(report.all_failed());
}

#[tokio::test]
async fn test_all_rows_invalid_stops_before_transformation() {
    let dir = TempDir::new().unwrap();
    let mut csv = String::from("N,P,K,temperature,humidity,ph,rainfall,label\n");
    for _ in 0..5 {
        csv.push_str("lots,40,40,21.5,80.1,6.4,200.5,rice\n");
    }
    write(dir.path(), "crop.csv", &csv);
    let config = config_in(dir.path(), &[Family::Crop]);
    let report = train(config.clone()).await;

    let crop = report.family(Family::Crop).unwrap();
    let failure = crop.failure.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::EmptyDataset);
    assert_eq!(failure.stage, Stage::Ingestion);
    assert!(crop.transformation.is_none());
    assert!(
        !crop
            .transitions
            .iter()
            .any(|t| t.to == PipelineState::Transforming)
    );
    assert!(!config.transformer_path(Family::Crop).exists());
}

#[tokio::test]
async fn test_continue_policy_yields_partial_success() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "crop.csv", &crop_csv());
    let mut config = config_in(dir.path(), &[Family::Yield, Family::Crop]);
    config.failure_policy = FailurePolicy::Continue;
    let report_path = config.report_path();
    let report = train(config).await;

    assert_eq!(report.family(Family::Yield).unwrap().status, FamilyStatus::Failed);
    assert_eq!(report.family(Family::Crop).unwrap().status, FamilyStatus::Succeeded);
    assert!(report.is_partial());
    assert!(!report.all_failed());
    assert!(report_path.exists());
}

#[tokio::test]
async fn test_halt_policy_skips_remaining_families() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "crop.csv", &crop_csv());
    let config = config_in(dir.path(), &[Family::Yield, Family::Crop]);
    assert_eq!(config.failure_policy, FailurePolicy::Halt);
    let report = train(config.clone()).await;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.skipped(), 1);
    let crop = report.family(Family::Crop).unwrap();
    assert_eq!(crop.status, FamilyStatus::Skipped);
    assert_eq!(crop.state, PipelineState::Idle);
    assert!(!config.model_path(Family::Crop).exists());
}

#[tokio::test]
async fn test_concurrent_run_keeps_config_order() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "crop.csv", &crop_csv());
    write(dir.path(), "fertilizer.csv", &fertilizer_csv());
    let mut config = config_in(dir.path(), &[Family::Fertilizer, Family::Crop, Family::Yield]);
    config.concurrent = true;
    config.failure_policy = FailurePolicy::Continue;
    let report = train(config).await;

    let order: Vec<Family> = report.families.iter().map(|r| r.family).collect();
    assert_eq!(order, vec![Family::Fertilizer, Family::Crop, Family::Yield]);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.family(Family::Yield).unwrap().status, FamilyStatus::Failed);
}

#[tokio::test]
async fn test_inference_round_trip() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "crop.csv", &crop_csv());
    write(dir.path(), "yield.csv", &yield_csv());
    write(dir.path(), "fertilizer.csv", &fertilizer_csv());
    let config = config_in(dir.path(), &Family::ALL);
    let report = train(config.clone()).await;
    assert_eq!(report.succeeded(), 3, "{report:?}");

    let context = InferenceContext::load(&config).await.unwrap();
    assert_eq!(context.available(), Family::ALL.to_vec());

    let crop = context
        .predict_crop(&CropInput {
            nitrogen: 90.0,
            phosphorus: 45.0,
            potassium: 42.0,
            temperature: 24.0,
            humidity: 84.0,
            ph: 6.2,
            rainfall: 240.0,
        })
        .unwrap();
    assert_eq!(crop.crop, "rice");
    assert!(crop.confidence >= 50.0 && crop.confidence <= 100.0);

    let predicted = context
        .predict_yield(&YieldInput {
            state: "Punjab".into(),
            district: Some("District 1".into()),
            season: "Kharif".into(),
            crop: "Rice".into(),
            area: 10.0,
        })
        .unwrap();
    assert!(predicted.yield_per_hectare >= 2.0 && predicted.yield_per_hectare <= 4.0);
    assert!((predicted.total_yield - predicted.yield_per_hectare * 10.0).abs() < 0.06);

    let fertilizer = context
        .predict_fertilizer(&FertilizerInput {
            temperature: 28.0,
            humidity: 52.0,
            moisture: 35.0,
            soil_type: "Sandy".into(),
            crop_type: "Maize".into(),
            nitrogen: 50.0,
            potassium: 1.0,
            phosphorous: 0.0,
        })
        .unwrap();
    assert_eq!(fertilizer.fertilizer, "Urea");

    let options = context.category_options();
    assert_eq!(options.states, vec!["Goa".to_string(), "Punjab".to_string()]);
    assert_eq!(options.soil_types, vec!["Loamy".to_string(), "Sandy".to_string()]);
}

#[tokio::test]
async fn test_unseen_category_at_inference_is_an_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "yield.csv", &yield_csv());
    let config = config_in(dir.path(), &[Family::Yield]);
    let report = train(config.clone()).await;
    assert_eq!(report.succeeded(), 1, "{report:?}");

    let context = InferenceContext::load(&config).await.unwrap();
    let err = context
        .predict_yield(&YieldInput {
            state: "Atlantis".into(),
            district: None,
            season: "Kharif".into(),
            crop: "Rice".into(),
            area: 3.0,
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transformation);
    assert!(matches!(err, AgriError::UnknownCategory { ref column, .. } if column == "State_Name"));

    let predictor = context.predictor(Family::Yield).unwrap();
    let record = YieldInput {
        state: "Goa".into(),
        district: None,
        season: "Rabi".into(),
        crop: "Wheat".into(),
        area: 3.0,
    }
    .to_record();
    assert_eq!(
        predictor.transform(&record).unwrap(),
        predictor.transform(&record).unwrap()
    );
}

#[tokio::test]
async fn test_mismatched_transformer_is_rejected_on_load() {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    write(a.path(), "crop.csv", &crop_csv());
    let shifted: String = crop_csv()
        .lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                return format!("{line}\n");
            }
            let (n, rest) = line.split_once(',').unwrap();
            format!("{},{rest}\n", n.parse::<u32>().unwrap() + 3)
        })
        .collect();
    write(b.path(), "crop.csv", &shifted);

    let config_a = config_in(a.path(), &[Family::Crop]);
    let config_b = config_in(b.path(), &[Family::Crop]);
    train(config_a.clone()).await;
    train(config_b.clone()).await;

    std::fs::copy(
        config_b.transformer_path(Family::Crop),
        config_a.transformer_path(Family::Crop),
    )
    .unwrap();
    let context = InferenceContext::load(&config_a).await.unwrap();
    assert!(context.available().is_empty());
    assert_eq!(context.rejected(), vec![Family::Crop]);
    let err = context
        .predict_crop(&CropInput {
            nitrogen: 90.0,
            phosphorus: 45.0,
            potassium: 42.0,
            temperature: 24.0,
            humidity: 84.0,
            ph: 6.2,
            rainfall: 240.0,
        })
        .unwrap_err();
    assert!(matches!(err, AgriError::ArtifactMismatch(_)));
}

#[tokio::test]
async fn test_failed_retrain_keeps_previous_models_servable() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "crop.csv", &crop_csv());
    write(dir.path(), "fertilizer.csv", &fertilizer_csv());
    let config = config_in(dir.path(), &[Family::Crop, Family::Fertilizer]);
    assert_eq!(train(config.clone()).await.succeeded(), 2);
    let served = std::fs::read(config.transformer_path(Family::Crop)).unwrap();

    let single_class: String = crop_csv()
        .lines()
        .map(|line| format!("{}\n", line.replace("maize", "rice")))
        .collect();
    write(dir.path(), "crop.csv", &single_class);
    let retrain = config_in(dir.path(), &[Family::Crop]);
    let report = train(retrain).await;

    let crop = report.family(Family::Crop).unwrap();
    assert_eq!(crop.status, FamilyStatus::Failed);
    let failure = crop.failure.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::Training);
    assert_eq!(failure.stage, Stage::Training);
    assert!(crop.transformation.is_some());
    assert_eq!(std::fs::read(config.transformer_path(Family::Crop)).unwrap(), served);

    let context = InferenceContext::load(&config).await.unwrap();
    assert_eq!(context.available(), vec![Family::Crop, Family::Fertilizer]);
    let crop = context
        .predict_crop(&CropInput {
            nitrogen: 20.0,
            phosphorus: 15.0,
            potassium: 17.0,
            temperature: 31.0,
            humidity: 48.0,
            ph: 7.3,
            rainfall: 70.0,
        })
        .unwrap();
    assert_eq!(crop.crop, "maize");
}

/// Fertilizer source where one test-split row carries a soil type no training
/// row has.
fn fertilizer_csv_with_unseen_soil(config: &PipelineConfig) -> String {
    let labels: Vec<RawRecord> = (0..20)
        .map(|i| {
            RawRecord::new()
                .with("row", i as f64)
                .with("Fertilizer Name", if i % 2 == 0 { "Urea" } else { "DAP" })
        })
        .collect();
    let split = stratified_split(
        labels,
        "Fertilizer Name",
        config.split.test_ratio,
        config.split.seed,
    )
    .unwrap();
    let target = split.test[0].number("row").unwrap() as usize;

    fertilizer_csv()
        .lines()
        .enumerate()
        .map(|(i, line)| {
            if i != target + 1 {
                return format!("{line}\n");
            }
            let mut cells: Vec<&str> = line.split(',').collect();
            cells[3] = "Clayey";
            cells.join(",") + "\n"
        })
        .collect()
}

#[tokio::test]
async fn test_unseen_test_category_fails_by_default() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path(), &[Family::Fertilizer]);
    assert_eq!(config.unseen_test_category, UnseenCategoryPolicy::Fail);
    write(dir.path(), "fertilizer.csv", &fertilizer_csv_with_unseen_soil(&config));
    let report = train(config.clone()).await;

    let fertilizer = report.family(Family::Fertilizer).unwrap();
    assert_eq!(fertilizer.status, FamilyStatus::Failed);
    let failure = fertilizer.failure.as_ref().unwrap();
    assert_eq!(failure.kind, ErrorKind::Transformation);
    assert_eq!(failure.stage, Stage::Transformation);
    assert!(failure.message.contains("Clayey"), "{}", failure.message);
    assert!(!config.model_path(Family::Fertilizer).exists());
}

#[tokio::test]
async fn test_unseen_test_category_dropped_on_request() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(dir.path(), &[Family::Fertilizer]);
    config.unseen_test_category = UnseenCategoryPolicy::DropRow;
    write(dir.path(), "fertilizer.csv", &fertilizer_csv_with_unseen_soil(&config));
    let report = train(config).await;

    let fertilizer = report.family(Family::Fertilizer).unwrap();
    assert_eq!(fertilizer.status, FamilyStatus::Succeeded, "{report:?}");
    let ingestion = fertilizer.ingestion.as_ref().unwrap();
    let transformation = fertilizer.transformation.as_ref().unwrap();
    assert_eq!(transformation.dropped_test_rows, 1);
    assert_eq!(transformation.test_rows, ingestion.test_rows - 1);
}
