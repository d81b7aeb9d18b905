//! CLI subcommand handlers.

use crate::{Commands, ConfigAction, PredictTarget};
use agriguide_ml::config::{CONFIG_FILE, ConfigOverrides};
use agriguide_ml::pipeline::{FamilyStatus, PipelineReport};
use agriguide_ml::{
    CropInput, FailurePolicy, Family, FertilizerInput, InferenceContext, PipelineConfig,
    TrainingPipeline, YieldInput, load_config,
};
use serde::Serialize;
use std::path::Path;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Train {
            families,
            continue_on_failure,
            concurrent,
        } => {
            let overrides = ConfigOverrides {
                families: (!families.is_empty()).then_some(families),
                failure_policy: continue_on_failure.then_some(FailurePolicy::Continue),
                concurrent: concurrent.then_some(true),
                ..Default::default()
            };
            handle_train(workspace, &overrides).await
        }
        Commands::Predict { json, target } => handle_predict(workspace, target, json).await,
        Commands::Categories => handle_categories(workspace).await,
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn workspace_config(
    workspace: &Path,
    overrides: Option<&ConfigOverrides>,
) -> anyhow::Result<PipelineConfig> {
    let mut config = load_config(Some(workspace), overrides)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    config.resolve_paths(workspace);
    Ok(config)
}

async fn handle_train(workspace: &Path, overrides: &ConfigOverrides) -> anyhow::Result<()> {
    let config = workspace_config(workspace, Some(overrides))?;
    let pipeline = TrainingPipeline::new(config)?;
    let report = pipeline.run().await?;

    print!("{}", render_report(&report));
    println!(
        "\nReport written to {}",
        pipeline.config().report_path().display()
    );
    if report.all_failed() {
        anyhow::bail!("no family was trained successfully");
    }
    Ok(())
}

fn render_report(report: &PipelineReport) -> String {
    let mut out = format!("Training run {}\n", report.run_id);
    for family in &report.families {
        let line = match family.status {
            FamilyStatus::Succeeded => {
                let Some(training) = family.training.as_ref() else {
                    out.push_str(&format!("  {:<11} succeeded\n", family.family));
                    continue;
                };
                let (metric, value) = training.metrics.headline();
                let mut line = format!("  {:<11} succeeded  {metric} {value:.4}", family.family);
                if !training.top_features.is_empty() {
                    line.push_str(&format!(
                        "\n              top features: {}",
                        render_features(&training.top_features)
                    ));
                }
                line
            }
            FamilyStatus::Failed => {
                let reason = family
                    .failure
                    .as_ref()
                    .map(|f| format!("[{:?}] {}", f.stage, f.message))
                    .unwrap_or_default();
                format!("  {:<11} failed     {}", family.family, reason)
            }
            FamilyStatus::Skipped => format!("  {:<11} skipped", family.family),
        };
        out.push_str(&line);
        out.push('\n');
    }
    if report.is_partial() {
        out.push_str(&format!(
            "\n{} of {} families trained; inference works for the trained ones.\n",
            report.succeeded(),
            report.families.len()
        ));
    }
    out
}

fn render_features(features: &[(String, f64)]) -> String {
    features
        .iter()
        .map(|(name, importance)| format!("{name} ({importance:.3})"))
        .collect::<Vec<_>>()
        .join(", ")
}

async fn handle_predict(
    workspace: &Path,
    target: PredictTarget,
    json: bool,
) -> anyhow::Result<()> {
    let config = workspace_config(workspace, None)?;
    let context = InferenceContext::load(&config).await?;

    match target {
        PredictTarget::Crop {
            nitrogen,
            phosphorus,
            potassium,
            temperature,
            humidity,
            ph,
            rainfall,
        } => {
            let prediction = context.predict_crop(&CropInput {
                nitrogen,
                phosphorus,
                potassium,
                temperature,
                humidity,
                ph,
                rainfall,
            })?;
            emit(json, &prediction, || {
                println!(
                    "Recommended crop: {} ({:.2}% confidence)",
                    prediction.crop, prediction.confidence
                );
                println!("{}", prediction.soil_advice.message);
            })
        }
        PredictTarget::Yield {
            state,
            district,
            season,
            crop,
            area,
        } => {
            let prediction = context.predict_yield(&YieldInput {
                state,
                district,
                season,
                crop,
                area,
            })?;
            emit(json, &prediction, || {
                println!(
                    "Expected yield: {:.2} t/ha, {:.2} t over {} ha",
                    prediction.yield_per_hectare, prediction.total_yield, prediction.area
                );
            })
        }
        PredictTarget::Fertilizer {
            temperature,
            humidity,
            moisture,
            soil_type,
            crop_type,
            nitrogen,
            potassium,
            phosphorous,
        } => {
            let prediction = context.predict_fertilizer(&FertilizerInput {
                temperature,
                humidity,
                moisture,
                soil_type,
                crop_type,
                nitrogen,
                potassium,
                phosphorous,
            })?;
            emit(json, &prediction, || {
                println!(
                    "Recommended fertilizer: {} ({:.2}% confidence)",
                    prediction.fertilizer, prediction.confidence
                );
                println!("{}", prediction.soil_advice.message);
            })
        }
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce()) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text();
    }
    Ok(())
}

async fn handle_categories(workspace: &Path) -> anyhow::Result<()> {
    let config = workspace_config(workspace, None)?;
    let context = InferenceContext::load(&config).await?;
    if context.available().is_empty() {
        println!("No trained models found. Run `agriguide train` first.");
        return Ok(());
    }
    let options = context.category_options();
    for (name, values) in [
        ("States", &options.states),
        ("Seasons", &options.seasons),
        ("Crops", &options.crops),
        ("Soil types", &options.soil_types),
        ("Crop types", &options.crop_types),
    ] {
        if !values.is_empty() {
            println!("{name} ({}): {}", values.len(), values.join(", "));
        }
    }
    for family in Family::ALL {
        if let Err(e) = context.predictor(family) {
            if context.rejected().contains(&family) {
                println!("({family} artifacts rejected: {e})");
            } else {
                println!("({family} model not trained)");
            }
        }
    }
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace.join(CONFIG_FILE);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let toml_str = toml::to_string_pretty(&PipelineConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}
