//! AgriGuide CLI: train the crop, yield and fertilizer models and query them.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// AgriGuide: crop recommendation, yield estimation and fertilizer advice
#[derive(Parser, Debug)]
#[command(name = "agriguide", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Workspace directory holding agriguide.toml and relative data paths
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Run the training pipeline
    Train {
        /// Family to train; repeat for several (default: all configured)
        #[arg(short, long = "family")]
        families: Vec<agriguide_ml::Family>,

        /// Keep training the other families after one fails
        #[arg(long)]
        continue_on_failure: bool,

        /// Train families as concurrent tasks
        #[arg(long)]
        concurrent: bool,
    },
    /// Predict with the trained models
    Predict {
        /// Print the prediction as JSON
        #[arg(long, global = true)]
        json: bool,

        #[command(subcommand)]
        target: PredictTarget,
    },
    /// List the categories the models were trained on
    Categories,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum PredictTarget {
    /// Recommend a crop from soil nutrients and climate
    Crop {
        #[arg(short = 'n', long)]
        nitrogen: f64,
        #[arg(short = 'p', long)]
        phosphorus: f64,
        #[arg(short = 'k', long)]
        potassium: f64,
        /// Degrees Celsius
        #[arg(long)]
        temperature: f64,
        /// Relative humidity, percent
        #[arg(long)]
        humidity: f64,
        #[arg(long)]
        ph: f64,
        /// Millimetres
        #[arg(long)]
        rainfall: f64,
    },
    /// Estimate yield for a crop, season and location
    Yield {
        #[arg(long)]
        state: String,
        #[arg(long)]
        district: Option<String>,
        #[arg(long)]
        season: String,
        #[arg(long)]
        crop: String,
        /// Hectares
        #[arg(long)]
        area: f64,
    },
    /// Recommend a fertilizer
    Fertilizer {
        #[arg(long)]
        temperature: f64,
        #[arg(long)]
        humidity: f64,
        #[arg(long)]
        moisture: f64,
        #[arg(long)]
        soil_type: String,
        #[arg(long)]
        crop_type: String,
        #[arg(long)]
        nitrogen: f64,
        #[arg(long)]
        potassium: f64,
        #[arg(long)]
        phosphorous: f64,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Write the default agriguide.toml into the workspace
    Init,
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("org", "agriguide", "agriguide")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "agriguide.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace).await
}
