//! celldistill-annotate CLI entry point.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use celldistill_annotate::pipeline::PredictPlan;
use celldistill_annotate::{run, train, AnnotateConfig, ConfigValidator, PredictType, TrainConfig};
use celldistill_common::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "celldistill-annotate")]
#[command(about = "Reference training and two-round cell-type prediction")]
#[command(version)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict cell types of a target dataset
    Predict {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Override the prediction plan
        #[arg(long, value_enum)]
        predict_type: Option<PredictType>,

        /// Override output directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Train a reference model
    Train {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Validate configuration file
    Validate {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Treat the file as a training configuration
        #[arg(long)]
        train: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let result = match cli.command {
        Commands::Predict { config, predict_type, output } => predict_command(&config, predict_type, output),
        Commands::Train { config } => train_command(&config),
        Commands::Validate { config, train } => validate_command(&config, train),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error[{}]: {e}", e.code());
            ExitCode::FAILURE
        }
    }
}

fn predict_command(config_path: &Path, predict_type: Option<PredictType>, output: Option<PathBuf>) -> Result<()> {
    let mut config = AnnotateConfig::from_file(config_path)?;
    if let Some(predict_type) = predict_type {
        config.prediction.predict_type = predict_type;
    }
    if let Some(out) = output {
        config.output.dir = out;
    }

    let result = run(&config)?;

    println!("Prediction complete");
    println!("  Output: {}", result.output_path.display());
    println!("  Cells: {}", result.cells.len());
    println!("  Feature coverage: {:.1}% ({:?})", result.coverage * 100.0, result.coverage_status);
    if result.plan == PredictPlan::TwoRound {
        println!("  Low-entropy cells: {}", result.low_entropy_cells);
        println!("  High-entropy cells: {}", result.high_entropy_cells);
        println!("  Relabelled: {}", result.changed_labels);
    }
    Ok(())
}

fn train_command(config_path: &Path) -> Result<()> {
    let config = TrainConfig::from_file(config_path)?;
    let result = train(&config)?;

    println!("Training complete");
    println!("  Model: {}", result.model_dir.display());
    println!("  Cells: {}  Features: {}  Classes: {}", result.cells, result.features, result.classes);
    println!("  Loss: {:.4} -> {:.4}", result.metrics.initial_loss, result.metrics.final_loss);
    Ok(())
}

fn validate_command(config_path: &Path, train: bool) -> Result<()> {
    if train {
        ConfigValidator::validate_training_config(&TrainConfig::from_file(config_path)?)?;
    } else {
        ConfigValidator::validate(&AnnotateConfig::from_file(config_path)?)?;
    }
    println!("Configuration valid: {}", config_path.display());
    Ok(())
}
