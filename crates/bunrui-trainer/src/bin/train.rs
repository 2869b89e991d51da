use std::path::PathBuf;

use bunrui_trainer::config::TrainConfig;
use bunrui_trainer::trainer::run_training;
use clap::Parser;

/// CLI arguments
#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train a bunrui text-classification model")]
#[command(version)]
struct Cli {
    /// Training configuration file (JSON); defaults apply when absent
    #[arg(short, long, default_value = "train.json")]
    config: PathBuf,

    /// Override the configured model family
    #[arg(short, long)]
    model_family: Option<String>,

    /// Override the configured epoch count
    #[arg(long)]
    epochs: Option<usize>,
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if let Err(e) = load_config(&cli).and_then(|config| run_training(&config)) {
        eprintln!("Training failed: {e}");
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<TrainConfig> {
    let mut config = if cli.config.exists() {
        TrainConfig::load(&cli.config)?
    } else {
        tracing::info!(path = %cli.config.display(), "config file absent, using defaults");
        TrainConfig::default()
    };
    if let Some(family) = &cli.model_family {
        config.model_family = family.parse()?;
    }
    if let Some(epochs) = cli.epochs {
        config.epochs = epochs;
    }
    Ok(config)
}
