//! Custom CNN CLI
//!
//! Builds the classifier and logs its structural summary. Without a
//! subcommand the standard model for 512x512 RGB images and 4 classes is
//! built.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use burn::module::Module;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use custom_cnn::backend::{backend_name, default_device, DefaultBackend};
use custom_cnn::model::{InputShape, ModelConfig, ModelSummary};
use custom_cnn::utils::format_duration;
use custom_cnn::utils::logging::{init_logging, LogConfig, LogLevel};

/// Custom convolutional image classifier
#[derive(Parser, Debug)]
#[command(name = "custom_cnn")]
#[command(version)]
#[command(about = "Build a custom CNN with Burn and log its summary", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Log level; overrides --verbose
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Model shape options shared by the subcommands
#[derive(clap::Args, Debug)]
struct ModelArgs {
    /// JSON model configuration; the flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Input image height
    #[arg(long)]
    height: Option<usize>,

    /// Input image width
    #[arg(long)]
    width: Option<usize>,

    /// Input image channels
    #[arg(long)]
    channels: Option<usize>,

    /// Number of output classes
    #[arg(short, long)]
    num_classes: Option<usize>,
}

impl ModelArgs {
    fn resolve(&self) -> Result<ModelConfig> {
        let mut config = match &self.config {
            Some(path) => ModelConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => ModelConfig::default(),
        };

        let InputShape {
            height,
            width,
            channels,
        } = config.input_shape;
        config.input_shape = InputShape::new(
            self.height.unwrap_or(height),
            self.width.unwrap_or(width),
            self.channels.unwrap_or(channels),
        );

        if let Some(num_classes) = self.num_classes {
            config.num_classes = num_classes;
        }

        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the model and log its summary
    Summary {
        #[command(flatten)]
        model: ModelArgs,
    },

    /// Write a model configuration as JSON
    WriteConfig {
        #[command(flatten)]
        model: ModelArgs,

        /// Output file path
        #[arg(short, long, default_value = "model_config.json")]
        output: PathBuf,
    },

    /// Write augmented versions of an image to check the random transforms
    Preview {
        #[command(flatten)]
        model: ModelArgs,

        /// Path to input image
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory for the augmented images
        #[arg(short, long, default_value = "output/preview")]
        output_dir: PathBuf,

        /// Number of augmented images to write
        #[arg(long, default_value = "8")]
        count: usize,

        /// Random seed for reproducibility
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    if let Some(level) = cli.log_level {
        log_config = log_config.with_level(level);
    }

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        None => {
            cmd_summary(&ModelConfig::default())?;
        }

        Some(Commands::Summary { model }) => {
            cmd_summary(&model.resolve()?)?;
        }

        Some(Commands::WriteConfig { model, output }) => {
            cmd_write_config(&model.resolve()?, &output)?;
        }

        Some(Commands::Preview {
            model,
            input,
            output_dir,
            count,
            seed,
        }) => {
            let config = model.resolve()?;
            let written = custom_cnn::preview::preview_augmentations::<DefaultBackend>(
                &config,
                &input,
                &output_dir,
                count,
                seed,
                &default_device(),
            )?;

            for path in written {
                println!("  {}", path.display().to_string().green());
            }
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{} {}",
        "custom_cnn".cyan().bold(),
        format!("v{}", custom_cnn::VERSION).dimmed()
    );
}

fn cmd_summary(config: &ModelConfig) -> Result<()> {
    info!(
        "Building model for input {} with {} classes on {}",
        config.input_shape,
        config.num_classes,
        backend_name()
    );

    let start = Instant::now();
    let model = config
        .init::<DefaultBackend>(&default_device())
        .context("Failed to build model")?;
    let summary = ModelSummary::from_config(config)?;

    info!(
        "Model built in {}",
        format_duration(start.elapsed().as_secs_f64())
    );
    info!("\n{}", summary);

    // num_params includes batch-norm running statistics
    let allocated = model.num_params();
    if allocated != summary.total_params() {
        warn!(
            "Allocated {} parameters but the summary counts {}",
            allocated,
            summary.total_params()
        );
    }

    Ok(())
}

fn cmd_write_config(config: &ModelConfig, output: &Path) -> Result<()> {
    config.validate()?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    config.save(output)?;

    info!("Wrote model configuration to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_parses() {
        let cli = Cli::try_parse_from(["custom_cnn"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn test_log_level_is_checked() {
        let cli = Cli::try_parse_from(["custom_cnn", "--log-level", "warn"]).unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::Warn));

        assert!(Cli::try_parse_from(["custom_cnn", "--log-level", "bogus"]).is_err());
    }

    #[test]
    fn test_model_args_without_flags_give_default_model() {
        let cli = Cli::try_parse_from(["custom_cnn", "summary"]).unwrap();
        let Some(Commands::Summary { model }) = cli.command else {
            panic!("expected the summary subcommand");
        };

        let config = model.resolve().unwrap();
        let default = ModelConfig::default();
        assert_eq!(config.input_shape, default.input_shape);
        assert_eq!(config.num_classes, default.num_classes);
    }

    #[test]
    fn test_model_args_override_shape() {
        let cli = Cli::try_parse_from([
            "custom_cnn",
            "summary",
            "--height",
            "300",
            "--num-classes",
            "2",
        ])
        .unwrap();
        let Some(Commands::Summary { model }) = cli.command else {
            panic!("expected the summary subcommand");
        };

        let config = model.resolve().unwrap();
        assert_eq!(config.input_shape, InputShape::new(300, 512, 3));
        assert_eq!(config.num_classes, 2);
    }
}
