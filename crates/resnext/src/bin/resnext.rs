use std::path::{Path, PathBuf};

use anyhow::Result;
use burn::{config::Config, module::Module};
use clap::{Parser, Subcommand};
use resnext::{
    create_device, get_backend_name, run_classification, ClassifyConfig, SelectedBackend,
    DEFAULT_TOP_K,
};
use resnext_model::{ResNeXtConfig, ResNeXtVariant, DEFAULT_IMAGE_SIZE};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "resnext")]
#[command(about = "ResNeXt-101 32x4d image classification")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an image or every image under a directory
    Classify {
        /// Input image path or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Weight file (.pth, .pt, .safetensors, .mpk or .bin)
        #[arg(short, long)]
        weights: Option<PathBuf>,

        /// Class name file, one name per line
        #[arg(short, long)]
        labels: Option<PathBuf>,

        /// Number of predictions to print per image
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Side of the center crop fed to the network
        #[arg(long, default_value_t = DEFAULT_IMAGE_SIZE as u32)]
        image_size: u32,

        /// Model configuration JSON (defaults to ResNeXt-101 32x4d)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the module tree and parameter count
    Summary {
        /// Model configuration JSON (defaults to ResNeXt-101 32x4d)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write a preset model configuration
    Config {
        /// Output JSON file
        #[arg(short, long)]
        output: PathBuf,

        /// Preset to write
        #[arg(long, default_value_t = ResNeXtVariant::default())]
        variant: ResNeXtVariant,
    },

    /// Show backend information
    Info,
}

fn load_config(path: Option<&Path>) -> Result<ResNeXtConfig> {
    match path {
        Some(path) => ResNeXtConfig::load(path)
            .map_err(|e| anyhow::anyhow!("failed to load config {}: {e}", path.display())),
        None => Ok(ResNeXtConfig::resnext101_32x4d()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let device = create_device();
    tracing::debug!(backend = get_backend_name(), "backend selected");

    match cli.command {
        Commands::Classify {
            input,
            weights,
            labels,
            top_k,
            image_size,
            config,
        } => {
            let classify_config = ClassifyConfig::new(input)
                .with_weights(weights)
                .with_labels(labels)
                .with_top_k(top_k)
                .with_image_size(image_size)
                .with_model_config(load_config(config.as_deref())?);

            let results = run_classification::<SelectedBackend>(&classify_config, &device)?;
            for result in results {
                println!("{}", result.path.display());
                for (rank, prediction) in result.predictions.iter().enumerate() {
                    println!(
                        "  {}. {:<40} {:>4} {:.4}",
                        rank + 1,
                        prediction.label,
                        prediction.class_index,
                        prediction.probability
                    );
                }
            }
            Ok(())
        }

        Commands::Summary { config } => {
            let config = load_config(config.as_deref())?;
            let model = config.init::<SelectedBackend>(&device)?;
            println!("{model}");
            println!("Parameters: {}", model.num_params());
            Ok(())
        }

        Commands::Config { output, variant } => {
            variant
                .config()
                .save(&output)
                .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", output.display()))?;
            tracing::info!(path = %output.display(), %variant, "wrote configuration");
            Ok(())
        }

        Commands::Info => {
            println!("ResNeXt Information:");
            println!("  Backend: {}", get_backend_name());
            println!("  Device: {device:?}");
            Ok(())
        }
    }
}
