//! Background removal CLI tool
//!
//! Removes the background from one image per invocation.

use super::config::{default_output_path, model_spec_from_arg, tracing_format, CliConfigBuilder};
use crate::{
    cache::{format_size, ModelCache},
    download::{validate_model_url, verify_cached_model, ModelDownloader, DEFAULT_MODEL_URL},
    models::{ModelSource, ModelSpec, DEFAULT_MODEL_ID},
    processor::BackgroundRemovalProcessor,
    services::OutputFormatHandler,
    tracing_config::init_cli_tracing,
    types::RemovalResult,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Background removal CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremoval")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image (PNG, JPEG, TIFF)
    #[arg(value_name = "INPUT", required_unless_present_any = ["only_download", "list_models", "clear_cache"])]
    pub input: Option<PathBuf>,

    /// Output file, "-" for stdout [default: <stem>_cutout.<ext> or <stem>_mask.<ext>]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Write the subject mask instead of the cutout
    #[arg(long)]
    pub mask_only: bool,

    /// Inference backend
    #[arg(short, long, value_enum)]
    pub backend: Option<CliBackend>,

    /// Execution provider (ONNX backend only)
    #[arg(short, long, value_enum)]
    pub execution_provider: Option<CliExecutionProvider>,

    /// Model file, cached model ID or download URL [default: u2netp]
    #[arg(short, long)]
    pub model: Option<String>,

    /// How inference output is turned back into an image
    #[arg(long, value_enum)]
    pub raster: Option<CliRaster>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<CliOutputFormat>,

    /// JPEG quality (0-100)
    #[arg(long)]
    pub jpeg_quality: Option<u8>,

    /// Number of inference threads (0 = auto)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// JSON configuration file; command line flags take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Download the model (--model URL or the default) and exit
    #[arg(long)]
    pub only_download: bool,

    /// Expected SHA-256 of the downloaded model
    #[arg(long, value_name = "HEX")]
    pub sha256: Option<String>,

    /// List cached models and exit
    #[arg(long)]
    pub list_models: bool,

    /// Clear cached models (combine with --model to clear one model) and exit
    #[arg(long)]
    pub clear_cache: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format on stderr [default: console on a terminal, plain otherwise]
    #[arg(long, value_enum)]
    pub log_format: Option<CliLogFormat>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    Onnx,
    Tract,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliExecutionProvider {
    Auto,
    Cpu,
    Cuda,
    #[value(name = "coreml")]
    CoreMl,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliRaster {
    RowOrderAware,
    RawRowMajor,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Plain,
    Json,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputFormat {
    Png,
    Jpeg,
    Tiff,
    Webp,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_format = cli.log_format.map(tracing_format).transpose()?;
    init_cli_tracing(cli.verbose, log_format).context("Failed to initialize tracing")?;

    if cli.list_models {
        return list_cached_models();
    }

    if cli.clear_cache {
        return clear_cache_models(&cli);
    }

    if cli.only_download {
        return download_model_only(&cli).await;
    }

    let Some(input) = cli.input.as_deref() else {
        anyhow::bail!("An input image is required");
    };

    let config = CliConfigBuilder::from_cli(&cli).context("Invalid configuration")?;
    OutputFormatHandler::validate_for_background_removal(config.output_format);

    info!(
        input = %input.display(),
        backend = %config.backend_type,
        provider = %config.execution_provider,
        raster = %config.raster_backend,
        model = %config.model_spec.source.display_name(),
        "Starting background removal"
    );

    ensure_model_available(cli.model.as_deref(), &config.model_spec, cli.sha256.as_deref())
        .await
        .context("Failed to ensure model is available")?;

    let image_bytes = tokio::fs::read(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;

    let mut processor = BackgroundRemovalProcessor::new(config)
        .context("Failed to create background removal processor")?;

    let spinner = processing_spinner(input);
    let outcome = processor.process_bytes(&image_bytes, cli.mask_only);
    spinner.finish_and_clear();
    let result = outcome.context("Failed to remove background")?;

    log_timings(input, &result);
    write_output(&cli, input, &processor, &result)
}

fn processing_spinner(input: &Path) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Processing {}", input.display()));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn log_timings(input: &Path, result: &RemovalResult) {
    let timings = &result.timings;
    info!("📊 Processing breakdown for {}:", input.display());
    if timings.model_load_ms > 0 {
        info!("  ├─ Model Load: {}ms", timings.model_load_ms);
    }
    info!("  ├─ Geometry: {}ms", timings.geometry_ms);
    info!("  ├─ Resize: {}ms", timings.resize_ms);
    info!("  ├─ Rasterize: {}ms", timings.rasterize_ms);
    info!(
        "  ├─ Inference: {}ms ({:.1}%)",
        timings.inference_ms,
        timings.inference_ratio() * 100.0
    );
    info!("  ├─ Mask Rescale: {}ms", timings.mask_rescale_ms);
    info!("  ├─ Composite: {}ms", timings.composite_ms);
    info!(
        "  └─ Total: {}ms ({:.2}s)",
        timings.total_ms,
        timings.total_ms as f64 / 1000.0
    );
}

fn write_output(
    cli: &Cli,
    input: &Path,
    processor: &BackgroundRemovalProcessor,
    result: &RemovalResult,
) -> Result<()> {
    let config = processor.config();
    match cli.output.as_deref() {
        Some("-") => {
            let bytes = result.to_bytes(config.output_format, config.jpeg_quality)?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("Failed to write to stdout")?;
            stdout.flush().context("Failed to flush stdout")?;
        },
        target => {
            let output_path = target.map_or_else(
                || default_output_path(input, config.output_format, cli.mask_only),
                PathBuf::from,
            );
            result
                .save(&output_path, config.output_format, config.jpeg_quality)
                .with_context(|| format!("Failed to save {}", output_path.display()))?;
            let (width, height) = result.dimensions();
            println!("✅ Saved {}x{} result to {}", width, height, output_path.display());
        },
    }
    Ok(())
}

/// Download a missing cached model when we know where it comes from
async fn ensure_model_available(
    model_arg: Option<&str>,
    model_spec: &ModelSpec,
    expected_sha256: Option<&str>,
) -> Result<()> {
    let ModelSource::Downloaded(model_id) = &model_spec.source else {
        return Ok(());
    };

    let cache = ModelCache::new().context("Failed to create model cache")?;
    if cache.is_model_cached(model_id) {
        if let Some(expected) = expected_sha256 {
            verify_cached_model(&cache, model_id, expected)
                .with_context(|| format!("Cached model '{model_id}' failed verification"))?;
        }
        return Ok(());
    }

    let url = match model_arg {
        Some(arg) if validate_model_url(arg).is_ok() => arg,
        _ if model_id == DEFAULT_MODEL_ID => DEFAULT_MODEL_URL,
        _ => anyhow::bail!(
            "Model '{}' not found in cache. Use --only-download --model <URL> to download it first, or --list-models to see available models.",
            model_id
        ),
    };

    println!("📦 Model not cached. Downloading {}...", url);
    let downloader = ModelDownloader::with_cache(cache).context("Failed to create model downloader")?;
    let downloaded_id = downloader
        .download_model(url, expected_sha256, true)
        .await
        .context("Failed to download model")?;

    if downloaded_id != *model_id {
        anyhow::bail!(
            "Downloaded model ID '{}' doesn't match expected '{}'",
            downloaded_id,
            model_id
        );
    }
    println!("✅ Model downloaded successfully!");
    Ok(())
}

/// List cached models available for processing
fn list_cached_models() -> Result<()> {
    let cache = ModelCache::new().context("Failed to initialize model cache")?;
    let models = cache
        .scan_cached_models()
        .context("Failed to list cached models")?;

    println!("📦 Cached Models ({})", cache.cache_dir().display());

    if models.is_empty() {
        println!("No cached models found.");
        println!("\n💡 To download the default model, use:");
        println!("  bgremoval --only-download");
        return Ok(());
    }

    for model in models {
        println!("📁 Model ID: {}", model.model_id);
        println!("  └─ Cache location: {}", model.path.display());
        println!("  └─ Size: {}", format_size(model.size_bytes));
        if model.has_sidecar {
            println!("  └─ Metadata: model.json");
        }
        println!();
    }

    println!("💡 To use a cached model:");
    println!("  bgremoval --model MODEL_ID input.jpg");

    Ok(())
}

/// Download model only without processing images
async fn download_model_only(cli: &Cli) -> Result<()> {
    let model_url = cli.model.as_deref().unwrap_or(DEFAULT_MODEL_URL);
    validate_model_url(model_url).context("--only-download requires an http(s) model URL")?;

    println!("📦 Downloading model from: {}", model_url);

    let downloader = ModelDownloader::new().context("Failed to create model downloader")?;
    let model_id = downloader
        .download_model(model_url, cli.sha256.as_deref(), true)
        .await
        .context("Failed to download model")?;

    println!("✅ Model ready!");
    println!("   Model ID: {}", model_id);
    let model_path = downloader.cache().model_file_path(&model_id)?;
    println!("   Cache location: {}", model_path.display());
    println!("\n💡 To use this model:");
    println!("   bgremoval --model {} input.jpg", model_id);

    Ok(())
}

/// Clear cached models
fn clear_cache_models(cli: &Cli) -> Result<()> {
    let cache = ModelCache::new().context("Failed to create model cache")?;

    if let Some(model_arg) = &cli.model {
        let model_id = match model_spec_from_arg(model_arg).source {
            ModelSource::Downloaded(model_id) => model_id,
            ModelSource::External(path) => {
                anyhow::bail!("{} is not a cached model", path.display())
            },
        };
        println!("🗑️  Clearing model: {}", model_id);

        if cache
            .clear_specific_model(&model_id)
            .with_context(|| format!("Failed to clear model '{model_id}'"))?
        {
            println!("✅ Removed model: {}", model_id);
        } else {
            println!("⚠️  Model '{}' not found in cache", model_id);
            println!("   Use --list-models to see available models");
        }
    } else {
        println!("🗑️  Clearing entire model cache...");
        let removed_models = cache.clear_all_models().context("Failed to clear cache")?;
        if removed_models.is_empty() {
            println!("💡 Cache was already empty");
        } else {
            println!("✅ Removed {} model(s):", removed_models.len());
            for model_id in &removed_models {
                println!("   • {}", model_id);
            }
        }
    }

    debug!(cache_dir = %cache.cache_dir().display(), "Cache cleared");
    Ok(())
}
