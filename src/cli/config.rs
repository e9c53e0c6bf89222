//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{
    Cli, CliBackend, CliExecutionProvider, CliLogFormat, CliOutputFormat, CliRaster,
};
use crate::{
    cache::ModelCache,
    config::{BackendType, ExecutionProvider, OutputFormat, RemovalConfig},
    download::validate_model_url,
    models::ModelSpec,
    raster::RasterBackend,
    services::OutputFormatHandler,
    tracing_config::TracingFormat,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Convert CLI arguments to a `RemovalConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Start from `--config` (or defaults) and apply explicit flags on top
    pub(crate) fn from_cli(cli: &Cli) -> Result<RemovalConfig> {
        let mut config = match &cli.config {
            Some(path) => RemovalConfig::from_json_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => RemovalConfig::default(),
        };

        if let Some(backend) = cli.backend {
            config.backend_type = match backend {
                CliBackend::Onnx => BackendType::Onnx,
                CliBackend::Tract => BackendType::Tract,
            };
        }
        if let Some(provider) = cli.execution_provider {
            config.execution_provider = match provider {
                CliExecutionProvider::Auto => ExecutionProvider::Auto,
                CliExecutionProvider::Cpu => ExecutionProvider::Cpu,
                CliExecutionProvider::Cuda => ExecutionProvider::Cuda,
                CliExecutionProvider::CoreMl => ExecutionProvider::CoreMl,
            };
        }
        if let Some(raster) = cli.raster {
            config.raster_backend = match raster {
                CliRaster::RowOrderAware => RasterBackend::RowOrderAware,
                CliRaster::RawRowMajor => RasterBackend::RawRowMajor,
            };
        }
        if let Some(format) = cli.format {
            config.output_format = match format {
                CliOutputFormat::Png => OutputFormat::Png,
                CliOutputFormat::Jpeg => OutputFormat::Jpeg,
                CliOutputFormat::Tiff => OutputFormat::Tiff,
                CliOutputFormat::Webp => OutputFormat::WebP,
            };
        }
        if let Some(quality) = cli.jpeg_quality {
            config.jpeg_quality = quality;
        }
        if let Some(threads) = cli.threads {
            config.intra_threads = threads;
            config.inter_threads = threads;
        }
        if let Some(model_arg) = &cli.model {
            config.model_spec = model_spec_from_arg(model_arg);
        }
        config.debug |= cli.verbose >= 1;

        config.validate().context("Invalid configuration values")?;
        Ok(config)
    }
}

/// Interpret `--model`
///
/// URLs map to the cache ID they download into, `.onnx` files and existing
/// paths are external models, anything else is a cached model ID.
pub(crate) fn model_spec_from_arg(arg: &str) -> ModelSpec {
    if validate_model_url(arg).is_ok() {
        return ModelSpec::downloaded(ModelCache::url_to_model_id(arg));
    }

    let path = Path::new(arg);
    let is_onnx_file = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("onnx"));
    if is_onnx_file || path.exists() {
        ModelSpec::external(path)
    } else {
        ModelSpec::downloaded(arg)
    }
}

/// Map `--log-format`; JSON needs the `tracing-json` feature
pub(crate) fn tracing_format(format: CliLogFormat) -> Result<TracingFormat> {
    match format {
        CliLogFormat::Console => Ok(TracingFormat::Console),
        CliLogFormat::Plain => Ok(TracingFormat::Plain),
        #[cfg(feature = "tracing-json")]
        CliLogFormat::Json => Ok(TracingFormat::Json),
        #[cfg(not(feature = "tracing-json"))]
        CliLogFormat::Json => {
            anyhow::bail!("--log-format json requires the `tracing-json` feature")
        },
    }
}

/// `<dir>/<stem>_cutout.<ext>`, or `<stem>_mask.<ext>` for masks
pub(crate) fn default_output_path(input: &Path, format: OutputFormat, mask_only: bool) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let suffix = if mask_only { "mask" } else { "cutout" };
    let extension = OutputFormatHandler::get_extension(format);
    input
        .parent()
        .unwrap_or(Path::new(""))
        .join(format!("{stem}_{suffix}.{extension}"))
}
