#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

//! # bgremoval
//!
//! Background removal driven by a salient-object segmentation model
//! (U²-Net-p exported to ONNX), with ONNX Runtime and Tract backends.
//!
//! An input image goes through seven stages:
//!
//! 1. aspect-fit into a square of side `max(w, h)`
//! 2. stretch to the model input resolution
//! 3. rasterize into a bottom-up ARGB32 pixel buffer
//! 4. run the model, which returns a saliency mask
//! 5. scale the mask back onto the square, correcting orientation for raster
//!    backends that ignore the buffer's row order
//! 6. invert the mask
//! 7. use the inverted mask as a stencil over the normalized original
//!
//! The result is always square; letterboxed regions stay transparent.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremoval::{remove_background_from_bytes, ModelSpec, RemovalConfig};
//!
//! # fn example(upload: &[u8]) -> anyhow::Result<()> {
//! let config = RemovalConfig::builder()
//!     .model_spec(ModelSpec::external("models/u2netp.onnx"))
//!     .build()?;
//! let result = remove_background_from_bytes(upload, false, &config)?;
//! result.save_png("cutout.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! Models are not bundled. Use an external `.onnx` file or fetch one into
//! the cache with [`ModelDownloader`].
//!
//! ## Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend with CUDA and `CoreML` providers
//! - `tract` (default): pure Rust backend
//! - `cli` (default): the `bgremoval` binary and [`TracingConfig`]
//! - `webp-support`: WebP output
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
pub mod cache;
pub mod canvas;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compose;
pub mod config;
pub mod download;
pub mod error;
pub mod geometry;
pub mod inference;
pub mod models;
pub mod pixel_buffer;
pub mod processor;
pub mod raster;
pub mod services;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use tokio::io::{AsyncRead, AsyncReadExt};

// Public API exports
#[cfg(feature = "onnx")]
pub use backends::OnnxBackend;
#[cfg(feature = "tract")]
pub use backends::TractBackend;
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use compose::{mask_image, MaskRescaler, MaskStatistics};
pub use config::{BackendType, ExecutionProvider, OutputFormat, RemovalConfig, RemovalConfigBuilder};
pub use download::{validate_model_url, verify_cached_model, ModelDownloader, DEFAULT_MODEL_URL};
pub use error::{BgRemovalError, Result};
pub use geometry::{ScalingMode, Size};
pub use inference::InferenceBackend;
pub use models::{ModelInfo, ModelManager, ModelSource, ModelSpec, PreprocessingConfig};
pub use pixel_buffer::{PixelBuffer, PixelBufferAdapter, PixelFormat, RowOrder};
pub use processor::{BackendFactory, BackgroundRemovalProcessor, DefaultBackendFactory};
pub use raster::{Drawable, GraphicsBackend, RasterBackend};
pub use services::OutputFormatHandler;
pub use types::{ProcessingTimings, RemovalResult};
pub use utils::ImagePreprocessor;

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Remove the background from an in-memory image
///
/// Builds a one-shot [`BackgroundRemovalProcessor`], so the model is loaded
/// on every call. Keep a processor around when handling several images.
///
/// # Examples
/// ```rust,no_run
/// use bgremoval::{remove_background, RemovalConfig};
///
/// # fn example() -> anyhow::Result<()> {
/// let image = image::open("portrait.jpg")?;
/// let mask = remove_background(&image, true, &RemovalConfig::default())?;
/// mask.save_png("portrait_mask.png")?;
/// # Ok(())
/// # }
/// ```
pub fn remove_background<D: Drawable + ?Sized>(
    image: &D,
    mask_only: bool,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(config.clone())?;
    processor.remove_background(image, mask_only)
}

/// Remove the background from encoded image bytes (PNG, JPEG, TIFF)
pub fn remove_background_from_bytes(
    image_bytes: &[u8],
    mask_only: bool,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(config.clone())?;
    processor.process_bytes(image_bytes, mask_only)
}

/// Remove the background from an async byte stream
///
/// The stream is read to the end, then the pipeline runs on a blocking
/// worker thread.
///
/// # Examples
/// ```rust,no_run
/// use bgremoval::{remove_background_from_reader, RemovalConfig};
/// use tokio::fs::File;
///
/// # async fn example() -> anyhow::Result<()> {
/// let file = File::open("input.jpg").await?;
/// let result = remove_background_from_reader(file, false, &RemovalConfig::default()).await?;
/// result.save_png("output.png")?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    mask_only: bool,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer).await?;

    let config = config.clone();
    tokio::task::spawn_blocking(move || remove_background_from_bytes(&buffer, mask_only, &config))
        .await
        .map_err(|e| BgRemovalError::internal(format!("Background removal task failed: {e}")))?
}
