//! Background removal processor
//!
//! `BackgroundRemovalProcessor` owns one inference backend and runs the
//! seven-stage pipeline on the calling thread:
//!
//! 1. square normalization (aspect-fit into `max(w, h)`²)
//! 2. stretch to the model input resolution
//! 3. rasterization into a bottom-up ARGB32 buffer
//! 4. inference
//! 5. mask rescale onto the square, with orientation correction when the
//!    raster backend needs it
//! 6. mask inversion
//! 7. stencil compositing over the normalized original
//!
//! Every intermediate image is private to one call. The first failing stage
//! aborts the call and no partial image is returned.

use crate::{
    compose::{self, MaskRescaler, MaskStatistics},
    config::{BackendType, RemovalConfig},
    error::{BgRemovalError, Result},
    geometry::{ScalingMode, Size},
    inference::InferenceBackend,
    models::ModelManager,
    pixel_buffer::PixelBufferAdapter,
    raster::Drawable,
    types::{ProcessingTimings, RemovalResult},
    utils::ImagePreprocessor,
};
use instant::Instant;
use tracing::{debug, info, instrument, span, Level};

/// Factory trait for creating inference backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance of the specified type with the given model manager
    ///
    /// # Errors
    /// - Backend type not compiled in
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Backend factory for the backends enabled at compile time
#[derive(Debug, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::with_model_manager(
                model_manager,
            ))),
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(crate::backends::TractBackend::with_model_manager(
                model_manager,
            ))),
            #[allow(unreachable_patterns)]
            other => {
                drop(model_manager);
                Err(BgRemovalError::invalid_config(format!(
                    "The {other} backend is not available; enable the `{other}` feature"
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        #[cfg_attr(not(any(feature = "onnx", feature = "tract")), allow(unused_mut))]
        let mut backends = Vec::new();
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        backends
    }
}

/// Runs the background removal pipeline against one inference backend
pub struct BackgroundRemovalProcessor {
    config: RemovalConfig,
    backend_factory: Box<dyn BackendFactory>,
    backend: Option<Box<dyn InferenceBackend>>,
    /// Model load time not yet reported in a result
    pending_model_load_ms: u64,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalProcessor {
    /// Create a processor with the default backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: RemovalConfig) -> Result<Self> {
        Self::with_factory(config, Box::new(DefaultBackendFactory))
    }

    /// Create a processor with a custom backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_factory(
        config: RemovalConfig,
        backend_factory: Box<dyn BackendFactory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend_factory,
            backend: None,
            pending_model_load_ms: 0,
        })
    }

    /// Create a processor around an existing backend
    ///
    /// The backend is still initialized lazily with `config`.
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_backend(config: RemovalConfig, backend: Box<dyn InferenceBackend>) -> Result<Self> {
        let mut processor = Self::new(config)?;
        processor.backend = Some(backend);
        Ok(processor)
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.backend
            .as_ref()
            .is_some_and(|backend| backend.is_initialized())
    }

    /// Resolve the model, create the backend and load it
    ///
    /// Calling this again after success is a no-op.
    ///
    /// # Errors
    /// - `Model` when the model cannot be found or loaded
    /// - `InvalidConfig` when the configured backend is not compiled in
    pub fn initialize(&mut self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        info!(
            backend = %self.config.backend_type,
            model = %self.config.model_spec.source.display_name(),
            "Initializing background removal processor"
        );

        if self.backend.is_none() {
            let model_manager = ModelManager::from_spec(&self.config.model_spec)?;
            let backend = self
                .backend_factory
                .create_backend(self.config.backend_type, model_manager)?;
            self.backend = Some(backend);
        }

        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| BgRemovalError::internal("Backend missing after creation"))?;
        if let Some(load_time) = backend.initialize(&self.config)? {
            self.pending_model_load_ms = load_time.as_millis() as u64;
            debug!(model_load_ms = self.pending_model_load_ms, "Model loaded");
        }

        Ok(())
    }

    /// Remove the background from `image`
    ///
    /// The result is sized to the square `max(w, h)`² the input is
    /// normalized into. With `mask_only` the subject mask (white = subject)
    /// is returned instead of the cutout.
    ///
    /// # Errors
    /// - `BufferAllocation` when a buffer or surface cannot be allocated
    /// - `Model` when lazy initialization fails
    /// - `Inference` when the backend fails or produces no output
    /// - `Rendering` when a drawing step yields no image, including empty inputs
    #[instrument(
        skip(self, image),
        fields(
            backend = %self.config.backend_type,
            raster = %self.config.raster_backend,
            width = image.width(),
            height = image.height()
        )
    )]
    pub fn remove_background<D: Drawable + ?Sized>(
        &mut self,
        image: &D,
        mask_only: bool,
    ) -> Result<RemovalResult> {
        let original_dimensions = (image.width(), image.height());
        if original_dimensions.0 == 0 || original_dimensions.1 == 0 {
            return Err(BgRemovalError::processing_stage_error(
                "geometry",
                "input image is empty",
                Some(&format!("{}x{}", original_dimensions.0, original_dimensions.1)),
            ));
        }

        self.initialize()?;

        let total_start = Instant::now();
        let mut timings = ProcessingTimings {
            model_load_ms: std::mem::take(&mut self.pending_model_load_ms),
            ..ProcessingTimings::default()
        };

        // 1. square normalization
        let stage = Instant::now();
        let square = Size::square_bounding(f64::from(image.width()), f64::from(image.height()));
        let normalized = {
            let _span = span!(Level::DEBUG, "geometry", side = square.width).entered();
            ImagePreprocessor::scaled(image, square, ScalingMode::AspectFit)?
        };
        timings.geometry_ms = elapsed_ms(stage);

        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| BgRemovalError::internal("Backend missing after initialization"))?;

        // 2. model input resize
        let stage = Instant::now();
        let (input_width, input_height) = backend.input_size();
        let resized = {
            let _span =
                span!(Level::DEBUG, "resize", width = input_width, height = input_height).entered();
            ImagePreprocessor::resize_image(&normalized, input_width, input_height)?
        };
        timings.resize_ms = elapsed_ms(stage);

        // 3. pixel buffer
        let stage = Instant::now();
        let input_buffer = {
            let _span = span!(Level::DEBUG, "rasterize").entered();
            PixelBufferAdapter::rasterize(&resized)?
        };
        drop(resized);
        timings.rasterize_ms = elapsed_ms(stage);

        // 4. inference
        let stage = Instant::now();
        let mask_buffer = {
            let _span = span!(Level::INFO, "inference").entered();
            backend.infer(&input_buffer)?
        };
        timings.inference_ms = elapsed_ms(stage);

        // 5. mask rescale
        let stage = Instant::now();
        let graphics = self.config.raster_backend.backend();
        let mask = {
            let _span = span!(
                Level::DEBUG,
                "mask_rescale",
                graphics = graphics.name(),
                correction = graphics.requires_orientation_correction()
            )
            .entered();
            let raw_mask = graphics.image_from_buffer(&mask_buffer)?;
            MaskRescaler::rescale(&raw_mask, square, graphics.requires_orientation_correction())?
        };
        timings.mask_rescale_ms = elapsed_ms(stage);

        if self.config.debug {
            let stats = MaskStatistics::of(&mask);
            debug!(
                foreground_ratio = stats.foreground_ratio,
                foreground_pixels = stats.foreground_pixels,
                "Mask coverage"
            );
        }

        let square_side = mask.width();
        let output = if mask_only {
            mask
        } else {
            // 6. inversion, 7. compositing
            let stage = Instant::now();
            let _span = span!(Level::DEBUG, "composite").entered();
            let cut = compose::inverted(&mask);
            let output = compose::mask_image(&normalized, &cut)?;
            timings.composite_ms = elapsed_ms(stage);
            output
        };

        timings.total_ms = elapsed_ms(total_start) + timings.model_load_ms;
        info!(
            total_ms = timings.total_ms,
            inference_ms = timings.inference_ms,
            mask_only,
            "Background removal complete"
        );

        Ok(RemovalResult {
            image: output,
            square_size: square_side,
            original_dimensions,
            mask_only,
            timings,
        })
    }

    /// Decode `image_bytes` and remove its background
    ///
    /// # Errors
    /// - `Image` when the bytes cannot be decoded
    /// - Any error from [`Self::remove_background`]
    pub fn process_bytes(&mut self, image_bytes: &[u8], mask_only: bool) -> Result<RemovalResult> {
        let image = image::load_from_memory(image_bytes)?;
        self.remove_background(&image, mask_only)
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
