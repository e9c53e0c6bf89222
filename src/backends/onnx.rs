//! ONNX Runtime backend for saliency models
//!
//! Runs the model through ONNX Runtime with CPU, CUDA or `CoreML` execution
//! providers. Input buffers are normalised with the model's preprocessing
//! statistics and the first output tensor is turned back into a mask buffer.

use crate::config::{ExecutionProvider, RemovalConfig};
use crate::error::{BgRemovalError, Result};
use crate::inference::{check_input_size, InferenceBackend};
use crate::models::{ModelInfo, ModelManager};
use crate::pixel_buffer::PixelBuffer;
use instant::{Duration, Instant};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{
    builder::{GraphOptimizationLevel, SessionBuilder},
    Session,
};
use ort::value::Value;

/// ONNX Runtime backend for running background removal models
#[derive(Debug, Default)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl OnnxBackend {
    /// List all ONNX Runtime execution providers with availability status and descriptions
    ///
    /// # Examples
    /// ```rust
    /// use bgremoval::backends::OnnxBackend;
    ///
    /// for (name, available, description) in OnnxBackend::list_providers() {
    ///     println!("{}: {} - {}", name, if available { "✅" } else { "❌" }, description);
    /// }
    /// ```
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        log::debug!("🔍 Checking execution provider availability");
        log::debug!("  - Platform: {}", std::env::consts::OS);
        log::debug!("  - Architecture: {}", std::env::consts::ARCH);

        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Create a backend that resolves its model from the configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend for an already resolved model
    #[must_use]
    pub fn with_model_manager(model_manager: ModelManager) -> Self {
        Self {
            session: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
    }

    fn configure_providers(
        session_builder: SessionBuilder,
        provider: ExecutionProvider,
    ) -> Result<SessionBuilder> {
        let cuda = CUDAExecutionProvider::default();
        let cuda_available = OrtExecutionProvider::is_available(&cuda).unwrap_or(false);
        let coreml = CoreMLExecutionProvider::default().with_subgraphs(true);
        let coreml_available = OrtExecutionProvider::is_available(&coreml).unwrap_or(false);

        let providers = match provider {
            ExecutionProvider::Cpu => {
                log::info!("Using CPU execution provider");
                Vec::new()
            },
            ExecutionProvider::Auto => {
                let mut providers = Vec::new();
                if cuda_available {
                    log::info!("🚀 CUDA execution provider is available and will be used");
                    providers.push(cuda.build());
                }
                if coreml_available {
                    log::info!("🍎 CoreML execution provider is available and will be used");
                    providers.push(coreml.build());
                }
                if providers.is_empty() {
                    log::warn!("⚠️ No hardware acceleration available, falling back to CPU");
                }
                providers
            },
            ExecutionProvider::Cuda if cuda_available => {
                log::info!("Using CUDA execution provider");
                vec![cuda.build()]
            },
            ExecutionProvider::CoreMl if coreml_available => {
                log::info!("🍎 Using CoreML execution provider (explicitly requested)");
                vec![coreml.build()]
            },
            ExecutionProvider::Cuda | ExecutionProvider::CoreMl => {
                log::warn!("{provider} execution provider requested but not available, falling back to CPU");
                Vec::new()
            },
        };

        if providers.is_empty() {
            return Ok(session_builder);
        }
        session_builder
            .with_execution_providers(providers)
            .map_err(|e| BgRemovalError::model(format!("Failed to set execution providers: {e}")))
    }

    fn load_model(&mut self, config: &RemovalConfig) -> Result<Duration> {
        let model_load_start = Instant::now();

        if self.model_manager.is_none() {
            self.model_manager = Some(ModelManager::from_spec(&config.model_spec)?);
        }
        let model_manager = self
            .model_manager
            .as_ref()
            .ok_or_else(|| BgRemovalError::internal("Model manager missing after resolution"))?;

        let model_data = model_manager.load_model()?;

        let session_builder = Session::builder()
            .map_err(|e| BgRemovalError::model(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                BgRemovalError::model(format!("Failed to set optimization level: {e}"))
            })?;
        let session_builder = Self::configure_providers(session_builder, config.execution_provider)?;

        let available = std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(8);
        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            available
        };
        let inter_threads = if config.inter_threads > 0 {
            config.inter_threads
        } else {
            (available / 4).max(1)
        };

        let session = session_builder
            .with_parallel_execution(true)
            .map_err(|e| BgRemovalError::model(format!("Failed to enable parallel execution: {e}")))?
            .with_intra_threads(intra_threads)
            .map_err(|e| BgRemovalError::model(format!("Failed to set intra threads: {e}")))?
            .with_inter_threads(inter_threads)
            .map_err(|e| BgRemovalError::model(format!("Failed to set inter threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                BgRemovalError::model(format!("Failed to create session from model data: {e}"))
            })?;

        let model_info = model_manager.info();
        log::debug!("✅ ONNX Runtime session created successfully");
        log::debug!("  - Requested provider: {}", config.execution_provider);
        log::debug!(
            "  - Threading: {intra_threads} intra-op threads, {inter_threads} inter-op threads"
        );
        log::debug!(
            "  - Model: {} ({}x{} -> {}x{})",
            model_info.name,
            model_info.input_size.0,
            model_info.input_size.1,
            model_info.output_size.0,
            model_info.output_size.1
        );
        #[allow(clippy::cast_precision_loss)]
        let size_mb = model_info.size_bytes as f64 / (1024.0 * 1024.0);
        log::debug!("  - Model size: {size_mb:.2} MB");

        self.session = Some(session);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "📊 Model loading complete: {:.0}ms",
            model_load_time.as_secs_f64() * 1000.0
        );
        Ok(model_load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }

        let model_load_time = self.load_model(config)?;
        Ok(Some(model_load_time))
    }

    fn infer(&mut self, input: &PixelBuffer) -> Result<PixelBuffer> {
        if !self.initialized {
            return Err(BgRemovalError::inference("Backend not initialized"));
        }
        check_input_size(input, self.input_size())?;

        let preprocessing = self
            .model_manager
            .as_ref()
            .map(|manager| *manager.preprocessing_config())
            .unwrap_or_default();
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| BgRemovalError::inference("ONNX session not initialized"))?;

        let inference_start = Instant::now();
        let tensor = input.to_rgb_tensor(&preprocessing);
        log::debug!("🚀 Starting inference with input shape: {:?}", tensor.dim());

        let input_value = Value::from_array(tensor)
            .map_err(|e| BgRemovalError::inference(format!("Failed to convert input tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| BgRemovalError::inference(format!("ONNX inference failed: {e}")))?;

        let output_tensor = {
            let keys: Vec<_> = outputs.keys().collect();
            let first_key = keys
                .first()
                .ok_or_else(|| BgRemovalError::inference("No output tensors found"))?;
            outputs
                .get(first_key)
                .ok_or_else(|| BgRemovalError::inference("First output tensor not found"))?
                .try_extract_array::<f32>()
                .map_err(|e| {
                    BgRemovalError::inference(format!("Failed to extract output tensor: {e}"))
                })?
        };

        let output_shape = output_tensor.shape().to_vec();
        let &[batch, channels, height, width] = output_shape.as_slice() else {
            return Err(BgRemovalError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )));
        };
        let output_array = Array4::from_shape_vec(
            (batch, channels, height, width),
            output_tensor.to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| BgRemovalError::inference(format!("Failed to reshape output tensor: {e}")))?;

        let mask = PixelBuffer::from_mask_tensor(&output_array, input.row_order())?;
        log::debug!(
            "📊 Inference complete: {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(mask)
    }

    fn input_size(&self) -> (u32, u32) {
        self.model_manager
            .as_ref()
            .map_or(ModelInfo::DEFAULT_RESOLUTION, |manager| manager.info().input_size)
    }

    fn output_size(&self) -> (u32, u32) {
        self.model_manager
            .as_ref()
            .map_or(ModelInfo::DEFAULT_RESOLUTION, |manager| manager.info().output_size)
    }

    fn model_info(&self) -> Result<ModelInfo> {
        self.model_manager
            .as_ref()
            .map(|manager| manager.info().clone())
            .ok_or_else(|| BgRemovalError::model("No model associated with the ONNX backend"))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}
