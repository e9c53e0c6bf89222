//! Tract backend for saliency models
//!
//! Pure Rust inference: no native runtime is needed, at the cost of CPU-only
//! execution. The input fact is pinned to the model's declared resolution so
//! Tract can fully optimise the graph up front.

use crate::config::RemovalConfig;
use crate::error::{BgRemovalError, Result};
use crate::inference::{check_input_size, InferenceBackend};
use crate::models::{ModelInfo, ModelManager};
use crate::pixel_buffer::PixelBuffer;
use instant::{Duration, Instant};
use ndarray::Array4;
use tract_onnx::prelude::*;

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running background removal models using pure Rust inference
#[derive(Debug, Default)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: Option<ModelManager>,
    initialized: bool,
}

impl TractBackend {
    /// Tract only ever runs on the CPU
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![(
            "CPU".to_string(),
            true,
            "Pure Rust CPU inference with no external dependencies".to_string(),
        )]
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
            model: None,
            model_manager: Some(model_manager),
            initialized: false,
        }
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
        let model_info = model_manager.info();
        let (width, height) = model_info.input_size;

        log::info!("🚀 Initializing Tract Backend");
        log::info!("🧠 Model: {}", model_info.name);
        #[allow(clippy::cast_precision_loss)]
        let size_mb = model_info.size_bytes as f64 / (1024.0 * 1024.0);
        log::info!("📏 Model size: {size_mb:.2} MB");

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| BgRemovalError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, height as usize, width as usize]).into())
            .map_err(|e| BgRemovalError::model(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| BgRemovalError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| BgRemovalError::model(format!("Failed to create runnable model: {e}")))?;

        self.model = Some(model);
        self.initialized = true;

        let model_load_time = model_load_start.elapsed();
        log::info!(
            "✅ Tract backend initialized in {}ms",
            model_load_time.as_millis()
        );
        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
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
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| BgRemovalError::inference("Tract model not initialized"))?;

        let inference_start = Instant::now();
        let tensor = input.to_rgb_tensor(&preprocessing);
        log::debug!("🔮 Running Tract inference on {:?}", tensor.shape());

        let outputs = model
            .run(tvec![Tensor::from(tensor).into()])
            .map_err(|e| BgRemovalError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgRemovalError::inference("No output tensor found"))?
            .into_arc_tensor();
        let output_data = output_tensor.to_array_view::<f32>().map_err(|e| {
            BgRemovalError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let &[batch, channels, height, width] = output_data.shape() else {
            return Err(BgRemovalError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_data.ndim()
            )));
        };
        let output_array = Array4::from_shape_vec(
            (batch, channels, height, width),
            output_data.to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| BgRemovalError::inference(format!("Failed to reshape output tensor: {e}")))?;

        let mask = PixelBuffer::from_mask_tensor(&output_array, input.row_order())?;
        log::debug!(
            "✅ Tract inference completed in {}ms",
            inference_start.elapsed().as_millis()
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
            .ok_or_else(|| BgRemovalError::model("No model associated with the Tract backend"))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelSpec;
    use crate::pixel_buffer::{PixelFormat, RowOrder};

    #[test]
    fn test_tract_backend_creation() {
        let backend = TractBackend::new();
        assert!(!backend.is_initialized());
        assert_eq!(backend.input_size(), (320, 320));
        assert_eq!(backend.output_size(), (320, 320));
        assert!(backend.model_info().is_err());
    }

    #[test]
    fn test_list_providers() {
        let providers = TractBackend::list_providers();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].0, "CPU");
    }

    #[test]
    fn test_infer_before_initialize_fails() {
        let mut backend = TractBackend::new();
        let input = PixelBuffer::allocate(320, 320, PixelFormat::Argb32, RowOrder::BottomUp).unwrap();
        assert!(matches!(backend.infer(&input), Err(BgRemovalError::Inference(_))));
    }

    #[test]
    fn test_invalid_model_file_fails_to_load() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("model.onnx");
        std::fs::write(&path, b"not an onnx graph").unwrap();

        let config = RemovalConfig::builder()
            .model_spec(ModelSpec::external(&path))
            .build()
            .unwrap();
        let mut backend = TractBackend::new();
        assert!(matches!(backend.initialize(&config), Err(BgRemovalError::Model(_))));
        assert!(!backend.is_initialized());
    }
}
