//! Mock backends for testing the pipeline without model files

use crate::{
    config::RemovalConfig,
    error::{BgRemovalError, Result},
    inference::{check_input_size, InferenceBackend},
    models::ModelInfo,
    pixel_buffer::PixelBuffer,
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

/// What a [`MockBackend`] does when called
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Output the luminance of the input, so bright subjects become salient
    EchoLuminance,
    /// Output a soft centered disc through the tensor path
    Saliency,
    /// Fail in `initialize`
    FailInit,
    /// Fail in `infer` as if the model produced no output
    FailInference,
}

/// Mock backend for testing
#[derive(Debug, Clone)]
pub struct MockBackend {
    behavior: MockBehavior,
    initialized: bool,
    model_info: ModelInfo,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    #[must_use]
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            initialized: false,
            model_info: ModelInfo {
                name: format!("mock-{behavior:?}").to_lowercase(),
                size_bytes: 1024 * 1024,
                input_size: ModelInfo::DEFAULT_RESOLUTION,
                output_size: ModelInfo::DEFAULT_RESOLUTION,
            },
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Use a different input/output resolution
    #[must_use]
    pub fn with_resolution(mut self, input: (u32, u32), output: (u32, u32)) -> Self {
        self.model_info.input_size = input;
        self.model_info.output_size = output;
        self
    }

    /// Shared handle on the recorded method calls
    #[must_use]
    pub fn call_history(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_history)
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    fn echo_luminance(&self, input: &PixelBuffer) -> Result<PixelBuffer> {
        let (width, height) = self.model_info.output_size;
        if (width, height) != (input.width(), input.height()) {
            return Err(BgRemovalError::inference(
                "Luminance echo needs matching input and output sizes",
            ));
        }

        let mut values = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let [_, r, g, b] = input.pixel(x, y).unwrap_or_default();
                let luma = (299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b) + 500) / 1000;
                values.push(luma as u8);
            }
        }
        PixelBuffer::from_gray(width, height, &values, input.row_order())
    }

    #[allow(clippy::indexing_slicing)]
    fn saliency_disc(&self, input: &PixelBuffer) -> Result<PixelBuffer> {
        let (width, height) = self.model_info.output_size;
        let (w, h) = (width as usize, height as usize);
        let mut output = Array4::<f32>::zeros((1, 1, h, w));

        let center_x = w as f32 / 2.0;
        let center_y = h as f32 / 2.0;
        let radius = (w.min(h) as f32 / 3.0).max(1.0);

        for y in 0..h {
            for x in 0..w {
                let dx = x as f32 + 0.5 - center_x;
                let dy = y as f32 + 0.5 - center_y;
                let distance = (dx * dx + dy * dy).sqrt();
                output[[0, 0, y, x]] = ((radius - distance) / radius).clamp(0.0, 1.0);
            }
        }

        PixelBuffer::from_mask_tensor(&output, input.row_order())
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.behavior == MockBehavior::FailInit {
            return Err(BgRemovalError::model("Mock backend failed to load its model"));
        }
        if self.initialized {
            return Ok(None);
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &PixelBuffer) -> Result<PixelBuffer> {
        self.record_call("infer");

        if !self.initialized {
            return Err(BgRemovalError::inference("Backend not initialized"));
        }
        check_input_size(input, self.model_info.input_size)?;

        match self.behavior {
            MockBehavior::EchoLuminance => self.echo_luminance(input),
            MockBehavior::Saliency => self.saliency_disc(input),
            MockBehavior::FailInference => Err(BgRemovalError::inference(
                "Mock backend returned no result",
            )),
            MockBehavior::FailInit => Err(BgRemovalError::inference("Backend not initialized")),
        }
    }

    fn input_size(&self) -> (u32, u32) {
        self.model_info.input_size
    }

    fn output_size(&self) -> (u32, u32) {
        self.model_info.output_size
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(self.model_info.clone())
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_buffer::{PixelFormat, RowOrder};

    #[test]
    fn test_infer_before_initialize_fails() {
        let mut backend = MockBackend::new(MockBehavior::EchoLuminance);
        let input = PixelBuffer::allocate(320, 320, PixelFormat::Argb32, RowOrder::BottomUp).unwrap();
        assert!(matches!(backend.infer(&input), Err(BgRemovalError::Inference(_))));
    }

    #[test]
    fn test_call_history_is_recorded() {
        let mut backend = MockBackend::new(MockBehavior::Saliency).with_resolution((8, 8), (4, 4));
        let history = backend.call_history();
        backend.initialize(&RemovalConfig::default()).unwrap();

        let input = PixelBuffer::allocate(8, 8, PixelFormat::Argb32, RowOrder::BottomUp).unwrap();
        let output = backend.infer(&input).unwrap();
        assert_eq!((output.width(), output.height()), (4, 4));
        assert_eq!(*history.lock().unwrap(), ["initialize", "infer"]);
    }

    #[test]
    fn test_saliency_disc_is_bright_in_center() {
        let mut backend = MockBackend::new(MockBehavior::Saliency);
        backend.initialize(&RemovalConfig::default()).unwrap();
        let input = PixelBuffer::allocate(320, 320, PixelFormat::Argb32, RowOrder::BottomUp).unwrap();
        let output = backend.infer(&input).unwrap();

        assert!(output.pixel(160, 160).unwrap()[1] > 240);
        assert_eq!(output.pixel(0, 0).unwrap()[1], 0);
    }

    #[test]
    fn test_failure_modes() {
        let mut backend = MockBackend::new(MockBehavior::FailInit);
        assert!(matches!(
            backend.initialize(&RemovalConfig::default()),
            Err(BgRemovalError::Model(_))
        ));

        let mut backend = MockBackend::new(MockBehavior::FailInference);
        backend.initialize(&RemovalConfig::default()).unwrap();
        let input = PixelBuffer::allocate(320, 320, PixelFormat::Argb32, RowOrder::BottomUp).unwrap();
        assert!(matches!(backend.infer(&input), Err(BgRemovalError::Inference(_))));
    }
}
