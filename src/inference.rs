//! Inference backend abstraction

use crate::{
    config::RemovalConfig,
    error::Result,
    models::ModelInfo,
    pixel_buffer::PixelBuffer,
};

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
///
/// A backend consumes one fixed-size ARGB32 pixel buffer and returns one mask
/// buffer at the model's output resolution, or fails with no partial result.
/// The returned buffer carries the same row order as the input.
pub trait InferenceBackend: Send {
    /// Initialize the backend with the given configuration
    ///
    /// Returns the model load time, or `None` when already initialized.
    ///
    /// # Errors
    /// - Model loading or validation errors
    /// - Invalid configuration parameters
    fn initialize(&mut self, config: &RemovalConfig) -> Result<Option<Duration>>;

    /// Run inference on `input`
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Input buffer does not match [`InferenceBackend::input_size`]
    /// - Model execution failures or an empty output
    fn infer(&mut self, input: &PixelBuffer) -> Result<PixelBuffer>;

    /// Model input resolution as (width, height)
    fn input_size(&self) -> (u32, u32);

    /// Model output resolution as (width, height)
    fn output_size(&self) -> (u32, u32);

    /// Get model information for this backend
    ///
    /// # Errors
    /// - No model associated with the backend
    fn model_info(&self) -> Result<ModelInfo>;

    /// Check if backend is initialized
    fn is_initialized(&self) -> bool;
}

/// Reject inputs whose geometry does not match what the model expects
///
/// # Errors
/// - `Inference` on a size mismatch
#[cfg_attr(not(any(test, feature = "onnx", feature = "tract")), allow(dead_code))]
pub(crate) fn check_input_size(input: &PixelBuffer, expected: (u32, u32)) -> Result<()> {
    let actual = (input.width(), input.height());
    if actual != expected {
        return Err(crate::error::BgRemovalError::inference(format!(
            "Input buffer is {}x{}, model expects {}x{}",
            actual.0, actual.1, expected.0, expected.1
        )));
    }
    Ok(())
}
