//! Error types for background removal operations

use thiserror::Error;

/// Result type alias for background removal operations
pub type Result<T> = std::result::Result<T, BgRemovalError>;

/// Error types for background removal operations
///
/// The first four variants are the pipeline failure kinds. Every stage of
/// [`crate::processor::BackgroundRemovalProcessor::remove_background`] aborts
/// with one of them and never returns a partially composited image.
#[derive(Error, Debug)]
pub enum BgRemovalError {
    /// A pixel buffer or off-screen surface could not be allocated
    #[error("Buffer allocation failed: {0}")]
    BufferAllocation(String),

    /// Model loading or initialization errors
    #[error("Model error: {0}")]
    Model(String),

    /// Backend inference errors, including a backend that produced no output
    #[error("Inference error: {0}")]
    Inference(String),

    /// A drawing or rasterization step yielded no image
    #[error("Rendering error: {0}")]
    Rendering(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Model download errors
    #[error("Network error: {0}")]
    Network(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BgRemovalError {
    /// Create a new buffer allocation error
    pub fn buffer_allocation<S: Into<String>>(msg: S) -> Self {
        Self::BufferAllocation(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new rendering error
    pub fn rendering<S: Into<String>>(msg: S) -> Self {
        Self::Rendering(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create network error with the failing operation
    pub fn network_error<E: std::fmt::Display>(operation: impl Into<String>, error: E) -> Self {
        Self::Network(format!("{}: {error}", operation.into()))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {rec}"),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {parameter}: {value} (valid range: {valid_range}).{recommendation}"
        ))
    }

    /// Create rendering error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {info})"),
            None => String::new(),
        };

        Self::Rendering(format!(
            "Processing failed at stage '{stage}'{input_context}: {details}"
        ))
    }

    /// Short machine-readable name of the failure kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BufferAllocation(_) => "buffer_allocation",
            Self::Model(_) => "model",
            Self::Inference(_) => "inference",
            Self::Rendering(_) => "rendering",
            Self::Io(_) => "io",
            Self::Image(_) => "image",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Network(_) => "network",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = BgRemovalError::invalid_config("test config error");
        assert!(matches!(err, BgRemovalError::InvalidConfig(_)));

        let err = BgRemovalError::buffer_allocation("320x320 ARGB");
        assert!(matches!(err, BgRemovalError::BufferAllocation(_)));
        assert_eq!(err.kind(), "buffer_allocation");
    }

    #[test]
    fn test_error_display() {
        let err = BgRemovalError::inference("model produced no output");
        assert_eq!(err.to_string(), "Inference error: model produced no output");

        let err = BgRemovalError::rendering("zero-sized canvas");
        assert_eq!(err.to_string(), "Rendering error: zero-sized canvas");
    }

    #[test]
    fn test_pipeline_kinds_are_distinct() {
        let kinds = [
            BgRemovalError::buffer_allocation("a").kind(),
            BgRemovalError::model("b").kind(),
            BgRemovalError::inference("c").kind(),
            BgRemovalError::rendering("d").kind(),
        ];
        for (i, a) in kinds.iter().enumerate() {
            for b in kinds.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = BgRemovalError::file_io_error("read model", Path::new("/models/u2netp.onnx"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("read model"));
        assert!(error_string.contains("/models/u2netp.onnx"));

        let err = BgRemovalError::config_value_error("JPEG quality", 150, "0-100", Some(90));
        let error_string = err.to_string();
        assert!(error_string.contains("JPEG quality"));
        assert!(error_string.contains("150"));
        assert!(error_string.contains("Recommended: 90"));

        let err = BgRemovalError::processing_stage_error(
            "mask_rescale",
            "empty mask",
            Some("400x300"),
        );
        let error_string = err.to_string();
        assert!(error_string.contains("mask_rescale"));
        assert!(error_string.contains("400x300"));
        assert!(matches!(err, BgRemovalError::Rendering(_)));
    }
}
