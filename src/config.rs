//! Configuration types for background removal operations

use crate::error::{BgRemovalError, Result};
use crate::models::ModelSpec;
use crate::raster::RasterBackend;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Backend type enumeration for runtime selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// ONNX Runtime backend (supports GPU acceleration)
    #[default]
    Onnx,
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onnx => write!(f, "onnx"),
            Self::Tract => write!(f, "tract"),
        }
    }
}

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// JPEG (no transparency, cut-out areas become black)
    Jpeg,
    /// WebP with alpha channel transparency
    WebP,
    /// TIFF with alpha channel transparency
    Tiff,
    /// Raw RGBA8 pixel data (4 bytes per pixel)
    Rgba8,
}

/// Configuration for background removal operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Inference backend
    pub backend_type: BackendType,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// How inference output buffers are turned back into images
    pub raster_backend: RasterBackend,

    /// Model specification
    pub model_spec: ModelSpec,

    /// Output format
    pub output_format: OutputFormat,

    /// JPEG quality (0-100, only used for JPEG output)
    pub jpeg_quality: u8,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Enable debug mode (additional logging)
    pub debug: bool,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::default(),
            raster_backend: RasterBackend::default(),
            model_spec: ModelSpec::default(),
            output_format: OutputFormat::default(),
            jpeg_quality: 90,
            intra_threads: 0,
            inter_threads: 0,
            debug: false,
        }
    }
}

/// Upper bound for explicit thread counts
const MAX_THREADS: usize = 256;

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use bgremoval::{BackendType, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .backend_type(BackendType::Tract)
    ///     .num_threads(4)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.inter_threads, 2);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - Invalid JSON or invalid values
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BgRemovalError::file_io_error("read configuration file", path, &e))?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            BgRemovalError::invalid_config(format!(
                "Failed to parse configuration '{}': {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - JPEG quality above 100
    /// - Thread counts above 256
    ///
    /// # Examples
    /// ```rust
    /// use bgremoval::RemovalConfig;
    ///
    /// let mut config = RemovalConfig::default();
    /// assert!(config.validate().is_ok());
    ///
    /// config.jpeg_quality = 150;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.jpeg_quality > 100 {
            return Err(BgRemovalError::config_value_error(
                "JPEG quality",
                self.jpeg_quality,
                "0-100",
                Some(90),
            ));
        }

        for (name, threads) in [
            ("intra-op threads", self.intra_threads),
            ("inter-op threads", self.inter_threads),
        ] {
            if threads > MAX_THREADS {
                return Err(BgRemovalError::config_value_error(
                    name,
                    threads,
                    "0-256 (0 = auto)",
                    Some(0),
                ));
            }
        }

        Ok(())
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn raster_backend(mut self, raster_backend: RasterBackend) -> Self {
        self.config.raster_backend = raster_backend;
        self
    }

    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Set JPEG quality, clamped to 100
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.min(100);
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Set both thread counts: `threads` intra-op and half as many inter-op
    /// (at least 1); 0 leaves both on auto
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any error from [`RemovalConfig::validate`]
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelSource;

    #[test]
    fn test_default_config() {
        let config = RemovalConfig::default();
        assert_eq!(config.backend_type, BackendType::Onnx);
        assert_eq!(config.execution_provider, ExecutionProvider::Auto);
        assert_eq!(config.raster_backend, RasterBackend::RowOrderAware);
        assert_eq!(config.output_format, OutputFormat::Png);
        assert_eq!(config.jpeg_quality, 90);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RemovalConfig::builder()
            .backend_type(BackendType::Tract)
            .raster_backend(RasterBackend::RawRowMajor)
            .jpeg_quality(150)
            .num_threads(8)
            .debug(true)
            .build()
            .unwrap();

        assert_eq!(config.backend_type, BackendType::Tract);
        assert_eq!(config.raster_backend, RasterBackend::RawRowMajor);
        assert_eq!(config.jpeg_quality, 100);
        assert_eq!(config.intra_threads, 8);
        assert_eq!(config.inter_threads, 4);
        assert!(config.debug);
    }

    #[test]
    fn test_validation_rejects_out_of_range() {
        let config = RemovalConfig {
            jpeg_quality: 101,
            ..RemovalConfig::default()
        };
        assert!(matches!(config.validate(), Err(BgRemovalError::InvalidConfig(_))));

        let result = RemovalConfig::builder().intra_threads(1000).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_serde_uses_lowercase_names() {
        let config = RemovalConfig::builder()
            .execution_provider(ExecutionProvider::CoreMl)
            .build()
            .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains(r#""execution_provider":"coreml""#));
        assert!(json.contains(r#""raster_backend":"row-order-aware""#));

        let parsed: RemovalConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"backend_type": "tract", "model_spec": {"source": {"External": "/models/u2netp.onnx"}}}"#,
        )
        .unwrap();

        let config = RemovalConfig::from_json_file(&path).unwrap();
        assert_eq!(config.backend_type, BackendType::Tract);
        assert_eq!(
            config.model_spec.source,
            ModelSource::External("/models/u2netp.onnx".into())
        );
        assert_eq!(config.jpeg_quality, 90);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ExecutionProvider::CoreMl.to_string(), "coreml");
        assert_eq!(BackendType::Tract.to_string(), "tract");
        assert_eq!(RasterBackend::RawRowMajor.to_string(), "raw-row-major");
    }
}
