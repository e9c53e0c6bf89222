//! Model location and metadata

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Model file name inside a model directory
pub const MODEL_FILE_NAME: &str = "model.onnx";

/// Optional metadata file stored next to the model
pub const SIDECAR_FILE_NAME: &str = "model.json";

/// Cache identifier of the default U²-Net-p export
pub const DEFAULT_MODEL_ID: &str = "u2netp";

/// Model source specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSource {
    /// `.onnx` file, or a directory holding `model.onnx`
    External(PathBuf),
    /// Downloaded model from cache by model ID
    Downloaded(String),
}

impl ModelSource {
    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::External(path) => {
                format!(
                    "external:{}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                )
            },
            ModelSource::Downloaded(model_id) => {
                format!("cached:{model_id}")
            },
        }
    }
}

/// Complete model specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub source: ModelSource,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            source: ModelSource::Downloaded(DEFAULT_MODEL_ID.to_string()),
        }
    }
}

impl ModelSpec {
    #[must_use]
    pub fn external<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            source: ModelSource::External(path.into()),
        }
    }

    #[must_use]
    pub fn downloaded<S: Into<String>>(model_id: S) -> Self {
        Self {
            source: ModelSource::Downloaded(model_id.into()),
        }
    }
}

/// Model information and metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: u64,
    /// Input resolution as (width, height)
    pub input_size: (u32, u32),
    /// Output resolution as (width, height)
    pub output_size: (u32, u32),
}

impl ModelInfo {
    /// U²-Net-p geometry
    pub const DEFAULT_RESOLUTION: (u32, u32) = (320, 320);
}

/// Input normalisation applied before inference
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessingConfig {
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        // ImageNet statistics
        Self {
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        }
    }
}

/// Contents of `model.json`
#[derive(Debug, Default, Deserialize)]
struct ModelSidecar {
    name: Option<String>,
    input_size: Option<[u32; 2]>,
    output_size: Option<[u32; 2]>,
    normalization_mean: Option<[f32; 3]>,
    normalization_std: Option<[f32; 3]>,
}

/// Model provider trait for loading models
pub trait ModelProvider: std::fmt::Debug + Send + Sync {
    /// Load model data as bytes
    ///
    /// # Errors
    /// - Model file not found or unreadable
    fn load_model_data(&self) -> Result<Vec<u8>>;

    fn model_info(&self) -> &ModelInfo;

    fn preprocessing_config(&self) -> &PreprocessingConfig;

    fn model_path(&self) -> &Path;
}

/// Model stored anywhere on the filesystem
#[derive(Debug)]
pub struct ExternalModelProvider {
    model_path: PathBuf,
    info: ModelInfo,
    preprocessing: PreprocessingConfig,
}

impl ExternalModelProvider {
    /// Resolve a model file or directory and read its optional sidecar
    ///
    /// # Errors
    /// - `Model` when no model file exists at `path`
    /// - `InvalidConfig` for a malformed `model.json`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let model_path = if path.is_dir() {
            path.join(MODEL_FILE_NAME)
        } else {
            path.to_path_buf()
        };

        let metadata = fs::metadata(&model_path).map_err(|e| {
            BgRemovalError::model(format!(
                "Model file not found at '{}': {e}",
                model_path.display()
            ))
        })?;
        if !metadata.is_file() {
            return Err(BgRemovalError::model(format!(
                "Model path is not a file: {}",
                model_path.display()
            )));
        }

        let sidecar = Self::read_sidecar(&model_path.with_file_name(SIDECAR_FILE_NAME))?;

        let default_name = model_path
            .parent()
            .filter(|_| model_path.file_name().is_some_and(|n| n == MODEL_FILE_NAME))
            .and_then(Path::file_name)
            .or_else(|| model_path.file_stem())
            .map_or_else(|| "model".to_string(), |n| n.to_string_lossy().into_owned());

        let defaults = PreprocessingConfig::default();
        let info = ModelInfo {
            name: sidecar.name.unwrap_or(default_name),
            size_bytes: metadata.len(),
            input_size: sidecar
                .input_size
                .map_or(ModelInfo::DEFAULT_RESOLUTION, |[w, h]| (w, h)),
            output_size: sidecar
                .output_size
                .map_or(ModelInfo::DEFAULT_RESOLUTION, |[w, h]| (w, h)),
        };
        let preprocessing = PreprocessingConfig {
            normalization_mean: sidecar
                .normalization_mean
                .unwrap_or(defaults.normalization_mean),
            normalization_std: sidecar
                .normalization_std
                .unwrap_or(defaults.normalization_std),
        };

        validate_model_metadata(&info, &preprocessing)?;

        Ok(Self {
            model_path,
            info,
            preprocessing,
        })
    }

    fn read_sidecar(path: &Path) -> Result<ModelSidecar> {
        if !path.exists() {
            return Ok(ModelSidecar::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| BgRemovalError::file_io_error("read model metadata", path, &e))?;
        serde_json::from_str(&contents).map_err(|e| {
            BgRemovalError::invalid_config(format!(
                "Failed to parse model metadata '{}': {e}",
                path.display()
            ))
        })
    }
}

impl ModelProvider for ExternalModelProvider {
    fn load_model_data(&self) -> Result<Vec<u8>> {
        fs::read(&self.model_path).map_err(|e| {
            BgRemovalError::model(format!(
                "Failed to read model file '{}': {e}",
                self.model_path.display()
            ))
        })
    }

    fn model_info(&self) -> &ModelInfo {
        &self.info
    }

    fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    fn model_path(&self) -> &Path {
        &self.model_path
    }
}

/// Model previously downloaded into the cache
#[derive(Debug)]
pub struct DownloadedModelProvider {
    model_id: String,
    inner: ExternalModelProvider,
}

impl DownloadedModelProvider {
    /// Look `model_id` up in `cache`
    ///
    /// # Errors
    /// - `InvalidConfig` for an invalid model ID
    /// - `Model` when the model is not cached
    pub fn new(model_id: &str, cache: &crate::cache::ModelCache) -> Result<Self> {
        let model_dir = cache.model_dir(model_id)?;
        if !cache.is_model_cached(model_id) {
            let available: Vec<String> = cache
                .scan_cached_models()
                .unwrap_or_default()
                .into_iter()
                .map(|m| m.model_id)
                .collect();
            return Err(BgRemovalError::model(format!(
                "Model '{model_id}' not found in cache. Available models: {available:?}. \
                 Download it with `bgremoval --only-download`"
            )));
        }

        Ok(Self {
            model_id: model_id.to_string(),
            inner: ExternalModelProvider::new(model_dir)?,
        })
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

impl ModelProvider for DownloadedModelProvider {
    fn load_model_data(&self) -> Result<Vec<u8>> {
        self.inner.load_model_data()
    }

    fn model_info(&self) -> &ModelInfo {
        self.inner.model_info()
    }

    fn preprocessing_config(&self) -> &PreprocessingConfig {
        self.inner.preprocessing_config()
    }

    fn model_path(&self) -> &Path {
        self.inner.model_path()
    }
}

fn validate_model_metadata(info: &ModelInfo, preprocessing: &PreprocessingConfig) -> Result<()> {
    for (label, (w, h)) in [("input_size", info.input_size), ("output_size", info.output_size)] {
        if w == 0 || h == 0 {
            return Err(BgRemovalError::invalid_config(format!(
                "Model {label} must be non-zero, got {w}x{h}"
            )));
        }
    }
    if preprocessing
        .normalization_std
        .iter()
        .any(|s| !s.is_finite() || *s <= 0.0)
    {
        return Err(BgRemovalError::invalid_config(format!(
            "Normalization std must be positive, got {:?}",
            preprocessing.normalization_std
        )));
    }
    Ok(())
}

/// Model manager for loading and managing models
#[derive(Debug)]
pub struct ModelManager {
    provider: Box<dyn ModelProvider>,
}

impl ModelManager {
    /// Create a new model manager from a model specification
    ///
    /// # Errors
    /// - Model file missing or not cached
    /// - Malformed model metadata
    /// - Cache directory cannot be determined
    pub fn from_spec(spec: &ModelSpec) -> Result<Self> {
        match &spec.source {
            ModelSource::External(path) => Self::with_external_model(path),
            ModelSource::Downloaded(model_id) => Self::with_downloaded_model(model_id),
        }
    }

    /// Create model manager with a model file or directory
    ///
    /// # Errors
    /// - Model file missing or malformed metadata
    pub fn with_external_model<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Ok(Self {
            provider: Box::new(ExternalModelProvider::new(model_path)?),
        })
    }

    /// Create model manager with downloaded model from the default cache
    ///
    /// # Errors
    /// - Model not found in cache
    /// - Cache directory access errors
    pub fn with_downloaded_model(model_id: &str) -> Result<Self> {
        let cache = crate::cache::ModelCache::new()?;
        Self::with_cached_model(&cache, model_id)
    }

    /// Create model manager with a model from a specific cache
    ///
    /// # Errors
    /// - Model not found in cache
    pub fn with_cached_model(cache: &crate::cache::ModelCache, model_id: &str) -> Result<Self> {
        Ok(Self {
            provider: Box::new(DownloadedModelProvider::new(model_id, cache)?),
        })
    }

    /// Load model data
    ///
    /// # Errors
    /// - Model file not found or unreadable
    pub fn load_model(&self) -> Result<Vec<u8>> {
        self.provider.load_model_data()
    }

    #[must_use]
    pub fn info(&self) -> &ModelInfo {
        self.provider.model_info()
    }

    #[must_use]
    pub fn preprocessing_config(&self) -> &PreprocessingConfig {
        self.provider.preprocessing_config()
    }

    #[must_use]
    pub fn model_path(&self) -> &Path {
        self.provider.model_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ModelCache;
    use tempfile::TempDir;

    fn write_model(dir: &Path) -> PathBuf {
        let path = dir.join(MODEL_FILE_NAME);
        fs::write(&path, b"not really onnx").unwrap();
        path
    }

    #[test]
    fn test_model_source_display_name() {
        let source = ModelSource::External(PathBuf::from("/models/u2netp.onnx"));
        assert_eq!(source.display_name(), "external:u2netp.onnx");
        assert_eq!(ModelSpec::default().source.display_name(), "cached:u2netp");
    }

    #[test]
    fn test_external_model_defaults() {
        let temp_dir = TempDir::new().unwrap();
        write_model(temp_dir.path());

        let manager = ModelManager::with_external_model(temp_dir.path()).unwrap();
        let info = manager.info();
        assert_eq!(info.input_size, (320, 320));
        assert_eq!(info.output_size, (320, 320));
        assert_eq!(info.size_bytes, 15);
        assert_eq!(manager.preprocessing_config(), &PreprocessingConfig::default());
        assert_eq!(manager.load_model().unwrap(), b"not really onnx");
    }

    #[test]
    fn test_sidecar_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let model = write_model(temp_dir.path());
        fs::write(
            temp_dir.path().join(SIDECAR_FILE_NAME),
            r#"{"name": "u2net", "input_size": [256, 256], "normalization_std": [1.0, 1.0, 1.0]}"#,
        )
        .unwrap();

        let manager = ModelManager::with_external_model(&model).unwrap();
        assert_eq!(manager.info().name, "u2net");
        assert_eq!(manager.info().input_size, (256, 256));
        assert_eq!(manager.info().output_size, (320, 320));
        assert_eq!(manager.preprocessing_config().normalization_std, [1.0; 3]);
    }

    #[test]
    fn test_malformed_sidecar_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        write_model(temp_dir.path());
        fs::write(temp_dir.path().join(SIDECAR_FILE_NAME), "{ nope").unwrap();

        let err = ModelManager::with_external_model(temp_dir.path()).unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_input_size_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_model(temp_dir.path());
        fs::write(temp_dir.path().join(SIDECAR_FILE_NAME), r#"{"input_size": [0, 320]}"#).unwrap();

        assert!(ModelManager::with_external_model(temp_dir.path()).is_err());
    }

    #[test]
    fn test_missing_model_is_model_error() {
        let err = ModelManager::with_external_model("/nonexistent/u2netp.onnx").unwrap_err();
        assert!(matches!(err, BgRemovalError::Model(_)));
    }

    #[test]
    fn test_cached_model_lookup() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();

        let err = ModelManager::with_cached_model(&cache, "u2netp").unwrap_err();
        assert!(matches!(err, BgRemovalError::Model(_)));

        let model_dir = cache.model_dir("u2netp").unwrap();
        fs::create_dir_all(&model_dir).unwrap();
        write_model(&model_dir);

        let manager = ModelManager::with_cached_model(&cache, "u2netp").unwrap();
        assert_eq!(manager.info().name, "u2netp");
        assert_eq!(manager.model_path(), model_dir.join(MODEL_FILE_NAME));
    }

    #[test]
    fn test_cached_model_id_cannot_escape_cache() {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        let outside = temp_dir.path().join("elsewhere");
        fs::create_dir_all(&outside).unwrap();
        write_model(&outside);

        let err = ModelManager::with_cached_model(&cache, "../elsewhere").unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidConfig(_)));
    }
}
