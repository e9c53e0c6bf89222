//! Model cache management for downloaded models
//!
//! Each cached model lives in its own directory, `<cache>/<model-id>/`,
//! holding `model.onnx` and optionally a `model.json` metadata sidecar.

use crate::error::{BgRemovalError, Result};
use crate::models::{MODEL_FILE_NAME, SIDECAR_FILE_NAME};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "BGREMOVAL_CACHE_DIR";

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Model identifier (derived from URL)
    pub model_id: String,
    /// Path to the cached model directory
    pub path: PathBuf,
    /// Whether a `model.json` sidecar is present
    pub has_sidecar: bool,
    /// Size of the model directory in bytes
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a new model cache manager
    ///
    /// The cache root is `$BGREMOVAL_CACHE_DIR/models` when the variable is
    /// set, otherwise the platform cache directory:
    /// - Linux: `~/.cache/bgremoval/models/`
    /// - macOS: `~/Library/Caches/bgremoval/models/`
    /// - Windows: `%LOCALAPPDATA%/bgremoval/models/`
    ///
    /// # Errors
    /// - Failed to determine or create the cache directory
    pub fn new() -> Result<Self> {
        let cache_dir = Self::get_cache_dir()?;

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                BgRemovalError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }

        Ok(Self { cache_dir })
    }

    fn get_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(cache_override).join("models"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                BgRemovalError::invalid_config(format!(
                    "Failed to determine cache directory. Set {CACHE_DIR_ENV} environment variable."
                ))
            })?
            .join("bgremoval")
            .join("models"))
    }

    /// Create a new model cache rooted at `cache_dir/models`
    ///
    /// # Errors
    /// - Failed to create cache directory
    pub fn with_custom_cache_dir<P: AsRef<Path>>(cache_dir: P) -> Result<Self> {
        let models_dir = cache_dir.as_ref().join("models");

        if !models_dir.exists() {
            fs::create_dir_all(&models_dir).map_err(|e| {
                BgRemovalError::file_io_error("create custom cache directory", &models_dir, &e)
            })?;
        }

        Ok(Self {
            cache_dir: models_dir,
        })
    }

    /// Generate a model ID from a URL
    ///
    /// URLs ending in an `.onnx` file use the file stem; anything else gets a
    /// hash-based identifier.
    ///
    /// # Examples
    /// ```
    /// use bgremoval::cache::ModelCache;
    ///
    /// let id = ModelCache::url_to_model_id(
    ///     "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2netp.onnx",
    /// );
    /// assert_eq!(id, "u2netp");
    /// ```
    #[must_use]
    pub fn url_to_model_id(url: &str) -> String {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let stem = path
            .rsplit('/')
            .next()
            .and_then(|file| file.strip_suffix(".onnx"))
            .filter(|stem| is_safe_model_id(stem));

        if let Some(stem) = stem {
            return stem.to_string();
        }

        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(url.as_bytes());
        let hex = format!("{digest:x}");
        format!("url-{}", hex.get(..16).unwrap_or(&hex))
    }

    /// Check that `model_id` names a single directory inside the cache
    ///
    /// IDs are limited to ASCII alphanumerics, `-`, `_` and `.`, and may not
    /// consist of dots only.
    ///
    /// # Errors
    /// - `InvalidConfig` for empty IDs or IDs that could leave the cache root
    pub fn validate_model_id(model_id: &str) -> Result<()> {
        if is_safe_model_id(model_id) {
            Ok(())
        } else {
            Err(BgRemovalError::invalid_config(format!(
                "Invalid model ID '{model_id}': use letters, digits, '-', '_' or '.'"
            )))
        }
    }

    /// Whether `model_id` has a model file in the cache
    ///
    /// Invalid IDs are never cached.
    #[must_use]
    pub fn is_model_cached(&self, model_id: &str) -> bool {
        self.model_dir(model_id)
            .is_ok_and(|dir| Self::validate_model_directory(&dir))
    }

    /// Directory of a cached model (may not exist)
    ///
    /// # Errors
    /// - `InvalidConfig` when `model_id` fails [`Self::validate_model_id`]
    pub fn model_dir(&self, model_id: &str) -> Result<PathBuf> {
        Self::validate_model_id(model_id)?;
        Ok(self.cache_dir.join(model_id))
    }

    /// Path of a cached model's ONNX file (may not exist)
    ///
    /// # Errors
    /// - `InvalidConfig` when `model_id` fails [`Self::validate_model_id`]
    pub fn model_file_path(&self, model_id: &str) -> Result<PathBuf> {
        Ok(self.model_dir(model_id)?.join(MODEL_FILE_NAME))
    }

    /// Scan cache directory and return all available models, sorted by ID
    ///
    /// # Errors
    /// - Failed to read cache directory
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(models);
        }

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            BgRemovalError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                BgRemovalError::file_io_error("read cache directory entry", &self.cache_dir, &e)
            })?;

            let path = entry.path();
            if path.is_dir() {
                if let Some(model_info) = Self::analyze_model_directory(&path) {
                    models.push(model_info);
                }
            }
        }

        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    fn validate_model_directory(model_path: &Path) -> bool {
        model_path.join(MODEL_FILE_NAME).is_file()
    }

    fn analyze_model_directory(model_path: &Path) -> Option<CachedModelInfo> {
        let model_id = model_path.file_name()?.to_str()?.to_string();

        if !Self::validate_model_directory(model_path) {
            log::debug!("Skipping invalid model directory: {}", model_path.display());
            return None;
        }

        Some(CachedModelInfo {
            model_id,
            path: model_path.to_path_buf(),
            has_sidecar: model_path.join(SIDECAR_FILE_NAME).is_file(),
            size_bytes: Self::calculate_directory_size(model_path).unwrap_or(0),
        })
    }

    fn calculate_directory_size(dir_path: &Path) -> Result<u64> {
        let mut total_size = 0;
        Self::visit_dir(dir_path, &mut total_size)
            .map_err(|e| BgRemovalError::file_io_error("calculate directory size", dir_path, &e))?;
        Ok(total_size)
    }

    fn visit_dir(dir: &Path, total: &mut u64) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::visit_dir(&path, total)?;
            } else {
                *total += entry.metadata()?.len();
            }
        }
        Ok(())
    }

    /// Clear all cached models
    ///
    /// # Returns
    /// IDs of the removed models
    ///
    /// # Errors
    /// - Failed to access or remove model directories
    pub fn clear_all_models(&self) -> Result<Vec<String>> {
        let mut removed_models = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(removed_models);
        }

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            BgRemovalError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                BgRemovalError::file_io_error("read cache directory entry", &self.cache_dir, &e)
            })?;

            let path = entry.path();
            if path.is_dir() {
                let model_id = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("unknown")
                    .to_string();

                log::info!("Removing cached model: {model_id}");
                fs::remove_dir_all(&path).map_err(|e| {
                    BgRemovalError::file_io_error("remove cached model directory", &path, &e)
                })?;
                removed_models.push(model_id);
            }
        }

        Ok(removed_models)
    }

    /// Clear a specific cached model
    ///
    /// # Returns
    /// `true` if the model was found and removed
    ///
    /// # Errors
    /// - `InvalidConfig` for an invalid model ID
    /// - Failed to remove model directory
    pub fn clear_specific_model(&self, model_id: &str) -> Result<bool> {
        let model_path = self.model_dir(model_id)?;

        if !model_path.exists() {
            return Ok(false);
        }

        log::info!("Removing cached model: {model_id}");
        fs::remove_dir_all(&model_path).map_err(|e| {
            BgRemovalError::file_io_error("remove specific cached model", &model_path, &e)
        })?;

        Ok(true)
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

fn is_safe_model_id(model_id: &str) -> bool {
    !model_id.is_empty()
        && !model_id.chars().all(|c| c == '.')
        && model_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    let unit = UNITS.get(unit_index).unwrap_or(&"B");
    if unit_index == 0 {
        format!("{bytes} {unit}")
    } else {
        format!("{size:.1} {unit}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache_with_model(model_id: &str) -> (TempDir, ModelCache) {
        let temp_dir = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp_dir.path()).unwrap();
        let dir = cache.model_dir(model_id).unwrap();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MODEL_FILE_NAME), vec![0u8; 2048]).unwrap();
        (temp_dir, cache)
    }

    #[test]
    fn test_url_to_model_id() {
        assert_eq!(
            ModelCache::url_to_model_id(
                "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2netp.onnx"
            ),
            "u2netp"
        );
        assert_eq!(
            ModelCache::url_to_model_id("https://example.com/models/u2net.onnx?download=1"),
            "u2net"
        );

        let hashed = ModelCache::url_to_model_id("https://example.com/model");
        assert!(hashed.starts_with("url-"));
        assert_eq!(hashed.len(), 20);
        assert_eq!(hashed, ModelCache::url_to_model_id("https://example.com/model"));
        assert_ne!(hashed, ModelCache::url_to_model_id("https://example.com/other"));
    }

    #[test]
    fn test_url_with_unsafe_stem_is_hashed() {
        let id = ModelCache::url_to_model_id("https://example.com/../evil.onnx");
        assert_eq!(id, "evil");
        let id = ModelCache::url_to_model_id("https://example.com/a%20b.onnx");
        assert!(id.starts_with("url-"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(4 * 1024 * 1024), "4.0 MB");
    }

    #[test]
    fn test_is_model_cached() {
        let (_temp_dir, cache) = cache_with_model("u2netp");
        assert!(cache.is_model_cached("u2netp"));
        assert!(!cache.is_model_cached("u2net"));

        fs::create_dir_all(cache.model_dir("empty").unwrap()).unwrap();
        assert!(!cache.is_model_cached("empty"));
    }

    #[test]
    fn test_scan_cached_models() {
        let (_temp_dir, cache) = cache_with_model("u2netp");
        let other = cache.model_dir("a-model").unwrap();
        fs::create_dir_all(&other).unwrap();
        fs::write(other.join(MODEL_FILE_NAME), b"x").unwrap();
        fs::write(other.join(SIDECAR_FILE_NAME), b"{}").unwrap();
        fs::create_dir_all(cache.model_dir("incomplete").unwrap()).unwrap();

        let models = cache.scan_cached_models().unwrap();
        let ids: Vec<_> = models.iter().map(|m| m.model_id.as_str()).collect();
        assert_eq!(ids, ["a-model", "u2netp"]);
        assert!(models[0].has_sidecar);
        assert_eq!(models[1].size_bytes, 2048);
    }

    #[test]
    fn test_clear_specific_model() {
        let (_temp_dir, cache) = cache_with_model("u2netp");
        assert!(cache.clear_specific_model("u2netp").unwrap());
        assert!(!cache.is_model_cached("u2netp"));
        assert!(!cache.clear_specific_model("u2netp").unwrap());
    }

    #[test]
    fn test_clear_all_models() {
        let (_temp_dir, cache) = cache_with_model("u2netp");
        fs::create_dir_all(cache.model_dir("other").unwrap()).unwrap();

        let mut removed = cache.clear_all_models().unwrap();
        removed.sort();
        assert_eq!(removed, ["other", "u2netp"]);
        assert!(cache.scan_cached_models().unwrap().is_empty());
    }

    #[test]
    fn test_model_file_path_layout() {
        let (temp_dir, cache) = cache_with_model("u2netp");
        assert_eq!(
            cache.model_file_path("u2netp").unwrap(),
            temp_dir.path().join("models").join("u2netp").join(MODEL_FILE_NAME)
        );
    }

    #[test]
    fn test_model_ids_outside_the_cache_are_rejected() {
        let (temp_dir, cache) = cache_with_model("u2netp");
        let outside = temp_dir.path().join("victim");
        fs::create_dir_all(&outside).unwrap();
        fs::write(outside.join("keep.txt"), b"keep").unwrap();

        for model_id in ["../victim", "..", ".", "", "a/b", "a\\b", "/tmp"] {
            let err = cache.clear_specific_model(model_id).unwrap_err();
            assert!(matches!(err, BgRemovalError::InvalidConfig(_)), "{model_id:?}");
            assert!(cache.model_dir(model_id).is_err(), "{model_id:?}");
            assert!(!cache.is_model_cached(model_id), "{model_id:?}");
        }

        assert!(outside.join("keep.txt").is_file());
        assert!(cache.is_model_cached("u2netp"));
        assert!(ModelCache::validate_model_id("u2net.v2_int8-q").is_ok());
    }
}
