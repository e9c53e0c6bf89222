//! Model downloading into the local cache
//!
//! Downloads are streamed into a temporary directory inside the cache root,
//! hashed while they are written and moved into place with a single rename,
//! so an interrupted download never leaves a half-written `model.onnx` behind.

use crate::cache::ModelCache;
use crate::error::{BgRemovalError, Result};
use crate::models::MODEL_FILE_NAME;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Public ONNX export of U²-Net-p (320×320 in and out)
pub const DEFAULT_MODEL_URL: &str =
    "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2netp.onnx";

/// Name of the in-progress file inside the temporary directory
const PARTIAL_FILE_NAME: &str = "download.partial";

/// Model downloader with progress reporting
#[derive(Debug)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
}

/// Download progress bar, drawn only with the `cli` feature
#[derive(Debug)]
struct DownloadProgress {
    #[cfg(feature = "cli")]
    bar: ProgressBar,
}

#[cfg_attr(not(feature = "cli"), allow(unused_variables, clippy::unused_self))]
impl DownloadProgress {
    fn start() -> Self {
        #[cfg(feature = "cli")]
        {
            let bar = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            {
                bar.set_style(style.progress_chars("#>-"));
            }
            Self { bar }
        }
        #[cfg(not(feature = "cli"))]
        {
            Self {}
        }
    }

    fn set_total(&self, total: u64) {
        #[cfg(feature = "cli")]
        self.bar.set_length(total);
    }

    fn advance_to(&self, downloaded: u64) {
        #[cfg(feature = "cli")]
        self.bar.set_position(downloaded);
    }

    fn finish(&self, message: &str) {
        #[cfg(feature = "cli")]
        self.bar.finish_with_message(message.to_string());
    }
}

impl ModelDownloader {
    /// Create a downloader for the default cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn new() -> Result<Self> {
        Self::with_cache(ModelCache::new()?)
    }

    /// Create a downloader writing into `cache`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| BgRemovalError::network_error("Failed to create HTTP client", e))?;

        Ok(Self { client, cache })
    }

    /// Download an ONNX model into the cache and return its model ID
    ///
    /// Already cached models are not downloaded again. When `expected_sha256`
    /// is given, the downloaded body or the already cached file must match it.
    ///
    /// # Errors
    /// - `Network` for request, HTTP status or checksum failures
    /// - `Io` for cache filesystem errors
    pub async fn download_model(
        &self,
        url: &str,
        expected_sha256: Option<&str>,
        show_progress: bool,
    ) -> Result<String> {
        validate_model_url(url)?;

        let model_id = ModelCache::url_to_model_id(url);
        log::info!("Downloading model from: {url}");
        log::info!("Model ID: {model_id}");

        if self.cache.is_model_cached(&model_id) {
            log::info!("Model already cached: {model_id}");
            if let Some(expected) = expected_sha256 {
                verify_cached_model(&self.cache, &model_id, expected)?;
            }
            return Ok(model_id);
        }

        let temp_dir = tempfile::Builder::new()
            .prefix(".download-")
            .tempdir_in(self.cache.cache_dir())
            .map_err(|e| {
                BgRemovalError::file_io_error("create download directory", self.cache.cache_dir(), &e)
            })?;
        let partial_path = temp_dir.path().join(PARTIAL_FILE_NAME);

        let progress = show_progress.then(DownloadProgress::start);

        let digest = match self.download_file(url, &partial_path, progress.as_ref()).await {
            Ok(digest) => digest,
            Err(e) => {
                if let Some(pb) = &progress {
                    pb.finish("❌ Download failed");
                }
                return Err(e);
            },
        };

        if let Some(expected) = expected_sha256 {
            if let Err(e) = check_digest(url, &digest, expected) {
                if let Some(pb) = &progress {
                    pb.finish("❌ Checksum mismatch");
                }
                return Err(e);
            }
        }

        let final_dir = self.cache.model_dir(&model_id)?;
        fs::create_dir_all(&final_dir)
            .map_err(|e| BgRemovalError::file_io_error("create model directory", &final_dir, &e))?;
        let final_path = final_dir.join(MODEL_FILE_NAME);
        fs::rename(&partial_path, &final_path).map_err(|e| {
            BgRemovalError::file_io_error("move downloaded model to cache", &final_path, &e)
        })?;

        if let Some(pb) = progress {
            pb.finish(&format!("✅ Downloaded {model_id}"));
        }
        log::info!("Successfully downloaded model: {model_id}");

        Ok(model_id)
    }

    /// Stream `url` into `local_path`, returning the hex SHA-256 of the body
    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: Option<&DownloadProgress>,
    ) -> Result<String> {
        log::debug!("Downloading: {url} -> {}", local_path.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BgRemovalError::network_error(format!("Failed to download {url}"), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BgRemovalError::network_error(
                format!("Failed to download {url}"),
                format!("HTTP {status}"),
            ));
        }

        let total_size = response.content_length();
        if let (Some(pb), Some(total)) = (progress, total_size) {
            pb.set_total(total);
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| BgRemovalError::file_io_error("create file", local_path, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];

        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| BgRemovalError::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| BgRemovalError::file_io_error("write to file", local_path, &e))?;

            downloaded += bytes_read as u64;
            if let Some(pb) = progress {
                pb.advance_to(downloaded);
            }
        }

        file.flush()
            .await
            .map_err(|e| BgRemovalError::file_io_error("flush file", local_path, &e))?;

        if downloaded == 0 {
            return Err(BgRemovalError::network_error(
                format!("Failed to download {url}"),
                "empty response body",
            ));
        }

        log::debug!("Downloaded {downloaded} bytes to {}", local_path.display());
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Get the model cache for other operations
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }
}

/// Check that `url` is an HTTP(S) URL
///
/// # Errors
/// - `InvalidConfig` for any other scheme
pub fn validate_model_url(url: &str) -> Result<()> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(host_and_path) if !host_and_path.is_empty() && !host_and_path.starts_with('/') => {
            Ok(())
        },
        _ => Err(BgRemovalError::invalid_config(format!(
            "Unsupported model URL: {url}. Expected an http(s) URL"
        ))),
    }
}

/// Hash a cached model's `model.onnx` and compare it with `expected_sha256`
///
/// # Errors
/// - `InvalidConfig` for an invalid model ID
/// - `Io` when the model file cannot be read
/// - `Network` on checksum mismatch
pub fn verify_cached_model(cache: &ModelCache, model_id: &str, expected_sha256: &str) -> Result<()> {
    let path = cache.model_file_path(model_id)?;
    let digest = file_sha256(&path)?;
    check_digest(&path.display().to_string(), &digest, expected_sha256)
}

fn check_digest(source: &str, digest: &str, expected: &str) -> Result<()> {
    if !digest.eq_ignore_ascii_case(expected.trim()) {
        return Err(BgRemovalError::network_error(
            format!("Checksum mismatch for {source}"),
            format!("expected {expected}, got {digest}"),
        ));
    }
    log::debug!("SHA-256 verified: {digest}");
    Ok(())
}

/// Hex SHA-256 of a file on disk
///
/// # Errors
/// - File cannot be read
pub fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path)
        .map_err(|e| BgRemovalError::file_io_error("read file for verification", path, &e))?;
    Ok(format!("{:x}", Sha256::digest(&contents)))
}
