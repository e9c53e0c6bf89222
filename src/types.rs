//! Core types for background removal results

use crate::{config::OutputFormat, error::Result, services::OutputFormatHandler};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Result of a background removal operation
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// The cutout, or the subject mask when `mask_only` was requested
    pub image: RgbaImage,

    /// Side of the square the input was normalized into
    pub square_size: u32,

    /// Original image dimensions
    pub original_dimensions: (u32, u32),

    /// Whether `image` is the mask rather than the cutout
    pub mask_only: bool,

    pub timings: ProcessingTimings,
}

impl RemovalResult {
    /// Encode the result as `format`
    ///
    /// # Errors
    /// - Encoder failures or an unsupported format
    pub fn to_bytes(&self, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
        OutputFormatHandler::encode(&self.image, format, quality)
    }

    /// Encode the result and write it to `path`
    ///
    /// # Errors
    /// - Encoder failures or an unsupported format
    /// - File cannot be written
    pub fn save<P: AsRef<Path>>(&self, path: P, format: OutputFormat, quality: u8) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes(format, quality)?;
        std::fs::write(path, bytes)
            .map_err(|e| crate::error::BgRemovalError::file_io_error("write output image", path, &e))
    }

    /// Save as PNG with alpha channel
    ///
    /// # Errors
    /// - Encoder or filesystem failures
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.save(path, OutputFormat::Png, 100)
    }

    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Per-stage timing breakdown, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Model loading time (first call only)
    pub model_load_ms: u64,

    /// Square normalization of the input
    pub geometry_ms: u64,

    /// Stretch to the model input resolution
    pub resize_ms: u64,

    /// Rasterization into the inference buffer
    pub rasterize_ms: u64,

    pub inference_ms: u64,

    /// Mask conversion, rescale and orientation correction
    pub mask_rescale_ms: u64,

    /// Inversion and stencil compositing
    pub composite_ms: u64,

    /// Total end-to-end processing time
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of the total spent in inference
    #[must_use]
    pub fn inference_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.inference_ms as f64 / self.total_ms as f64
        }
    }

    /// Time not attributed to any stage
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        let measured = self.model_load_ms
            + self.geometry_ms
            + self.resize_ms
            + self.rasterize_ms
            + self.inference_ms
            + self.mask_rescale_ms
            + self.composite_ms;
        self.total_ms.saturating_sub(measured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn result() -> RemovalResult {
        RemovalResult {
            image: RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])),
            square_size: 4,
            original_dimensions: (4, 3),
            mask_only: false,
            timings: ProcessingTimings::new(),
        }
    }

    #[test]
    fn test_timings_ratios() {
        let timings = ProcessingTimings {
            inference_ms: 50,
            resize_ms: 10,
            total_ms: 100,
            ..ProcessingTimings::default()
        };
        assert!((timings.inference_ratio() - 0.5).abs() < f64::EPSILON);
        assert_eq!(timings.other_overhead_ms(), 40);
        assert!(ProcessingTimings::new().inference_ratio().abs() < f64::EPSILON);
    }

    #[test]
    fn test_save_png() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("out.png");
        result().save_png(&path).unwrap();

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded, result().into_image());
    }

    #[test]
    fn test_to_bytes_raw() {
        let bytes = result().to_bytes(OutputFormat::Rgba8, 0).unwrap();
        assert_eq!(bytes.len(), 4 * 4 * 4);
        assert_eq!(&bytes[..4], &[1, 2, 3, 255]);
    }
}
