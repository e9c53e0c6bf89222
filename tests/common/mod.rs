//! Shared helpers for integration tests

#![allow(dead_code)]

use bgremoval::{
    BgRemovalError, InferenceBackend, ModelInfo, PixelBuffer, RemovalConfig, Result,
};
use image::{Rgba, RgbaImage};
use instant::Duration;

/// Backend that returns the luminance of its input as the saliency mask
///
/// Bright pixels are treated as subject, so white shapes on black test
/// images survive the cutout.
#[derive(Debug, Default)]
pub struct EchoBackend {
    initialized: bool,
}

impl EchoBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InferenceBackend for EchoBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(0)))
    }

    fn infer(&mut self, input: &PixelBuffer) -> Result<PixelBuffer> {
        if !self.initialized {
            return Err(BgRemovalError::inference("Backend not initialized"));
        }
        if (input.width(), input.height()) != self.input_size() {
            return Err(BgRemovalError::inference("Unexpected input size"));
        }

        let (width, height) = (input.width(), input.height());
        let mut values = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let [_, r, g, b] = input
                    .pixel(x, y)
                    .ok_or_else(|| BgRemovalError::inference("Pixel out of range"))?;
                let luma =
                    (299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b) + 500) / 1000;
                values.push(luma as u8);
            }
        }
        PixelBuffer::from_gray(width, height, &values, input.row_order())
    }

    fn input_size(&self) -> (u32, u32) {
        ModelInfo::DEFAULT_RESOLUTION
    }

    fn output_size(&self) -> (u32, u32) {
        ModelInfo::DEFAULT_RESOLUTION
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Ok(ModelInfo {
            name: "echo".to_string(),
            size_bytes: 0,
            input_size: self.input_size(),
            output_size: self.output_size(),
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Backend whose model never loads, or whose inference never yields output
#[derive(Debug)]
pub struct FailingBackend {
    pub fail_on_load: bool,
    initialized: bool,
}

impl FailingBackend {
    pub fn on_load() -> Self {
        Self {
            fail_on_load: true,
            initialized: false,
        }
    }

    pub fn on_inference() -> Self {
        Self {
            fail_on_load: false,
            initialized: false,
        }
    }
}

impl InferenceBackend for FailingBackend {
    fn initialize(&mut self, _config: &RemovalConfig) -> Result<Option<Duration>> {
        if self.fail_on_load {
            return Err(BgRemovalError::model("model file is truncated"));
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(0)))
    }

    fn infer(&mut self, _input: &PixelBuffer) -> Result<PixelBuffer> {
        Err(BgRemovalError::inference("model produced no output"))
    }

    fn input_size(&self) -> (u32, u32) {
        ModelInfo::DEFAULT_RESOLUTION
    }

    fn output_size(&self) -> (u32, u32) {
        ModelInfo::DEFAULT_RESOLUTION
    }

    fn model_info(&self) -> Result<ModelInfo> {
        Err(BgRemovalError::model("no model"))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }
}

/// Opaque black image with a white rectangle over `x0..x1` × `y0..y1`
pub fn white_rect_on_black(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([0, 0, 0, 255])
        }
    })
}

pub fn is_opaque(pixel: &Rgba<u8>) -> bool {
    pixel[3] > 127
}
