//! Mask post-processing and compositing
//!
//! The model's mask comes back at its own resolution. It is scaled onto the
//! same square the original was normalized into, optionally corrected for the
//! raster backend's row order, inverted and finally used as a stencil over the
//! normalized original.

use crate::{
    error::{BgRemovalError, Result},
    geometry::{ScalingMode, Size},
    raster::Drawable,
    utils::ImagePreprocessor,
};
use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Scales inference masks back onto the normalized square
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskRescaler;

impl MaskRescaler {
    /// Aspect-fit `mask` into `square`
    ///
    /// With `orientation_correction` the result is additionally rotated by
    /// 180° and mirrored horizontally, which together undo a vertical flip.
    ///
    /// # Errors
    /// - `Rendering` or `BufferAllocation` from the drawing passes
    pub fn rescale<D: Drawable + ?Sized>(
        mask: &D,
        square: Size,
        orientation_correction: bool,
    ) -> Result<RgbaImage> {
        let scaled = ImagePreprocessor::scaled(mask, square, ScalingMode::AspectFit)?;
        if !orientation_correction {
            return Ok(scaled);
        }

        tracing::debug!("Applying 180° rotation and horizontal flip to mask");
        let rotated = ImagePreprocessor::rotated_by_degrees(&scaled, 180.0)?;
        ImagePreprocessor::flip_horizontally(&rotated)
    }
}

/// Rec. 601 luma, rounded
#[must_use]
pub fn luminance(pixel: Rgba<u8>) -> u8 {
    let [r, g, b, _] = pixel.0;
    let luma = (299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b) + 500) / 1000;
    luma.min(255) as u8
}

/// Color-inverted copy of `mask`; alpha is left untouched
#[must_use]
pub fn inverted(mask: &RgbaImage) -> RgbaImage {
    let mut out = mask.clone();
    image::imageops::invert(&mut out);
    out
}

/// Stencil `image` with `mask`
///
/// Mask luminance is the amount cut away: black keeps the pixel, white
/// removes it. Output alpha is `src_alpha * (255 - lum) / 255`; pixels that
/// end up fully transparent are zeroed.
///
/// # Errors
/// - `Rendering` if the two images differ in size
pub fn mask_image(image: &RgbaImage, mask: &RgbaImage) -> Result<RgbaImage> {
    if image.dimensions() != mask.dimensions() {
        return Err(BgRemovalError::rendering(format!(
            "Mask is {}x{} but image is {}x{}",
            mask.width(),
            mask.height(),
            image.width(),
            image.height()
        )));
    }

    let mut out = image.clone();
    for (pixel, mask_pixel) in out.pixels_mut().zip(mask.pixels()) {
        let keep = 255 - u32::from(luminance(*mask_pixel));
        let alpha = ((u32::from(pixel[3]) * keep + 127) / 255) as u8;
        *pixel = if alpha == 0 {
            Rgba([0, 0, 0, 0])
        } else {
            Rgba([pixel[0], pixel[1], pixel[2], alpha])
        };
    }
    Ok(out)
}

/// Coverage statistics of a saliency mask (white = subject)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub foreground_ratio: f32,
}

impl MaskStatistics {
    /// Count pixels whose luminance is above the midpoint
    #[must_use]
    pub fn of(mask: &RgbaImage) -> Self {
        let total_pixels = mask.width() as usize * mask.height() as usize;
        let foreground_pixels = mask.pixels().filter(|p| luminance(**p) > 127).count();
        #[allow(clippy::cast_precision_loss)]
        let foreground_ratio = if total_pixels == 0 {
            0.0
        } else {
            foreground_pixels as f32 / total_pixels as f32
        };
        Self {
            total_pixels,
            foreground_pixels,
            foreground_ratio,
        }
    }
}
