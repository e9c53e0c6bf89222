//! Image capability and graphics backends
//!
//! [`Drawable`] is what the pipeline needs from an input image: its size, a
//! pixel read and the ability to draw itself into a [`Canvas`]. A
//! [`GraphicsBackend`] turns a raw [`PixelBuffer`] back into an image; the two
//! implementations differ in how they treat the buffer's declared row order,
//! and that difference decides whether the rescaled mask needs an orientation
//! correction.

use crate::{
    canvas::{Canvas, CompositeOp},
    error::{BgRemovalError, Result},
    geometry::{Rect, Size},
    pixel_buffer::PixelBuffer,
};
use image::{buffer::ConvertBuffer, DynamicImage, GrayImage, Rgba, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// An image the pipeline can measure, sample and draw
pub trait Drawable {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn size(&self) -> Size {
        Size::from_pixels(self.width(), self.height())
    }

    /// Pixel at visual coordinates, top-left origin
    fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>>;

    /// RGBA8 view of the image, borrowed when no conversion is needed
    fn to_rgba(&self) -> Cow<'_, RgbaImage>;

    /// Draw the image stretched into `rect` of `canvas`
    ///
    /// # Errors
    /// - Rendering failures from the canvas
    fn draw_into(&self, canvas: &mut Canvas, rect: Rect, op: CompositeOp) -> Result<()> {
        canvas.draw_image(&self.to_rgba(), rect, op)
    }
}

impl Drawable for RgbaImage {
    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }

    fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.get_pixel_checked(x, y).copied()
    }

    fn to_rgba(&self) -> Cow<'_, RgbaImage> {
        Cow::Borrowed(self)
    }
}

impl Drawable for RgbImage {
    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }

    fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.get_pixel_checked(x, y)
            .map(|p| Rgba([p[0], p[1], p[2], 255]))
    }

    fn to_rgba(&self) -> Cow<'_, RgbaImage> {
        Cow::Owned(self.convert())
    }
}

impl Drawable for GrayImage {
    fn width(&self) -> u32 {
        self.dimensions().0
    }

    fn height(&self) -> u32 {
        self.dimensions().1
    }

    fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.get_pixel_checked(x, y)
            .map(|p| Rgba([p[0], p[0], p[0], 255]))
    }

    fn to_rgba(&self) -> Cow<'_, RgbaImage> {
        Cow::Owned(self.convert())
    }
}

impl Drawable for DynamicImage {
    fn width(&self) -> u32 {
        image::GenericImageView::dimensions(self).0
    }

    fn height(&self) -> u32 {
        image::GenericImageView::dimensions(self).1
    }

    fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        let (width, height) = image::GenericImageView::dimensions(self);
        (x < width && y < height).then(|| image::GenericImageView::get_pixel(self, x, y))
    }

    fn to_rgba(&self) -> Cow<'_, RgbaImage> {
        match self {
            DynamicImage::ImageRgba8(rgba) => Cow::Borrowed(rgba),
            other => Cow::Owned(other.to_rgba8()),
        }
    }
}

/// Converts inference output buffers into images
pub trait GraphicsBackend: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Build an upright-as-read image from `buffer`
    ///
    /// # Errors
    /// - `Rendering` when the buffer cannot be turned into an image
    fn image_from_buffer(&self, buffer: &PixelBuffer) -> Result<RgbaImage>;

    /// Whether masks produced through this backend need the 180° rotation and
    /// horizontal flip after rescaling
    fn requires_orientation_correction(&self) -> bool;
}

/// Backend that honours the buffer's declared row order
#[derive(Debug, Clone, Copy, Default)]
pub struct RowOrderAware;

/// Backend that copies memory rows top-down whatever the declared order
///
/// Bottom-up buffers come out vertically flipped, which the orientation
/// correction undoes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawRowMajor;

impl GraphicsBackend for RowOrderAware {
    fn name(&self) -> &'static str {
        "row-order-aware"
    }

    fn image_from_buffer(&self, buffer: &PixelBuffer) -> Result<RgbaImage> {
        copy_rows(buffer, |y| buffer.memory_row(y))
    }

    fn requires_orientation_correction(&self) -> bool {
        false
    }
}

impl GraphicsBackend for RawRowMajor {
    fn name(&self) -> &'static str {
        "raw-row-major"
    }

    fn image_from_buffer(&self, buffer: &PixelBuffer) -> Result<RgbaImage> {
        copy_rows(buffer, |y| y)
    }

    fn requires_orientation_correction(&self) -> bool {
        true
    }
}

fn copy_rows<F>(buffer: &PixelBuffer, row_for: F) -> Result<RgbaImage>
where
    F: Fn(u32) -> u32,
{
    let (width, height) = (buffer.width(), buffer.height());
    let mut image = RgbaImage::new(width, height);

    for (y, row) in image.rows_mut().enumerate() {
        let memory_row = row_for(y as u32);
        let source = buffer.raw_row(memory_row).ok_or_else(|| {
            BgRemovalError::rendering(format!(
                "Pixel buffer row {memory_row} is out of range for {width}x{height}"
            ))
        })?;
        for (pixel, argb) in row.zip(source.chunks_exact(4)) {
            // first component is skipped, the buffer carries no alpha
            *pixel = Rgba([argb[1], argb[2], argb[3], 255]);
        }
    }

    Ok(image)
}

/// Graphics backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RasterBackend {
    #[default]
    RowOrderAware,
    RawRowMajor,
}

impl RasterBackend {
    #[must_use]
    pub fn backend(self) -> &'static dyn GraphicsBackend {
        match self {
            Self::RowOrderAware => &RowOrderAware,
            Self::RawRowMajor => &RawRowMajor,
        }
    }
}

impl std::fmt::Display for RasterBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.backend().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_buffer::RowOrder;

    fn gradient_rows(row_order: RowOrder) -> PixelBuffer {
        // visual row y has intensity y * 10
        let values: Vec<u8> = (0..3u8).flat_map(|y| [y * 10; 2]).collect();
        PixelBuffer::from_gray(2, 3, &values, row_order).unwrap()
    }

    #[test]
    fn test_row_order_aware_reads_visually() {
        for order in [RowOrder::TopDown, RowOrder::BottomUp] {
            let image = RowOrderAware.image_from_buffer(&gradient_rows(order)).unwrap();
            assert_eq!(image.get_pixel(0, 0)[0], 0);
            assert_eq!(image.get_pixel(1, 2)[0], 20);
            assert_eq!(image.get_pixel(1, 2)[3], 255);
        }
    }

    #[test]
    fn test_raw_row_major_flips_bottom_up_buffers() {
        let image = RawRowMajor
            .image_from_buffer(&gradient_rows(RowOrder::BottomUp))
            .unwrap();
        assert_eq!(image.get_pixel(0, 0)[0], 20);
        assert_eq!(image.get_pixel(0, 2)[0], 0);

        let image = RawRowMajor
            .image_from_buffer(&gradient_rows(RowOrder::TopDown))
            .unwrap();
        assert_eq!(image.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_only_raw_row_major_needs_correction() {
        assert!(!RasterBackend::RowOrderAware.backend().requires_orientation_correction());
        assert!(RasterBackend::RawRowMajor.backend().requires_orientation_correction());
        assert_eq!(RasterBackend::default(), RasterBackend::RowOrderAware);
    }

    #[test]
    fn test_dynamic_image_drawable() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 2, image::Luma([77])));
        assert_eq!(Drawable::width(&image), 3);
        assert_eq!(Drawable::height(&image), 2);
        assert_eq!(Drawable::pixel(&image, 2, 1), Some(Rgba([77, 77, 77, 255])));
        assert_eq!(Drawable::pixel(&image, 3, 0), None);
        assert_eq!(Drawable::to_rgba(&image).dimensions(), (3, 2));
    }
}
