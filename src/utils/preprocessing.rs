//! Shared image scaling utilities
//!
//! Every operation renders into a fresh off-screen surface and returns a new
//! image; inputs are never modified.

use crate::{
    canvas::{Canvas, CompositeOp},
    error::Result,
    geometry::{Point, Rect, ScalingMode, Size, Transform},
    raster::Drawable,
};
use image::RgbaImage;

/// Shared image scaling utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Scale `image` into a `new_size` surface, keeping its aspect ratio
    ///
    /// With [`ScalingMode::AspectFit`] the image is centered and the remaining
    /// area stays transparent; with [`ScalingMode::AspectFill`] the overflow is
    /// clipped.
    ///
    /// # Errors
    /// - `Rendering` for empty sizes or drawing failures
    /// - `BufferAllocation` when the surface cannot be allocated
    pub fn scaled<D: Drawable + ?Sized>(
        image: &D,
        new_size: Size,
        mode: ScalingMode,
    ) -> Result<RgbaImage> {
        let rect = mode.scaled_rect(image.size(), new_size);
        Canvas::render(new_size, |canvas| {
            image.draw_into(canvas, rect, CompositeOp::Copy)
        })
    }

    /// Stretch `image` to exactly `width`x`height`, ignoring aspect ratio
    ///
    /// # Errors
    /// - `Rendering` for empty sizes or drawing failures
    /// - `BufferAllocation` when the surface cannot be allocated
    pub fn resize_image<D: Drawable + ?Sized>(
        image: &D,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage> {
        let target = Size::from_pixels(width, height);
        Canvas::render(target, |canvas| {
            image.draw_into(canvas, Rect::from_size(target), CompositeOp::Copy)
        })
    }

    /// Rotate `image` about its center onto a surface sized to the rotated
    /// bounds
    ///
    /// The canvas only rasterizes axis-aligned drawing, so only multiples of
    /// 180° succeed.
    ///
    /// # Errors
    /// - `Rendering` for angles the canvas cannot rasterize
    pub fn rotated_by_degrees<D: Drawable + ?Sized>(image: &D, degrees: f64) -> Result<RgbaImage> {
        let size = image.size();
        let rotation = Transform::identity().rotated_degrees(degrees);
        let corners = [
            Point::new(0.0, 0.0),
            Point::new(size.width, 0.0),
            Point::new(0.0, size.height),
            Point::new(size.width, size.height),
        ]
        .map(|p| rotation.apply(p));

        let (min_x, max_x, min_y, max_y) = corners.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
            |(min_x, max_x, min_y, max_y), p| {
                (min_x.min(p.x), max_x.max(p.x), min_y.min(p.y), max_y.max(p.y))
            },
        );
        let bounds = Size::new(max_x - min_x, max_y - min_y);

        Canvas::render(bounds, |canvas| {
            canvas.translate(bounds.width / 2.0, bounds.height / 2.0);
            canvas.rotate_degrees(degrees);
            let rect = Rect::new(
                -size.width / 2.0,
                -size.height / 2.0,
                size.width,
                size.height,
            );
            image.draw_into(canvas, rect, CompositeOp::Copy)
        })
    }

    /// Mirror `image` left to right
    ///
    /// # Errors
    /// - `Rendering` or `BufferAllocation` from the off-screen surface
    pub fn flip_horizontally<D: Drawable + ?Sized>(image: &D) -> Result<RgbaImage> {
        let size = image.size();
        Canvas::render(size, |canvas| {
            canvas.translate(size.width, 0.0);
            canvas.scale(-1.0, 1.0);
            image.draw_into(canvas, Rect::from_size(size), CompositeOp::SourceOver)
        })
    }
}
