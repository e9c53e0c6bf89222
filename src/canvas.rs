//! Off-screen rendering surface
//!
//! A [`Canvas`] is an RGBA8 surface with a top-left origin and y growing
//! downwards. Drawing goes through a current transform (CTM) that can be
//! saved and restored. Surfaces are acquired through [`Canvas::render`], which
//! hands the canvas to a closure and returns the finished image only if every
//! drawing step succeeded; the surface is released on every exit path.

use crate::{
    error::{BgRemovalError, Result},
    geometry::{Point, Rect, Size, Transform},
};
use image::{imageops, imageops::FilterType, Rgba, RgbaImage};

/// How drawn pixels combine with the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeOp {
    /// Replace destination pixels inside the drawn rectangle
    #[default]
    Copy,
    /// Alpha-blend over the destination
    SourceOver,
}

/// Off-screen RGBA drawing surface
pub struct Canvas {
    surface: RgbaImage,
    transform: Transform,
    saved: Vec<Transform>,
}

impl std::fmt::Debug for Canvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canvas")
            .field("dimensions", &self.surface.dimensions())
            .field("transform", &self.transform)
            .field("saved_states", &self.saved.len())
            .finish_non_exhaustive()
    }
}

impl Canvas {
    /// Allocate a transparent surface of `size` (rounded to whole pixels)
    ///
    /// # Errors
    /// - `Rendering` for empty or non-finite sizes
    /// - `BufferAllocation` when the surface memory cannot be reserved
    pub fn new(size: Size) -> Result<Self> {
        let (width, height) = size.to_pixels()?;
        Ok(Self {
            surface: allocate_surface(width, height)?,
            transform: Transform::identity(),
            saved: Vec::new(),
        })
    }

    /// Run `draw` against a fresh surface and return the rendered image
    ///
    /// # Errors
    /// - Any error from surface allocation or from `draw`; no image is
    ///   returned in that case
    pub fn render<F>(size: Size, draw: F) -> Result<RgbaImage>
    where
        F: FnOnce(&mut Canvas) -> Result<()>,
    {
        let mut canvas = Self::new(size)?;
        draw(&mut canvas)?;
        Ok(canvas.into_image())
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.surface.dimensions()
    }

    #[must_use]
    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn translate(&mut self, tx: f64, ty: f64) {
        self.transform = self.transform.translated(tx, ty);
    }

    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.transform = self.transform.scaled(sx, sy);
    }

    pub fn rotate_degrees(&mut self, degrees: f64) {
        self.transform = self.transform.rotated_degrees(degrees);
    }

    pub fn save_state(&mut self) {
        self.saved.push(self.transform);
    }

    pub fn restore_state(&mut self) {
        if let Some(transform) = self.saved.pop() {
            self.transform = transform;
        }
    }

    /// Run `f` with the current state saved; the state is restored whether or
    /// not `f` succeeds
    ///
    /// # Errors
    /// - Whatever `f` returns
    pub fn with_saved_state<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.save_state();
        let result = f(self);
        self.restore_state();
        result
    }

    /// Fill the whole surface, ignoring the transform
    pub fn fill(&mut self, color: Rgba<u8>) {
        for pixel in self.surface.pixels_mut() {
            *pixel = color;
        }
    }

    /// Draw `source` stretched into the user-space `rect`
    ///
    /// The rectangle is mapped through the CTM; mirroring transforms flip the
    /// drawn pixels. Parts falling outside the surface are clipped.
    ///
    /// # Errors
    /// - `Rendering` for an empty source image, a rotated/sheared transform
    ///   or a rectangle that maps to non-finite device coordinates
    pub fn draw_image(&mut self, source: &RgbaImage, rect: Rect, op: CompositeOp) -> Result<()> {
        if source.width() == 0 || source.height() == 0 {
            return Err(BgRemovalError::rendering("Cannot draw an empty image"));
        }
        if !self.transform.is_axis_aligned() {
            return Err(BgRemovalError::rendering(format!(
                "Only axis-aligned transforms can be rasterized, got {:?}",
                self.transform
            )));
        }

        let p0 = self.transform.apply(rect.origin);
        let p1 = self
            .transform
            .apply(Point::new(rect.max_x(), rect.max_y()));

        let left = p0.x.min(p1.x).round();
        let right = p0.x.max(p1.x).round();
        let top = p0.y.min(p1.y).round();
        let bottom = p0.y.max(p1.y).round();

        if ![left, right, top, bottom].iter().all(|v| v.is_finite()) {
            return Err(BgRemovalError::rendering(format!(
                "Rectangle {rect:?} maps outside the drawable range"
            )));
        }

        let device_width = right - left;
        let device_height = bottom - top;
        if device_width < 1.0 || device_height < 1.0 {
            return Ok(());
        }
        if device_width > f64::from(u32::MAX) || device_height > f64::from(u32::MAX) {
            return Err(BgRemovalError::rendering(format!(
                "Drawn rectangle {device_width}x{device_height} is too large"
            )));
        }
        let (device_width, device_height) = (device_width as u32, device_height as u32);

        let mut drawn = if source.dimensions() == (device_width, device_height) {
            source.clone()
        } else {
            imageops::resize(source, device_width, device_height, FilterType::Triangle)
        };
        if p1.x < p0.x {
            imageops::flip_horizontal_in_place(&mut drawn);
        }
        if p1.y < p0.y {
            imageops::flip_vertical_in_place(&mut drawn);
        }

        let (x, y) = (left as i64, top as i64);
        match op {
            CompositeOp::Copy => imageops::replace(&mut self.surface, &drawn, x, y),
            CompositeOp::SourceOver => imageops::overlay(&mut self.surface, &drawn, x, y),
        }

        Ok(())
    }

    #[must_use]
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.surface.get_pixel_checked(x, y).copied()
    }

    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.surface
    }
}

/// Reserve zeroed RGBA8 storage, reporting failure instead of aborting
fn allocate_surface(width: u32, height: u32) -> Result<RgbaImage> {
    let len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| {
            BgRemovalError::buffer_allocation(format!(
                "Surface size {width}x{height} overflows addressable memory"
            ))
        })?;

    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|e| {
        BgRemovalError::buffer_allocation(format!(
            "Failed to reserve {len} bytes for a {width}x{height} surface: {e}"
        ))
    })?;
    data.resize(len, 0);

    RgbaImage::from_raw(width, height, data).ok_or_else(|| {
        BgRemovalError::buffer_allocation(format!(
            "Surface storage does not match {width}x{height}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tone(width: u32, height: u32) -> RgbaImage {
        // top half red, bottom half blue
        RgbaImage::from_fn(width, height, |_, y| {
            if y < height / 2 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        })
    }

    #[test]
    fn test_new_canvas_is_transparent() {
        let canvas = Canvas::new(Size::new(8.0, 4.0)).unwrap();
        assert_eq!(canvas.dimensions(), (8, 4));
        assert_eq!(canvas.get_pixel(7, 3), Some(Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn test_render_rejects_empty_size() {
        let result = Canvas::render(Size::new(0.0, 10.0), |_| Ok(()));
        assert!(matches!(result, Err(BgRemovalError::Rendering(_))));
    }

    #[test]
    fn test_render_propagates_draw_failure() {
        let result = Canvas::render(Size::new(4.0, 4.0), |_| {
            Err(BgRemovalError::rendering("draw failed"))
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_draw_into_sub_rect_leaves_margins() {
        let source = RgbaImage::from_pixel(2, 4, Rgba([9, 9, 9, 255]));
        let image = Canvas::render(Size::new(8.0, 4.0), |canvas| {
            canvas.draw_image(&source, Rect::new(3.0, 0.0, 2.0, 4.0), CompositeOp::Copy)
        })
        .unwrap();

        assert_eq!(image.get_pixel(2, 0)[3], 0);
        assert_eq!(image.get_pixel(3, 0), &Rgba([9, 9, 9, 255]));
        assert_eq!(image.get_pixel(4, 3), &Rgba([9, 9, 9, 255]));
        assert_eq!(image.get_pixel(5, 3)[3], 0);
    }

    #[test]
    fn test_vertical_flip_transform_mirrors_rows() {
        let source = two_tone(4, 4);
        let image = Canvas::render(Size::new(4.0, 4.0), |canvas| {
            canvas.translate(0.0, 4.0);
            canvas.scale(1.0, -1.0);
            canvas.draw_image(&source, Rect::new(0.0, 0.0, 4.0, 4.0), CompositeOp::Copy)
        })
        .unwrap();

        assert_eq!(image.get_pixel(0, 0), &Rgba([0, 0, 255, 255]));
        assert_eq!(image.get_pixel(0, 3), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_rotated_transform_is_rejected() {
        let source = two_tone(4, 4);
        let result = Canvas::render(Size::new(4.0, 4.0), |canvas| {
            canvas.rotate_degrees(45.0);
            canvas.draw_image(&source, Rect::new(0.0, 0.0, 4.0, 4.0), CompositeOp::Copy)
        });
        assert!(matches!(result, Err(BgRemovalError::Rendering(_))));
    }

    #[test]
    fn test_saved_state_restored_after_failure() {
        let mut canvas = Canvas::new(Size::new(4.0, 4.0)).unwrap();
        let before = canvas.transform();
        let result: Result<()> = canvas.with_saved_state(|c| {
            c.scale(2.0, 2.0);
            Err(BgRemovalError::rendering("boom"))
        });
        assert!(result.is_err());
        assert_eq!(canvas.transform(), before);
    }

    #[test]
    fn test_source_over_keeps_destination_under_transparency() {
        let source = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0]));
        let mut canvas = Canvas::new(Size::new(2.0, 2.0)).unwrap();
        canvas.fill(Rgba([10, 20, 30, 255]));
        canvas
            .draw_image(&source, Rect::new(0.0, 0.0, 2.0, 2.0), CompositeOp::SourceOver)
            .unwrap();
        assert_eq!(canvas.get_pixel(1, 1), Some(Rgba([10, 20, 30, 255])));
    }
}
