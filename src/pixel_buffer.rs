//! Fixed-format pixel buffers exchanged with inference backends

use crate::{
    canvas::{Canvas, CompositeOp},
    error::{BgRemovalError, Result},
    geometry::Rect,
    models::PreprocessingConfig,
    raster::Drawable,
};
use ndarray::{Array4, Axis};
use tracing::debug;

/// Row stride alignment in bytes
const ROW_ALIGNMENT: usize = 64;

/// Pixel layout of a [`PixelBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit components, first byte skipped (always written as 0xFF), then
    /// red, green and blue
    Argb32,
}

impl PixelFormat {
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Argb32 => 4,
        }
    }
}

/// Order in which visual rows are laid out in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder {
    /// Memory row 0 is the top visual row
    TopDown,
    /// Memory row 0 is the bottom visual row
    BottomUp,
}

/// Raw pixel buffer used as the inference boundary type
///
/// Rows are padded to a 64-byte aligned stride; every access goes through
/// [`PixelBuffer::bytes_per_row`].
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    bytes_per_row: usize,
    format: PixelFormat,
    row_order: RowOrder,
    data: Vec<u8>,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes_per_row", &self.bytes_per_row)
            .field("format", &self.format)
            .field("row_order", &self.row_order)
            .finish_non_exhaustive()
    }
}

impl PixelBuffer {
    /// Allocate a zeroed buffer
    ///
    /// # Errors
    /// - `BufferAllocation` for zero dimensions, size overflow or when the
    ///   allocator refuses the request
    pub fn allocate(
        width: u32,
        height: u32,
        format: PixelFormat,
        row_order: RowOrder,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(BgRemovalError::buffer_allocation(format!(
                "Cannot allocate a {width}x{height} pixel buffer"
            )));
        }

        let overflow = || {
            BgRemovalError::buffer_allocation(format!(
                "Pixel buffer size {width}x{height} overflows addressable memory"
            ))
        };
        let bytes_per_row = (width as usize)
            .checked_mul(format.bytes_per_pixel())
            .and_then(|n| n.checked_add(ROW_ALIGNMENT - 1))
            .map(|n| n / ROW_ALIGNMENT * ROW_ALIGNMENT)
            .ok_or_else(overflow)?;
        let len = bytes_per_row
            .checked_mul(height as usize)
            .ok_or_else(overflow)?;

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            BgRemovalError::buffer_allocation(format!(
                "Failed to reserve {len} bytes for a {width}x{height} pixel buffer: {e}"
            ))
        })?;
        data.resize(len, 0);

        Ok(Self {
            width,
            height,
            bytes_per_row,
            format,
            row_order,
            data,
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[must_use]
    pub fn row_order(&self) -> RowOrder {
        self.row_order
    }

    /// Memory row holding visual row `y`
    #[must_use]
    pub fn memory_row(&self, y: u32) -> u32 {
        match self.row_order {
            RowOrder::TopDown => y,
            RowOrder::BottomUp => self.height.saturating_sub(1).saturating_sub(y),
        }
    }

    fn row_range(&self, memory_row: u32) -> Option<std::ops::Range<usize>> {
        if memory_row >= self.height {
            return None;
        }
        let start = memory_row as usize * self.bytes_per_row;
        Some(start..start + self.width as usize * self.format.bytes_per_pixel())
    }

    /// Pixel bytes of a memory row, padding excluded
    #[must_use]
    pub fn raw_row(&self, memory_row: u32) -> Option<&[u8]> {
        self.row_range(memory_row)
            .and_then(|range| self.data.get(range))
    }

    fn raw_row_mut(&mut self, memory_row: u32) -> Option<&mut [u8]> {
        self.row_range(memory_row)
            .and_then(|range| self.data.get_mut(range))
    }

    /// ARGB components at visual coordinates
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = x as usize * self.format.bytes_per_pixel();
        self.raw_row(self.memory_row(y))
            .and_then(|row| row.get(offset..offset + 4))
            .and_then(|px| px.try_into().ok())
    }

    /// Build a buffer from single-channel values given in visual row order
    ///
    /// # Errors
    /// - `Inference` when `values` does not hold `width * height` entries
    /// - `BufferAllocation` from [`PixelBuffer::allocate`]
    pub fn from_gray(width: u32, height: u32, values: &[u8], row_order: RowOrder) -> Result<Self> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(BgRemovalError::inference(format!(
                "Mask has {} values, expected {expected} for {width}x{height}",
                values.len()
            )));
        }

        let mut buffer = Self::allocate(width, height, PixelFormat::Argb32, row_order)?;
        for (y, visual_row) in values.chunks_exact(width as usize).enumerate() {
            let memory_row = buffer.memory_row(y as u32);
            let row = buffer.raw_row_mut(memory_row).ok_or_else(|| {
                BgRemovalError::internal(format!("Row {memory_row} missing from pixel buffer"))
            })?;
            for (px, &v) in row.chunks_exact_mut(4).zip(visual_row) {
                px.copy_from_slice(&[0xFF, v, v, v]);
            }
        }
        Ok(buffer)
    }

    /// Build a mask buffer from an NCHW model output
    ///
    /// The first channel of the first batch entry is min-max normalised to
    /// `0..=255` and replicated across the color components. A constant map
    /// is clamped to `0..=1` instead.
    ///
    /// # Errors
    /// - `Inference` for empty tensors or non-finite values
    #[allow(clippy::indexing_slicing)]
    pub fn from_mask_tensor(tensor: &Array4<f32>, row_order: RowOrder) -> Result<Self> {
        let (batch, channels, height, width) = tensor.dim();
        if batch == 0 || channels == 0 || height == 0 || width == 0 {
            return Err(BgRemovalError::inference(format!(
                "Model produced an empty mask tensor {:?}",
                tensor.shape()
            )));
        }
        let (Ok(width_px), Ok(height_px)) = (u32::try_from(width), u32::try_from(height)) else {
            return Err(BgRemovalError::inference(format!(
                "Mask tensor {width}x{height} is too large"
            )));
        };

        let plane = tensor.index_axis(Axis(0), 0);
        let plane = plane.index_axis(Axis(0), 0);

        let (mut min, mut max) = (f32::INFINITY, f32::NEG_INFINITY);
        for &v in &plane {
            if !v.is_finite() {
                return Err(BgRemovalError::inference(
                    "Model produced a non-finite mask value",
                ));
            }
            min = min.min(v);
            max = max.max(v);
        }
        let range = max - min;
        debug!(min, max, "Normalizing mask tensor");

        let values: Vec<u8> = plane
            .iter()
            .map(|&v| {
                let unit = if range > f32::EPSILON {
                    (v - min) / range
                } else {
                    v.clamp(0.0, 1.0)
                };
                (unit * 255.0).round() as u8
            })
            .collect();

        Self::from_gray(width_px, height_px, &values, row_order)
    }

    /// Upright NCHW tensor normalised as `(v / 255 - mean) / std`
    #[must_use]
    #[allow(clippy::indexing_slicing)]
    pub fn to_rgb_tensor(&self, config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = (self.width as usize, self.height as usize);
        let mut tensor = Array4::<f32>::zeros((1, 3, height, width));
        let mean = config.normalization_mean;
        let std = config.normalization_std;

        for y in 0..height {
            let Some(row) = self.raw_row(self.memory_row(y as u32)) else {
                continue;
            };
            for (x, px) in row.chunks_exact(4).enumerate() {
                for c in 0..3 {
                    let v = f32::from(px[c + 1]) / 255.0;
                    tensor[[0, c, y, x]] = (v - mean[c]) / std[c];
                }
            }
        }
        tensor
    }

    /// Single-channel intensities in visual row order (first color component)
    #[must_use]
    pub fn to_gray_values(&self) -> Vec<u8> {
        let mut values = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            if let Some(row) = self.raw_row(self.memory_row(y)) {
                values.extend(row.chunks_exact(4).map(|px| px[1]));
            }
        }
        values
    }
}

/// Rasterizes images into inference input buffers
#[derive(Debug, Clone, Copy, Default)]
pub struct PixelBufferAdapter;

impl PixelBufferAdapter {
    /// Rasterize `image` at its own size into a bottom-up ARGB32 buffer
    ///
    /// The drawing context is flipped vertically before rendering, so canvas
    /// row `r` lands in memory row `r` and the top visual row ends up last in
    /// memory. Partially transparent pixels are composited over black since
    /// the buffer has no alpha.
    ///
    /// # Errors
    /// - `BufferAllocation` when the buffer or the off-screen surface cannot
    ///   be allocated
    /// - `Rendering` when drawing fails
    pub fn rasterize<D: Drawable + ?Sized>(image: &D) -> Result<PixelBuffer> {
        let (width, height) = (image.width(), image.height());
        let mut buffer =
            PixelBuffer::allocate(width, height, PixelFormat::Argb32, RowOrder::BottomUp)?;

        let size = image.size();
        let rendered = Canvas::render(size, |canvas| {
            canvas.translate(0.0, size.height);
            canvas.scale(1.0, -1.0);
            image.draw_into(canvas, Rect::from_size(size), CompositeOp::Copy)
        })?;

        for (memory_row, row) in rendered.rows().enumerate() {
            let dst = buffer.raw_row_mut(memory_row as u32).ok_or_else(|| {
                BgRemovalError::rendering(format!(
                    "Rendered row {memory_row} does not fit a {width}x{height} buffer"
                ))
            })?;
            for (pixel, out) in row.zip(dst.chunks_exact_mut(4)) {
                let [r, g, b, a] = pixel.0;
                let over_black = |v: u8| ((u16::from(v) * u16::from(a) + 127) / 255) as u8;
                out.copy_from_slice(&[0xFF, over_black(r), over_black(g), over_black(b)]);
            }
        }

        Ok(buffer)
    }
}
