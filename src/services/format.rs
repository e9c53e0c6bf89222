//! Output format handling service
//!
//! Keeps encoding decisions out of the pipeline: the processor only ever
//! produces RGBA images and this service turns them into bytes.

use crate::{
    config::OutputFormat,
    error::{BgRemovalError, Result},
};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat, RgbImage, RgbaImage};
use std::io::Cursor;

/// Service for handling output format conversions
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Convert an RGBA image to the pixel layout the format stores
    ///
    /// JPEG has no alpha, so pixels are composited over black.
    ///
    /// # Examples
    /// ```rust
    /// use bgremoval::{config::OutputFormat, services::OutputFormatHandler};
    /// use image::{DynamicImage, RgbaImage};
    ///
    /// let converted = OutputFormatHandler::convert_format(RgbaImage::new(4, 4), OutputFormat::Jpeg);
    /// assert!(matches!(converted, DynamicImage::ImageRgb8(_)));
    /// ```
    #[must_use]
    pub fn convert_format(rgba_image: RgbaImage, format: OutputFormat) -> DynamicImage {
        match format {
            OutputFormat::Png | OutputFormat::Rgba8 | OutputFormat::Tiff | OutputFormat::WebP => {
                DynamicImage::ImageRgba8(rgba_image)
            },
            OutputFormat::Jpeg => DynamicImage::ImageRgb8(Self::over_black(&rgba_image)),
        }
    }

    fn over_black(rgba_image: &RgbaImage) -> RgbImage {
        RgbImage::from_fn(rgba_image.width(), rgba_image.height(), |x, y| {
            let [r, g, b, a] = rgba_image.get_pixel(x, y).0;
            let scale = |v: u8| ((u16::from(v) * u16::from(a) + 127) / 255) as u8;
            image::Rgb([scale(r), scale(g), scale(b)])
        })
    }

    /// Encode `rgba_image` as `format`
    ///
    /// `quality` only applies to JPEG. [`OutputFormat::Rgba8`] yields the raw
    /// pixel bytes.
    ///
    /// # Errors
    /// - `Image` when the encoder fails
    /// - `InvalidConfig` for WebP without the `webp-support` feature
    pub fn encode(rgba_image: &RgbaImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        match format {
            OutputFormat::Rgba8 => return Ok(rgba_image.as_raw().clone()),
            OutputFormat::Png => {
                rgba_image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
            },
            OutputFormat::Tiff => {
                rgba_image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Tiff)?;
            },
            OutputFormat::Jpeg => {
                let rgb = Self::over_black(rgba_image);
                JpegEncoder::new_with_quality(&mut buffer, quality.min(100)).encode_image(&rgb)?;
            },
            OutputFormat::WebP => {
                #[cfg(feature = "webp-support")]
                {
                    rgba_image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::WebP)?;
                }
                #[cfg(not(feature = "webp-support"))]
                {
                    return Err(BgRemovalError::invalid_config(
                        "WebP output requires the webp-support feature",
                    ));
                }
            },
        }

        if buffer.is_empty() {
            return Err(BgRemovalError::rendering(format!(
                "{format:?} encoder produced no data"
            )));
        }
        Ok(buffer)
    }

    /// File extension for a given output format (without the dot)
    ///
    /// # Examples
    /// ```rust
    /// use bgremoval::{config::OutputFormat, services::OutputFormatHandler};
    ///
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Png), "png");
    /// assert_eq!(OutputFormatHandler::get_extension(OutputFormat::Jpeg), "jpg");
    /// ```
    #[must_use]
    pub fn get_extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::WebP => "webp",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Rgba8 => "raw",
        }
    }

    /// Guess the output format from a file extension
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<OutputFormat> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(OutputFormat::Png),
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            "webp" => Some(OutputFormat::WebP),
            "tif" | "tiff" => Some(OutputFormat::Tiff),
            "raw" | "rgba" => Some(OutputFormat::Rgba8),
            _ => None,
        }
    }

    #[must_use]
    pub fn supports_transparency(format: OutputFormat) -> bool {
        !matches!(format, OutputFormat::Jpeg)
    }

    /// Warn about formats that lose the cut-out transparency
    pub fn validate_for_background_removal(format: OutputFormat) {
        if !Self::supports_transparency(format) {
            log::warn!(
                "Output format {format:?} does not support transparency. Removed areas will be black."
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_convert_format_jpeg_composites_over_black() {
        let rgba_image = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 128]));
        let DynamicImage::ImageRgb8(rgb) =
            OutputFormatHandler::convert_format(rgba_image, OutputFormat::Jpeg)
        else {
            panic!("Expected RGB8 image for JPEG format");
        };
        assert_eq!(rgb.get_pixel(0, 0), &image::Rgb([128, 0, 0]));
    }

    #[test]
    fn test_encode_png_round_trips_alpha() {
        let mut rgba_image = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 255]));
        rgba_image.put_pixel(1, 1, Rgba([0, 0, 0, 0]));

        let bytes = OutputFormatHandler::encode(&rgba_image, OutputFormat::Png, 90).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, rgba_image);
    }

    #[test]
    fn test_encode_jpeg_and_raw() {
        let rgba_image = RgbaImage::from_pixel(8, 8, Rgba([200, 100, 50, 255]));

        let jpeg = OutputFormatHandler::encode(&rgba_image, OutputFormat::Jpeg, 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let raw = OutputFormatHandler::encode(&rgba_image, OutputFormat::Rgba8, 0).unwrap();
        assert_eq!(raw.len(), 8 * 8 * 4);
    }

    #[cfg(not(feature = "webp-support"))]
    #[test]
    fn test_webp_requires_feature() {
        let result = OutputFormatHandler::encode(&RgbaImage::new(1, 1), OutputFormat::WebP, 90);
        assert!(matches!(result, Err(BgRemovalError::InvalidConfig(_))));
    }

    #[test]
    fn test_extensions() {
        for format in [
            OutputFormat::Png,
            OutputFormat::Jpeg,
            OutputFormat::WebP,
            OutputFormat::Tiff,
            OutputFormat::Rgba8,
        ] {
            let extension = OutputFormatHandler::get_extension(format);
            assert_eq!(OutputFormatHandler::from_extension(extension), Some(format));
        }
        assert_eq!(OutputFormatHandler::from_extension("JPEG"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormatHandler::from_extension("bmp"), None);
    }

    #[test]
    fn test_supports_transparency() {
        assert!(OutputFormatHandler::supports_transparency(OutputFormat::Png));
        assert!(OutputFormatHandler::supports_transparency(OutputFormat::Tiff));
        assert!(!OutputFormatHandler::supports_transparency(OutputFormat::Jpeg));
    }
}
