//! Geometric value types used by the pipeline
//!
//! Sizes and rectangles are expressed in floating point like a 2D graphics
//! API would, and are only rounded to pixels when a surface is allocated.

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};

/// Width/height pair used for geometric computation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    #[must_use]
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn from_pixels(width: u32, height: u32) -> Self {
        Self::new(f64::from(width), f64::from(height))
    }

    /// Square box whose side is the longer of `width` and `height`
    ///
    /// Both the normalized original and the rescaled mask are produced at this
    /// size, which keeps them pixel-registered for compositing.
    #[must_use]
    pub fn square_bounding(width: f64, height: f64) -> Self {
        let longer = width.max(height);
        Self::new(longer, longer)
    }

    /// Round to whole pixels
    ///
    /// # Errors
    /// - Non-finite, negative or zero dimensions
    /// - Dimensions that do not fit in `u32`
    pub fn to_pixels(self) -> Result<(u32, u32)> {
        let round = |v: f64, axis: &str| -> Result<u32> {
            let rounded = v.round();
            if !rounded.is_finite() || rounded < 1.0 || rounded > f64::from(u32::MAX) {
                return Err(BgRemovalError::rendering(format!(
                    "Invalid surface {axis}: {v}"
                )));
            }
            Ok(rounded as u32)
        };
        Ok((round(self.width, "width")?, round(self.height, "height")?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in user space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

impl Rect {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    #[must_use]
    pub fn from_size(size: Size) -> Self {
        Self {
            origin: Point::default(),
            size,
        }
    }

    #[must_use]
    pub fn min_x(&self) -> f64 {
        self.origin.x
    }

    #[must_use]
    pub fn min_y(&self) -> f64 {
        self.origin.y
    }

    #[must_use]
    pub fn max_x(&self) -> f64 {
        self.origin.x + self.size.width
    }

    #[must_use]
    pub fn max_y(&self) -> f64 {
        self.origin.y + self.size.height
    }

    /// Whether `other` lies entirely within this rectangle
    #[must_use]
    pub fn contains_rect(&self, other: &Rect) -> bool {
        const EPS: f64 = 1e-9;
        other.min_x() >= self.min_x() - EPS
            && other.min_y() >= self.min_y() - EPS
            && other.max_x() <= self.max_x() + EPS
            && other.max_y() <= self.max_y() + EPS
    }
}

/// Policy for mapping a source rectangle into a destination while keeping its
/// aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScalingMode {
    /// Cover the destination; overflow is clipped
    AspectFill,
    /// Fit inside the destination; the remainder is letterboxed
    #[default]
    AspectFit,
}

impl ScalingMode {
    /// Scale factor between `target` and `source`
    #[must_use]
    pub fn aspect_ratio(self, target: Size, source: Size) -> f64 {
        let aspect_width = target.width / source.width;
        let aspect_height = target.height / source.height;

        match self {
            Self::AspectFill => aspect_width.max(aspect_height),
            Self::AspectFit => aspect_width.min(aspect_height),
        }
    }

    /// Rectangle `source` occupies when scaled into `target`, centered
    #[must_use]
    pub fn scaled_rect(self, source: Size, target: Size) -> Rect {
        let ratio = self.aspect_ratio(target, source);
        let width = source.width * ratio;
        let height = source.height * ratio;

        Rect::new(
            (target.width - width) / 2.0,
            (target.height - height) / 2.0,
            width,
            height,
        )
    }
}

/// 2D affine transform mapping `(x, y)` to
/// `(a*x + c*y + tx, b*x + d*y + ty)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    #[must_use]
    pub fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// Transform that applies `other` first, then `self`
    #[must_use]
    pub fn pre_concat(&self, other: &Transform) -> Self {
        Self {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            tx: self.a * other.tx + self.c * other.ty + self.tx,
            ty: self.b * other.tx + self.d * other.ty + self.ty,
        }
    }

    #[must_use]
    pub fn translated(&self, tx: f64, ty: f64) -> Self {
        self.pre_concat(&Self {
            tx,
            ty,
            ..Self::identity()
        })
    }

    #[must_use]
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        self.pre_concat(&Self {
            a: sx,
            d: sy,
            ..Self::identity()
        })
    }

    /// Rotate by `degrees`; right angles produce exact matrix entries
    #[must_use]
    pub fn rotated_degrees(&self, degrees: f64) -> Self {
        let radians = degrees.to_radians();
        let snap = |v: f64| {
            if (v - v.round()).abs() < 1e-9 {
                v.round()
            } else {
                v
            }
        };
        let (sin, cos) = (snap(radians.sin()), snap(radians.cos()));
        self.pre_concat(&Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            tx: 0.0,
            ty: 0.0,
        })
    }

    #[must_use]
    pub fn apply(&self, point: Point) -> Point {
        Point::new(
            self.a * point.x + self.c * point.y + self.tx,
            self.b * point.x + self.d * point.y + self.ty,
        )
    }

    /// True when the transform only scales, mirrors and translates
    #[must_use]
    pub fn is_axis_aligned(&self) -> bool {
        self.b == 0.0 && self.c == 0.0
    }
}
