//! Pixel-space bounding boxes.

use itertools::{Itertools, MinMaxResult};
use serde::Serialize;

use crate::{image::Resolution, landmark::PixelPoint};

/// An axis-aligned, integer-valued bounding box in pixel coordinates.
///
/// The box uses the *exclusive* rectangle convention: `x_max` is `x_min + width`, where `width` is
/// the number of pixel columns covered. A box around a single pixel at `(x, y)` is therefore
/// `(x, y, x + 1, y + 1)`. Boxes are allowed to have zero width and/or height.
///
/// Serializes as `[x_min, y_min, x_max, y_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "[i32; 4]")]
pub struct BoundingBox {
    x_min: i32,
    y_min: i32,
    x_max: i32,
    y_max: i32,
}

impl BoundingBox {
    /// Creates a bounding box from its top left corner and its size.
    #[inline]
    pub fn from_top_left(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x_min: x,
            y_min: y,
            x_max: x.saturating_add_unsigned(width),
            y_max: y.saturating_add_unsigned(height),
        }
    }

    /// Computes the smallest box that covers every pixel in `points`.
    ///
    /// Returns [`None`] if `points` is empty.
    pub fn bounding<I: IntoIterator<Item = PixelPoint>>(points: I) -> Option<Self> {
        let points = points.into_iter().collect::<Vec<_>>();
        let (x_min, x_max) = min_max(points.iter().map(|p| p.x))?;
        let (y_min, y_max) = min_max(points.iter().map(|p| p.y))?;

        Some(Self {
            x_min,
            y_min,
            x_max: x_max.saturating_add(1),
            y_max: y_max.saturating_add(1),
        })
    }

    /// Restricts the box to the area of an image of the given resolution.
    #[must_use]
    pub fn clamp_to(&self, res: Resolution) -> Self {
        let w = i32::try_from(res.width()).unwrap_or(i32::MAX);
        let h = i32::try_from(res.height()).unwrap_or(i32::MAX);
        Self {
            x_min: self.x_min.clamp(0, w),
            y_min: self.y_min.clamp(0, h),
            x_max: self.x_max.clamp(0, w),
            y_max: self.y_max.clamp(0, h),
        }
    }

    #[inline]
    pub fn x_min(&self) -> i32 {
        self.x_min
    }

    #[inline]
    pub fn y_min(&self) -> i32 {
        self.y_min
    }

    #[inline]
    pub fn x_max(&self) -> i32 {
        self.x_max
    }

    #[inline]
    pub fn y_max(&self) -> i32 {
        self.y_max
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.x_max.abs_diff(self.x_min)
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.y_max.abs_diff(self.y_min)
    }

    /// Returns whether the pixel at `point` lies inside this box.
    pub fn contains(&self, point: PixelPoint) -> bool {
        (self.x_min..self.x_max).contains(&point.x) && (self.y_min..self.y_max).contains(&point.y)
    }

    /// Returns the box as `[x_min, y_min, x_max, y_max]`.
    pub fn to_array(&self) -> [i32; 4] {
        [self.x_min, self.y_min, self.x_max, self.y_max]
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(bbox: BoundingBox) -> Self {
        bbox.to_array()
    }
}

fn min_max(values: impl Iterator<Item = i32>) -> Option<(i32, i32)> {
    match values.minmax() {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(v) => Some((v, v)),
        MinMaxResult::MinMax(min, max) => Some((min, max)),
    }
}
