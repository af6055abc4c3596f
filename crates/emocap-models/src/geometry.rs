//! Pixel-space geometry shared by tracking, capture and annotation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Exponential moving average: `(1 - alpha) * self + alpha * other`.
    pub fn blend(&self, other: &Point, alpha: f64) -> Point {
        Point {
            x: self.x * (1.0 - alpha) + other.x * alpha,
            y: self.y * (1.0 - alpha) + other.y * alpha,
        }
    }
}

/// Face bounding box in integer pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    /// Left edge x-coordinate
    pub x: i32,
    /// Top edge y-coordinate
    pub y: i32,
    /// Box width
    pub width: i32,
    /// Box height
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Integer center, as the detector reports it.
    #[inline]
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    #[inline]
    pub fn center_point(&self) -> Point {
        let (cx, cy) = self.center();
        Point::new(cx as f64, cy as f64)
    }

    #[inline]
    pub fn x2(&self) -> i32 {
        self.x + self.width
    }

    #[inline]
    pub fn y2(&self) -> i32 {
        self.y + self.height
    }

    /// A box with no area cannot be cropped or scaled.
    pub fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Grow by `padding` on every side and clip to the frame.
    ///
    /// Returns `None` when nothing of the box remains inside the frame.
    pub fn padded_within(&self, padding: i32, frame_width: u32, frame_height: u32) -> Option<CropRegion> {
        let x1 = (self.x - padding).max(0);
        let y1 = (self.y - padding).max(0);
        let x2 = (self.x2() + padding).min(frame_width as i32);
        let y2 = (self.y2() + padding).min(frame_height as i32);
        let region = CropRegion::new(x1, y1, x2, y2);
        (!region.is_empty()).then_some(region)
    }
}

/// Rectangular region given by its corners, `x2`/`y2` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct CropRegion {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl CropRegion {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Square region of side `size` centered on `(cx, cy)`.
    pub fn square(cx: i32, cy: i32, size: i32) -> Self {
        let half = size / 2;
        Self::new(cx - half, cy - half, cx - half + 2 * half, cy - half + 2 * half)
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn is_square(&self) -> bool {
        self.width() == self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// True when the region lies inside `[0, width] x [0, height]`.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x1 >= 0 && self.y1 >= 0 && self.x2 <= width as i32 && self.y2 <= height as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance_and_blend() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert_eq!(a.distance(&b), 5.0);

        let blended = Point::new(100.0, 100.0).blend(&Point::new(200.0, 0.0), 0.1);
        assert!((blended.x - 110.0).abs() < 1e-9);
        assert!((blended.y - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_bbox_center() {
        let bbox = BoundingBox::new(10, 20, 31, 40);
        assert_eq!(bbox.center(), (25, 40));
        assert!(!bbox.is_degenerate());
        assert!(BoundingBox::new(0, 0, 0, 10).is_degenerate());
    }

    #[test]
    fn test_padded_within_clips_to_frame() {
        let bbox = BoundingBox::new(5, 5, 20, 20);
        let region = bbox.padded_within(10, 30, 100).unwrap();
        assert_eq!(region, CropRegion::new(0, 0, 30, 35));
    }

    #[test]
    fn test_padded_within_outside_frame() {
        let bbox = BoundingBox::new(500, 500, 20, 20);
        assert!(bbox.padded_within(10, 100, 100).is_none());
    }

    #[test]
    fn test_square_is_square_for_odd_sizes() {
        let region = CropRegion::square(50, 50, 31);
        assert!(region.is_square());
        assert_eq!(region.width(), 30);
    }
}
