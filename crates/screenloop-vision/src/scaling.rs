//! Logical points vs physical pixels.
//!
//! Pointer APIs take logical points; captures and every match box are in
//! physical pixels. `physical = logical * ratio`.

use screenloop_core::{Point, Region};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayScale {
    ratio: f64,
}

impl Default for DisplayScale {
    fn default() -> Self {
        Self { ratio: 1.0 }
    }
}

impl DisplayScale {
    /// Non-finite or non-positive ratios fall back to 1.0.
    pub fn new(ratio: f64) -> Self {
        if ratio.is_finite() && ratio > 0.0 {
            Self { ratio }
        } else {
            Self::default()
        }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn to_physical(&self, logical: i32) -> i32 {
        (logical as f64 * self.ratio).round() as i32
    }

    pub fn to_logical(&self, physical: i32) -> i32 {
        (physical as f64 / self.ratio).round() as i32
    }

    pub fn point_to_physical(&self, p: Point) -> Point {
        Point::new(self.to_physical(p.x), self.to_physical(p.y))
    }

    pub fn point_to_logical(&self, p: Point) -> Point {
        Point::new(self.to_logical(p.x), self.to_logical(p.y))
    }

    /// Regions are authored in logical points.
    pub fn region_to_physical(&self, r: Region) -> Region {
        Region::new(
            self.to_physical(r.x),
            self.to_physical(r.y),
            (r.width as f64 * self.ratio).round() as u32,
            (r.height as f64 * self.ratio).round() as u32,
        )
    }
}
