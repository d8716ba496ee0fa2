//! North-up pixel ↔ map coordinate mapping

use serde::{Deserialize, Serialize};

/// Upper-left origin plus signed pixel size.
///
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height     (pixel_height < 0)
/// ```
///
/// Archive assets and composites are all north-up, so rotation terms are
/// not carried.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Map coordinates of a pixel's center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.corner(col as f64 + 0.5, row as f64 + 0.5)
    }

    fn corner(&self, col: f64, row: f64) -> (f64, f64) {
        (self.origin_x + col * self.pixel_width, self.origin_y + row * self.pixel_height)
    }

    /// Fractional `(col, row)` of a map position; NaN for a zero-size pixel
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        if self.pixel_width == 0.0 || self.pixel_height == 0.0 {
            return (f64::NAN, f64::NAN);
        }
        ((x - self.origin_x) / self.pixel_width, (y - self.origin_y) / self.pixel_height)
    }

    /// `(row, col)` of the cell containing `(x, y)` in a `rows` x `cols` grid
    pub fn cell_at(&self, x: f64, y: f64, rows: usize, cols: usize) -> Option<(usize, usize)> {
        let (col, row) = self.geo_to_pixel(x, y);
        if !(col >= 0.0 && row >= 0.0) {
            return None;
        }
        let (row, col) = (row.floor() as usize, col.floor() as usize);
        (row < rows && col < cols).then_some((row, col))
    }

    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Squared map units per cell
    pub fn cell_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height).abs()
    }

    /// `(min_x, min_y, max_x, max_y)` of a `width` x `height` grid
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.corner(0.0, 0.0);
        let (x1, y1) = self.corner(width as f64, height as f64);
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}
