//! Analysis grid specification
//!
//! A [`GridSpec`] is the pixel footprint every scene band, composite and
//! summary of one pipeline run shares: a north-up geotransform, a shape and
//! the EPSG code of the projected CRS the coordinates live in.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::GeoTransform;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
    pub epsg: u32,
}

impl GridSpec {
    pub fn new(transform: GeoTransform, rows: usize, cols: usize, epsg: u32) -> Self {
        Self {
            transform,
            rows,
            cols,
            epsg,
        }
    }

    /// Smallest grid of `cell_size` cells covering `bounds`
    /// `(min_x, min_y, max_x, max_y)`.
    ///
    /// The origin is snapped outward to a multiple of `cell_size` so grids
    /// built for the same region at the same scale always line up. A
    /// zero-width or zero-height extent still yields one cell.
    pub fn covering(bounds: (f64, f64, f64, f64), cell_size: f64, epsg: u32) -> Result<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(Error::InvalidParameter {
                name: "scale",
                value: cell_size.to_string(),
                reason: "must be a positive number of meters per pixel".into(),
            });
        }
        let (min_x, min_y, max_x, max_y) = bounds;
        if !(min_x.is_finite() && min_y.is_finite() && max_x.is_finite() && max_y.is_finite()) {
            return Err(Error::DegenerateGeometry("non-finite extent".into()));
        }

        let x0 = (min_x / cell_size).floor() * cell_size;
        let y0 = (max_y / cell_size).ceil() * cell_size;
        let x1 = (max_x / cell_size).ceil() * cell_size;
        let y1 = (min_y / cell_size).floor() * cell_size;

        let cols = (((x1 - x0) / cell_size).round() as usize).max(1);
        let rows = (((y0 - y1) / cell_size).round() as usize).max(1);

        Ok(Self::new(
            GeoTransform::new(x0, y0, cell_size, -cell_size),
            rows,
            cols,
            epsg,
        ))
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Area of one cell in km² (map units are meters)
    pub fn cell_area_km2(&self) -> f64 {
        self.transform.cell_area() / 1.0e6
    }

    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols, self.rows)
    }

    /// Center of cell `(row, col)` in map coordinates
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }
}
