//! The analysis region
//!
//! A [`Region`] is the polygon every query is filtered by and every
//! composite is clipped to and summarized over. It is built once per run and
//! never mutated.

use geo::{Area, BoundingRect, Contains, MultiPolygon, Point, Polygon};
use ndarray::Array2;

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::GridSpec;

/// Planar analysis polygon in a projected metric CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    polygons: MultiPolygon<f64>,
    crs: CRS,
}

impl Region {
    /// Build a region from one or more polygons.
    ///
    /// Fails on an empty polygon set. Zero-area (degenerate) polygons are
    /// accepted: such a region still has a footprint, it just covers no area.
    pub fn new(polygons: MultiPolygon<f64>, crs: CRS) -> Result<Self> {
        if polygons.0.is_empty() || polygons.0.iter().all(|p| p.exterior().0.is_empty()) {
            return Err(Error::DegenerateGeometry("region has no polygons".into()));
        }
        if crs.is_wgs84() {
            return Err(Error::InvalidParameter {
                name: "crs",
                value: crs.to_string(),
                reason: "regions must be in a projected metric CRS".into(),
            });
        }
        Ok(Self { polygons, crs })
    }

    pub fn from_polygon(polygon: Polygon<f64>, crs: CRS) -> Result<Self> {
        Self::new(MultiPolygon::new(vec![polygon]), crs)
    }

    /// Axis-aligned rectangle `(min_x, min_y)`–`(max_x, max_y)`
    pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64, crs: CRS) -> Result<Self> {
        let polygon = geo::Rect::new((min_x, min_y), (max_x, max_y)).to_polygon();
        Self::from_polygon(polygon, crs)
    }

    pub fn polygons(&self) -> &MultiPolygon<f64> {
        &self.polygons
    }

    pub fn crs(&self) -> CRS {
        self.crs
    }

    pub fn epsg(&self) -> u32 {
        self.crs.epsg()
    }

    pub fn area_m2(&self) -> f64 {
        self.polygons.unsigned_area()
    }

    pub fn area_km2(&self) -> f64 {
        self.area_m2() / 1.0e6
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)`
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        match self.polygons.bounding_rect() {
            Some(rect) => (rect.min().x, rect.min().y, rect.max().x, rect.max().y),
            None => (f64::NAN, f64::NAN, f64::NAN, f64::NAN),
        }
    }

    /// Bounding box in WGS84 `(west, south, east, north)`
    pub fn bounds_wgs84(&self) -> Result<(f64, f64, f64, f64)> {
        self.crs.bounds_to_wgs84(self.bounds())
    }

    /// Whether the point `(x, y)` lies strictly inside the region
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygons.contains(&Point::new(x, y))
    }

    /// The analysis grid covering this region at `scale` meters per pixel
    pub fn grid(&self, scale: f64) -> Result<GridSpec> {
        GridSpec::covering(self.bounds(), scale, self.epsg())
    }

    /// Cells of `grid` whose center lies inside the region
    pub fn cell_mask(&self, grid: &GridSpec) -> Result<Array2<bool>> {
        if grid.epsg != self.epsg() {
            return Err(Error::CrsMismatch(grid.epsg, self.epsg()));
        }
        Ok(Array2::from_shape_fn(grid.shape(), |(row, col)| {
            let (x, y) = grid.cell_center(row, col);
            self.contains(x, y)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::LineString;

    fn utm() -> CRS {
        CRS::from_epsg(32610)
    }

    #[test]
    fn test_rectangle_area() {
        let region = Region::rectangle(0.0, 0.0, 10_000.0, 10_000.0, utm()).unwrap();
        assert_relative_eq!(region.area_km2(), 100.0, epsilon = 1e-9);
        assert_eq!(region.bounds(), (0.0, 0.0, 10_000.0, 10_000.0));
    }

    #[test]
    fn test_empty_polygon_set_rejected() {
        let result = Region::new(MultiPolygon::new(vec![]), utm());
        assert!(matches!(result, Err(Error::DegenerateGeometry(_))));
    }

    #[test]
    fn test_wgs84_rejected() {
        let result = Region::rectangle(0.0, 0.0, 1.0, 1.0, CRS::wgs84());
        assert!(result.is_err());
    }

    #[test]
    fn test_degenerate_region_has_zero_area() {
        let sliver = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (100.0, 0.0), (200.0, 0.0), (0.0, 0.0)]),
            vec![],
        );
        let region = Region::from_polygon(sliver, utm()).unwrap();
        assert_eq!(region.area_km2(), 0.0);
        assert!(region.area_km2() >= 0.0);
    }

    #[test]
    fn test_cell_mask_triangle() {
        let triangle = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (0.0, 4.0), (0.0, 0.0)]),
            vec![],
        );
        let region = Region::from_polygon(triangle, utm()).unwrap();
        let grid = region.grid(1.0).unwrap();
        let mask = region.cell_mask(&grid).unwrap();

        assert_eq!(mask.dim(), (4, 4));
        // Bottom-left corner cell is inside, top-right is not
        assert!(mask[(3, 0)]);
        assert!(!mask[(0, 3)]);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 6);
    }
}
