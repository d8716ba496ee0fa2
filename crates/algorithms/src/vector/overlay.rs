//! Polygon overlay and reprojection

use geo::{BooleanOps, MapCoords, MultiPolygon, Polygon};

use basinscope_core::{Result, CRS};

/// Union of a set of polygons
pub fn union_all(polygons: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    polygons
        .0
        .iter()
        .fold(MultiPolygon::new(vec![]), |acc, p| {
            acc.union(&MultiPolygon::new(vec![p.clone()]))
        })
}

/// Area shared by `a` and `b`
pub fn intersect(a: &Polygon<f64>, b: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(vec![a.clone()]).intersection(b)
}

/// Project WGS84 lon/lat polygons into `crs`
pub fn project_polygons(polygons: &MultiPolygon<f64>, crs: &CRS) -> Result<MultiPolygon<f64>> {
    polygons.try_map_coords(|c| -> Result<geo::Coord<f64>> {
        let (x, y) = crs.project(c.x, c.y)?;
        Ok(geo::Coord { x, y })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{Area, Rect};

    fn square(x0: f64, y0: f64, size: f64) -> Polygon<f64> {
        Rect::new((x0, y0), (x0 + size, y0 + size)).to_polygon()
    }

    #[test]
    fn test_union_of_overlapping_squares() {
        let mp = MultiPolygon::new(vec![square(0.0, 0.0, 2.0), square(1.0, 0.0, 2.0)]);
        assert_relative_eq!(union_all(&mp).unsigned_area(), 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_intersection_area() {
        let a = square(0.0, 0.0, 2.0);
        let b = MultiPolygon::new(vec![square(1.0, 1.0, 2.0)]);
        assert_relative_eq!(intersect(&a, &b).unsigned_area(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_disjoint_intersection_is_empty() {
        let a = square(0.0, 0.0, 1.0);
        let b = MultiPolygon::new(vec![square(5.0, 5.0, 1.0)]);
        assert!(intersect(&a, &b).0.is_empty());
    }

    #[test]
    fn test_project_polygons_to_utm() {
        let crs = CRS::from_epsg(32610);
        let lonlat = MultiPolygon::new(vec![square(-122.0, 44.0, 0.1)]);
        let projected = project_polygons(&lonlat, &crs).unwrap();
        // 0.1 degree square near 44N is roughly 8 km x 11 km
        let km2 = projected.unsigned_area() / 1e6;
        assert!(km2 > 80.0 && km2 < 100.0, "area {km2}");
    }

    #[test]
    fn test_project_unsupported_crs() {
        let lonlat = MultiPolygon::new(vec![square(0.0, 0.0, 1.0)]);
        assert!(project_polygons(&lonlat, &CRS::from_epsg(3857)).is_err());
    }
}
