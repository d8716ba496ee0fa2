//! Coordinate Reference System handling
//!
//! Regions, scene grids and composites live in a projected metric CRS so
//! that buffers, pixel areas and region areas are in meters. Inputs from the
//! outside world (the region center, watershed polygons, STAC bounding boxes)
//! are WGS84 longitude/latitude; [`CRS::project`] and [`CRS::unproject`]
//! convert between the two for UTM zones.

mod utm;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

pub use utm::parse_utm_epsg;

/// EPSG code of WGS84 geographic coordinates
pub const WGS84_EPSG: u32 = 4326;

/// Coordinate Reference System identified by its EPSG code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CRS {
    epsg: u32,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self { epsg: code }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(WGS84_EPSG)
    }

    /// WGS84 / UTM zone `zone` (EPSG 326xx north, 327xx south)
    pub fn utm(zone: u32, north: bool) -> Result<Self> {
        if !(1..=60).contains(&zone) {
            return Err(Error::InvalidParameter {
                name: "utm_zone",
                value: zone.to_string(),
                reason: "UTM zones run from 1 to 60".into(),
            });
        }
        let base = if north { 32600 } else { 32700 };
        Ok(Self::from_epsg(base + zone))
    }

    /// The UTM zone containing a WGS84 longitude/latitude
    pub fn utm_for_lonlat(lon: f64, lat: f64) -> Result<Self> {
        let zone = (((lon + 180.0) / 6.0).floor() as i64 + 1).clamp(1, 60) as u32;
        Self::utm(zone, lat >= 0.0)
    }

    /// Get the EPSG code
    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    pub fn is_wgs84(&self) -> bool {
        self.epsg == WGS84_EPSG
    }

    /// Project a WGS84 `(lon, lat)` into this CRS.
    pub fn project(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        if self.is_wgs84() {
            return Ok((lon, lat));
        }
        let (zone, north) = parse_utm_epsg(self.epsg).ok_or(Error::UnsupportedCrs(self.epsg))?;
        Ok(utm::wgs84_to_utm(lon, lat, zone, north))
    }

    /// Convert `(x, y)` in this CRS back to WGS84 `(lon, lat)`.
    pub fn unproject(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        if self.is_wgs84() {
            return Ok((x, y));
        }
        let (zone, north) = parse_utm_epsg(self.epsg).ok_or(Error::UnsupportedCrs(self.epsg))?;
        Ok(utm::utm_to_wgs84(x, y, zone, north))
    }

    /// WGS84 envelope `(west, south, east, north)` of a bounding box in this CRS.
    ///
    /// All four corners are transformed so the non-linear distortion of
    /// the projection stays inside the envelope.
    pub fn bounds_to_wgs84(&self, bounds: (f64, f64, f64, f64)) -> Result<(f64, f64, f64, f64)> {
        let (min_x, min_y, max_x, max_y) = bounds;
        let corners = [(min_x, min_y), (min_x, max_y), (max_x, min_y), (max_x, max_y)];

        let mut west = f64::MAX;
        let mut south = f64::MAX;
        let mut east = f64::MIN;
        let mut north = f64::MIN;
        for (x, y) in corners {
            let (lon, lat) = self.unproject(x, y)?;
            west = west.min(lon);
            south = south.min(lat);
            east = east.max(lon);
            north = north.max(lat);
        }
        Ok((west, south, east, north))
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utm_for_lonlat() {
        // Hogg Pass, Oregon: zone 10 north
        assert_eq!(CRS::utm_for_lonlat(-121.85, 44.4167).unwrap().epsg(), 32610);
        assert_eq!(CRS::utm_for_lonlat(-58.38, -34.6).unwrap().epsg(), 32721);
        assert_eq!(CRS::utm_for_lonlat(180.0, 10.0).unwrap().epsg(), 32660);
    }

    #[test]
    fn test_utm_zone_range() {
        assert!(CRS::utm(0, true).is_err());
        assert!(CRS::utm(61, true).is_err());
        assert_eq!(CRS::utm(30, false).unwrap().epsg(), 32730);
    }

    #[test]
    fn test_project_unsupported() {
        let crs = CRS::from_epsg(3857);
        assert!(matches!(crs.project(0.0, 0.0), Err(Error::UnsupportedCrs(3857))));
    }

    #[test]
    fn test_wgs84_is_identity() {
        let crs = CRS::wgs84();
        assert_eq!(crs.project(-121.85, 44.4).unwrap(), (-121.85, 44.4));
        assert_eq!(crs.to_string(), "EPSG:4326");
    }

    #[test]
    fn test_bounds_to_wgs84_contains_corners() {
        let crs = CRS::from_epsg(32610);
        let (x, y) = crs.project(-121.85, 44.4167).unwrap();
        let (w, s, e, n) = crs
            .bounds_to_wgs84((x - 14_000.0, y - 14_000.0, x + 14_000.0, y + 14_000.0))
            .unwrap();
        assert!(w < -121.85 && e > -121.85);
        assert!(s < 44.4167 && n > 44.4167);
        // 28 km is about a quarter degree of latitude
        assert!((n - s) > 0.2 && (n - s) < 0.3);
    }
}
