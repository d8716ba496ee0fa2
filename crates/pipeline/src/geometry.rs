//! Analysis region construction
//!
//! The region is a circle of `radius_m` around a point of interest (a
//! SNOTEL station, a gauge) clipped to one watershed. Watershed polygons are
//! served in WGS84; both they and the center are projected to a UTM zone
//! before buffering so the radius is in meters.

use geo::{Area, Point};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use basinscope_algorithms::vector::{buffer_point, intersect, project_polygons, union_all, BufferParams};
use basinscope_core::{Error, FeatureFilter, FeatureService, Region, Result, CRS};

/// Circle approximation used for the buffer
pub const BUFFER_SEGMENTS: usize = 64;

/// Which watershed(s) to clip to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatershedQuery {
    /// Feature collection id, e.g. `huc8`
    pub collection: String,
    /// Attribute to match, e.g. `huc8`
    pub field: String,
    /// Value the attribute must equal, e.g. `17090004`
    pub id: String,
}

impl WatershedQuery {
    pub fn new(collection: impl Into<String>, field: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            field: field.into(),
            id: id.into(),
        }
    }
}

/// Projected CRS for an analysis centered at `(lon, lat)`.
///
/// An explicit EPSG code wins; otherwise the UTM zone of the center.
pub fn target_crs(lon: f64, lat: f64, epsg: Option<u32>) -> Result<CRS> {
    match epsg {
        Some(code) => {
            let crs = CRS::from_epsg(code);
            if crs.is_wgs84() {
                return Err(Error::InvalidParameter {
                    name: "epsg",
                    value: code.to_string(),
                    reason: "analysis CRS must be projected".into(),
                });
            }
            Ok(crs)
        }
        None => CRS::utm_for_lonlat(lon, lat),
    }
}

/// `buffer(center, radius_m) ∩ union(watershed polygons)` in a projected CRS.
///
/// No feature matching the query fails with `EmptyRegion`; a buffer that
/// misses the watershed fails with `DegenerateGeometry`.
pub fn region_for<F: FeatureService + ?Sized>(
    features: &F,
    watershed: &WatershedQuery,
    center: (f64, f64),
    radius_m: f64,
    epsg: Option<u32>,
) -> Result<Region> {
    let (lon, lat) = center;
    let crs = target_crs(lon, lat, epsg)?;

    let filter = FeatureFilter::equals(&watershed.field, &watershed.id);
    let matched = features.get_features(&watershed.collection, &filter)?;

    let lonlat = geo::MultiPolygon::new(matched.iter().flat_map(|f| f.polygons().0).collect());
    if lonlat.0.is_empty() {
        return Err(Error::EmptyRegion {
            collection: watershed.collection.clone(),
            field: watershed.field.clone(),
            value: watershed.id.clone(),
        });
    }
    debug!(
        collection = %watershed.collection,
        features = matched.len(),
        polygons = lonlat.0.len(),
        "watershed polygons"
    );

    let watershed_polys = union_all(&project_polygons(&lonlat, &crs)?);

    let (x, y) = crs.project(lon, lat)?;
    let params = BufferParams {
        distance: radius_m,
        segments: BUFFER_SEGMENTS,
    };
    let circle = buffer_point(&Point::new(x, y), &params)?;

    let clipped = intersect(&circle, &watershed_polys);
    if clipped.0.is_empty() || clipped.unsigned_area() <= 0.0 {
        return Err(Error::DegenerateGeometry(format!(
            "{radius_m} m buffer around ({lon}, {lat}) does not intersect {} {} = {}",
            watershed.collection, watershed.field, watershed.id
        )));
    }

    let region = Region::new(clipped, crs)?;
    info!(crs = %crs, area_km2 = region.area_km2(), "analysis region");
    Ok(region)
}
