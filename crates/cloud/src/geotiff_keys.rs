//! Georeferencing of a remote GeoTIFF from its directory tags
//!
//! Transform from ModelPixelScale + ModelTiepoint, or from a
//! ModelTransformation matrix without rotation. CRS from the GeoKey
//! directory and the no-data sentinel from GDAL_NODATA.

use basinscope_core::io::{epsg_from_geokeys, parse_gdal_nodata, transform_from_model_tags};
use basinscope_core::GeoTransform;

use crate::error::{CloudError, Result};
use crate::ifd::{tags, TagValues};

#[derive(Debug, Clone, PartialEq)]
pub struct GeoTiffMeta {
    pub transform: GeoTransform,
    pub epsg: Option<u32>,
    pub nodata: Option<f64>,
}

pub fn extract_geotiff_meta(values: &TagValues<'_>) -> Result<GeoTiffMeta> {
    Ok(GeoTiffMeta {
        transform: extract_transform(values)?,
        epsg: values.u16s(tags::GEO_KEY_DIRECTORY).and_then(|keys| epsg_from_geokeys(&keys)),
        nodata: values.ascii(tags::GDAL_NODATA).and_then(|text| parse_gdal_nodata(&text)),
    })
}

fn extract_transform(values: &TagValues<'_>) -> Result<GeoTransform> {
    if let (Some(scale), Some(tiepoint)) = (
        values.f64s(tags::MODEL_PIXEL_SCALE),
        values.f64s(tags::MODEL_TIEPOINT),
    ) {
        if let Some(transform) = transform_from_model_tags(&scale, &tiepoint) {
            return Ok(transform);
        }
    }

    // Row-major 4x4: x = t[3] + col * t[0] + row * t[1], y = t[7] + col * t[4] + row * t[5]
    if let Some(t) = values.f64s(tags::MODEL_TRANSFORMATION).filter(|t| t.len() >= 16) {
        if t[1] != 0.0 || t[4] != 0.0 {
            return Err(CloudError::UnsupportedLayout("rotated model transformation".into()));
        }
        return Ok(GeoTransform::new(t[3], t[7], t[0], t[5]));
    }

    Err(CloudError::InvalidTiff("no georeferencing tags".into()))
}
