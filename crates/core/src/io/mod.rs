//! GeoTIFF reading and writing

mod native;

pub use native::{
    epsg_from_geokeys, parse_gdal_nodata, read_geotiff, read_geotiff_from_buffer, transform_from_model_tags,
    write_geotiff, write_geotiff_to_buffer, GeoTiffOptions,
};
