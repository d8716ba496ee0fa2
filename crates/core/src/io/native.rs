//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate for TIFF I/O. Georeferencing is carried in the
//! ModelPixelScale/ModelTiepoint tags, the CRS in the GeoKey directory and
//! the no-data sentinel in the GDAL_NODATA tag. Sentinel values are turned
//! into `NaN` on read; rasters are written with `NaN` as their sentinel.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray64Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

fn tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Overrides the raster's own EPSG code in the GeoKey directory
    pub epsg: Option<u32>,
}

/// Read a GeoTIFF file into a Raster
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_geotiff(file)
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
///
/// Used for assets fetched over HTTP.
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

fn cast_all<S, T>(buf: Vec<S>, nodata: Option<f64>) -> Vec<T>
where
    S: num_traits::ToPrimitive + Copy,
    T: RasterElement,
{
    buf.iter()
        .map(|&v| match v.to_f64() {
            Some(x) if nodata.is_some_and(|nd| x == nd) => T::nodata(),
            Some(x) => T::from_f64(x),
            None => T::nodata(),
        })
        .collect()
}

/// Decode a GeoTIFF from any `Read + Seek` source
fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let mut decoder =
        Decoder::new(reader).map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;

    let rows = height as usize;
    let cols = width as usize;

    let nodata = read_nodata(&mut decoder);

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_all(buf, nodata),
        DecodingResult::F64(buf) => cast_all(buf, nodata),
        DecodingResult::U8(buf) => cast_all(buf, nodata),
        DecodingResult::U16(buf) => cast_all(buf, nodata),
        DecodingResult::U32(buf) => cast_all(buf, nodata),
        DecodingResult::I8(buf) => cast_all(buf, nodata),
        DecodingResult::I16(buf) => cast_all(buf, nodata),
        DecodingResult::I32(buf) => cast_all(buf, nodata),
        _ => {
            return Err(Error::UnsupportedDataType(
                "Unsupported TIFF pixel format".to_string(),
            ))
        }
    };

    // Multi-sample images are not analysis bands
    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Ok(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }
    raster.set_epsg(read_epsg(&mut decoder));

    Ok(raster)
}

fn read_nodata<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    parse_gdal_nodata(&decoder.get_tag_ascii_string(tag(GDAL_NODATA)).ok()?)
}

/// GDAL_NODATA is an ASCII number; `"nan"` means no sentinel beyond NaN itself
pub fn parse_gdal_nodata(text: &str) -> Option<f64> {
    let value: f64 = text.trim_matches(char::from(0)).trim().parse().ok()?;
    value.is_finite().then_some(value)
}

fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<GeoTransform> {
    let scale = decoder
        .get_tag_f64_vec(tag(MODEL_PIXEL_SCALE))
        .map_err(|_| Error::Other("No pixel scale tag".into()))?;

    let tiepoint = decoder
        .get_tag_f64_vec(tag(MODEL_TIEPOINT))
        .map_err(|_| Error::Other("No tiepoint tag".into()))?;

    transform_from_model_tags(&scale, &tiepoint)
        .ok_or_else(|| Error::Other("Cannot determine geotransform".into()))
}

/// North-up transform from ModelPixelScale + ModelTiepoint
pub fn transform_from_model_tags(scale: &[f64], tiepoint: &[f64]) -> Option<GeoTransform> {
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z]
    // scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

fn read_epsg<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<u32> {
    epsg_from_geokeys(&decoder.get_tag_u16_vec(tag(GEO_KEY_DIRECTORY)).ok()?)
}

/// EPSG from a GeoKey directory: projected CS first, then geographic
pub fn epsg_from_geokeys(keys: &[u16]) -> Option<u32> {
    if keys.len() < 4 {
        return None;
    }
    let count = keys[3] as usize;
    let mut geographic = None;
    for entry in keys[4..].chunks_exact(4).take(count) {
        // [key id, tiff tag location, count, value]; location 0 means inline
        if entry[1] != 0 {
            continue;
        }
        match entry[0] {
            PROJECTED_CS_TYPE if entry[3] != 0 && entry[3] != 32767 => {
                return Some(entry[3] as u32)
            }
            GEOGRAPHIC_TYPE if entry[3] != 0 && entry[3] != 32767 => {
                geographic = Some(entry[3] as u32)
            }
            _ => {}
        }
    }
    geographic
}

/// Write a Raster to a GeoTIFF file as 64-bit float
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P, options: Option<GeoTiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, file, options.unwrap_or_default())
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>, options: Option<GeoTiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf), options.unwrap_or_default())?;
    Ok(buf)
}

fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W, options: GeoTiffOptions) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder =
        TiffEncoder::new(writer).map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();
    let data: Vec<f64> = raster.data().iter().map(|&v| v.as_f64()).collect();

    let mut image = encoder
        .new_image::<Gray64Float>(cols as u32, rows as u32)
        .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;

    let gt = raster.transform();

    let scale = vec![gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image
        .encoder()
        .write_tag(tag(MODEL_PIXEL_SCALE), scale.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;

    let tiepoint = vec![0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(tag(MODEL_TIEPOINT), tiepoint.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;

    let geokeys = geokey_directory(options.epsg.or(raster.epsg()));
    image
        .encoder()
        .write_tag(tag(GEO_KEY_DIRECTORY), geokeys.as_slice())
        .map_err(|e| Error::Other(format!("Cannot write geokey tag: {}", e)))?;

    image
        .encoder()
        .write_tag(tag(GDAL_NODATA), "nan")
        .map_err(|e| Error::Other(format!("Cannot write nodata tag: {}", e)))?;

    image
        .write_data(&data)
        .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;

    Ok(())
}

/// Minimal GeoKey directory: model type, raster-is-area and the CRS code
fn geokey_directory(epsg: Option<u32>) -> Vec<u16> {
    let mut keys: Vec<[u16; 4]> = Vec::new();
    match epsg.and_then(|e| u16::try_from(e).ok()) {
        Some(4326) => {
            keys.push([GT_MODEL_TYPE, 0, 1, 2]);
            keys.push([GT_RASTER_TYPE, 0, 1, 1]);
            keys.push([GEOGRAPHIC_TYPE, 0, 1, 4326]);
        }
        Some(code) => {
            keys.push([GT_MODEL_TYPE, 0, 1, 1]);
            keys.push([GT_RASTER_TYPE, 0, 1, 1]);
            keys.push([PROJECTED_CS_TYPE, 0, 1, code]);
        }
        None => {
            keys.push([GT_MODEL_TYPE, 0, 1, 1]);
            keys.push([GT_RASTER_TYPE, 0, 1, 1]);
        }
    }
    let mut out = vec![1, 1, 0, keys.len() as u16];
    for key in keys {
        out.extend_from_slice(&key);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_roundtrip_keeps_georeferencing() {
        let mut raster: Raster<f64> =
            Raster::from_vec(vec![1.0, f64::NAN, 3.5, 4.0, 5.0, 6.0], 2, 3).unwrap();
        raster.set_transform(GeoTransform::new(560_000.0, 4_920_000.0, 30.0, -30.0));
        raster.set_epsg(Some(32610));

        let bytes = write_geotiff_to_buffer(&raster, None).unwrap();
        let back: Raster<f64> = read_geotiff_from_buffer(&bytes).unwrap();

        assert_eq!(back.shape(), (2, 3));
        assert_eq!(back.epsg(), Some(32610));
        assert_eq!(back.transform(), raster.transform());
        assert!(back.get(0, 1).unwrap().is_nan());
        assert_eq!(back.get(0, 2).unwrap(), 3.5);
    }

    #[test]
    fn test_geokeys_layout() {
        let keys = geokey_directory(Some(32721));
        assert_eq!(&keys[..4], &[1, 1, 0, 3]);
        assert_eq!(&keys[12..16], &[PROJECTED_CS_TYPE, 0, 1, 32721]);
        assert_eq!(geokey_directory(None)[3], 2);
    }

    #[test]
    fn test_geokey_epsg_prefers_projected() {
        let mut keys = geokey_directory(Some(4326));
        assert_eq!(epsg_from_geokeys(&keys), Some(4326));
        keys.extend_from_slice(&[PROJECTED_CS_TYPE, 0, 1, 32610]);
        keys[3] += 1;
        assert_eq!(epsg_from_geokeys(&keys), Some(32610));
        assert_eq!(epsg_from_geokeys(&[1, 1, 0]), None);
    }

    #[test]
    fn test_nodata_text() {
        assert_eq!(parse_gdal_nodata("0\0"), Some(0.0));
        assert_eq!(parse_gdal_nodata(" -9999 "), Some(-9999.0));
        assert_eq!(parse_gdal_nodata("nan"), None);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layer.tif");
        let raster: Raster<f64> = Raster::filled(3, 3, 300.0);
        write_geotiff(&raster, &path, Some(GeoTiffOptions { epsg: Some(32610) })).unwrap();
        let back: Raster<f64> = read_geotiff(&path).unwrap();
        assert_eq!(back.valid_count(), 9);
        assert_eq!(back.epsg(), Some(32610));
    }
}
