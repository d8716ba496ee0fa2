//! TIFF header and image file directory parsing over raw byte ranges
//!
//! Works on slices fetched with HTTP Range requests, so nothing here needs
//! `Read + Seek`. Only classic (32-bit offset) TIFF is handled; BigTIFF is
//! rejected up front.

use std::collections::HashMap;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{CloudError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffByteOrder {
    LittleEndian,
    BigEndian,
}

/// Tag ids the reader resolves
pub mod tags {
    pub const IMAGE_WIDTH: u16 = 256;
    pub const IMAGE_LENGTH: u16 = 257;
    pub const BITS_PER_SAMPLE: u16 = 258;
    pub const COMPRESSION: u16 = 259;
    pub const STRIP_OFFSETS: u16 = 273;
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    pub const ROWS_PER_STRIP: u16 = 278;
    pub const STRIP_BYTE_COUNTS: u16 = 279;
    pub const PLANAR_CONFIG: u16 = 284;
    pub const PREDICTOR: u16 = 317;
    pub const TILE_WIDTH: u16 = 322;
    pub const TILE_LENGTH: u16 = 323;
    pub const TILE_OFFSETS: u16 = 324;
    pub const TILE_BYTE_COUNTS: u16 = 325;
    pub const SAMPLE_FORMAT: u16 = 339;
    pub const MODEL_PIXEL_SCALE: u16 = 33550;
    pub const MODEL_TIEPOINT: u16 = 33922;
    pub const MODEL_TRANSFORMATION: u16 = 34264;
    pub const GEO_KEY_DIRECTORY: u16 = 34735;
    pub const GDAL_NODATA: u16 = 42113;

    /// Everything whose value is read when a COG is opened
    pub const RESOLVED: [u16; 20] = [
        IMAGE_WIDTH,
        IMAGE_LENGTH,
        BITS_PER_SAMPLE,
        COMPRESSION,
        STRIP_OFFSETS,
        SAMPLES_PER_PIXEL,
        ROWS_PER_STRIP,
        STRIP_BYTE_COUNTS,
        PLANAR_CONFIG,
        PREDICTOR,
        TILE_WIDTH,
        TILE_LENGTH,
        TILE_OFFSETS,
        TILE_BYTE_COUNTS,
        SAMPLE_FORMAT,
        MODEL_PIXEL_SCALE,
        MODEL_TIEPOINT,
        MODEL_TRANSFORMATION,
        GEO_KEY_DIRECTORY,
        GDAL_NODATA,
    ];
}

/// Size in bytes of one value of a TIFF field type
fn type_byte_size(type_id: u16) -> Option<usize> {
    match type_id {
        1 | 2 | 6 | 7 => Some(1), // BYTE, ASCII, SBYTE, UNDEFINED
        3 | 8 => Some(2),         // SHORT, SSHORT
        4 | 9 | 11 => Some(4),    // LONG, SLONG, FLOAT
        5 | 10 | 12 | 16 => Some(8), // RATIONAL, SRATIONAL, DOUBLE, LONG8
        _ => None,
    }
}

/// One 12-byte directory entry, value not yet resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTagEntry {
    pub tag: u16,
    pub type_id: u16,
    pub count: u32,
    /// The 4-byte value field as stored: the value itself when it fits,
    /// otherwise the file offset of the value
    pub value: [u8; 4],
}

impl RawTagEntry {
    /// Bytes occupied by the whole value
    pub fn value_size(&self) -> u64 {
        type_byte_size(self.type_id).unwrap_or(1) as u64 * self.count as u64
    }

    pub fn is_inline(&self) -> bool {
        self.value_size() <= 4
    }

    /// File offset of an out-of-line value
    pub fn offset(&self, order: TiffByteOrder) -> u64 {
        read_u32(order, &self.value) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: TiffByteOrder,
    pub first_ifd_offset: u32,
}

#[derive(Debug, Clone)]
pub struct RawIfd {
    pub entries: Vec<RawTagEntry>,
    pub next_ifd_offset: u32,
}

/// Bytes a directory of `entry_count` entries occupies
pub fn ifd_size(entry_count: u16) -> u64 {
    2 + 12 * entry_count as u64 + 4
}

pub fn parse_header(data: &[u8]) -> Result<TiffHeader> {
    if data.len() < 8 {
        return Err(CloudError::InvalidTiff("header too short".into()));
    }

    let byte_order = match (data[0], data[1]) {
        (b'I', b'I') => TiffByteOrder::LittleEndian,
        (b'M', b'M') => TiffByteOrder::BigEndian,
        _ => return Err(CloudError::InvalidTiff("invalid byte order marker".into())),
    };

    match read_u16(byte_order, &data[2..4]) {
        42 => {}
        43 => return Err(CloudError::InvalidTiff("BigTIFF is not supported".into())),
        magic => return Err(CloudError::InvalidTiff(format!("expected magic 42, got {magic}"))),
    }

    Ok(TiffHeader {
        byte_order,
        first_ifd_offset: read_u32(byte_order, &data[4..8]),
    })
}

/// Entry count at the start of a directory
pub fn ifd_entry_count(order: TiffByteOrder, data: &[u8]) -> Result<u16> {
    if data.len() < 2 {
        return Err(CloudError::InvalidTiff("IFD too short".into()));
    }
    Ok(read_u16(order, &data[0..2]))
}

/// Parse one directory; `data` starts at the directory offset
pub fn parse_ifd(order: TiffByteOrder, data: &[u8]) -> Result<RawIfd> {
    let entry_count = ifd_entry_count(order, data)?;
    let needed = ifd_size(entry_count) as usize;
    if data.len() < needed {
        return Err(CloudError::InvalidTiff(format!(
            "IFD needs {needed} bytes but only {} available",
            data.len()
        )));
    }

    let entries = data[2..2 + 12 * entry_count as usize]
        .chunks_exact(12)
        .map(|e| RawTagEntry {
            tag: read_u16(order, &e[0..2]),
            type_id: read_u16(order, &e[2..4]),
            count: read_u32(order, &e[4..8]),
            value: [e[8], e[9], e[10], e[11]],
        })
        .collect();

    Ok(RawIfd {
        entries,
        next_ifd_offset: read_u32(order, &data[needed - 4..needed]),
    })
}

/// Tag values of one directory, inline and fetched alike
pub struct TagValues<'a> {
    order: TiffByteOrder,
    entries: &'a [RawTagEntry],
    external: &'a HashMap<u16, Vec<u8>>,
}

impl<'a> TagValues<'a> {
    pub fn new(order: TiffByteOrder, entries: &'a [RawTagEntry], external: &'a HashMap<u16, Vec<u8>>) -> Self {
        Self {
            order,
            entries,
            external,
        }
    }

    fn raw(&self, tag: u16) -> Option<(&RawTagEntry, &[u8])> {
        let entry = self.entries.iter().find(|e| e.tag == tag)?;
        let data = if entry.is_inline() {
            &entry.value[..]
        } else {
            self.external.get(&tag)?.as_slice()
        };
        Some((entry, data))
    }

    /// Integer values (BYTE, SHORT, LONG, LONG8)
    pub fn u64s(&self, tag: u16) -> Option<Vec<u64>> {
        let (entry, data) = self.raw(tag)?;
        let count = entry.count as usize;
        let values: Vec<u64> = match entry.type_id {
            1 => data.iter().take(count).map(|&b| b as u64).collect(),
            3 => data.chunks_exact(2).take(count).map(|c| read_u16(self.order, c) as u64).collect(),
            4 => data.chunks_exact(4).take(count).map(|c| read_u32(self.order, c) as u64).collect(),
            16 => data.chunks_exact(8).take(count).map(|c| read_u64(self.order, c)).collect(),
            _ => return None,
        };
        (values.len() == count).then_some(values)
    }

    pub fn u64(&self, tag: u16) -> Option<u64> {
        self.u64s(tag)?.first().copied()
    }

    pub fn u16s(&self, tag: u16) -> Option<Vec<u16>> {
        self.u64s(tag)?.into_iter().map(|v| u16::try_from(v).ok()).collect()
    }

    /// Floating point values (FLOAT, DOUBLE)
    pub fn f64s(&self, tag: u16) -> Option<Vec<f64>> {
        let (entry, data) = self.raw(tag)?;
        let count = entry.count as usize;
        let values: Vec<f64> = match entry.type_id {
            11 => data.chunks_exact(4).take(count).map(|c| read_f32(self.order, c) as f64).collect(),
            12 => data.chunks_exact(8).take(count).map(|c| read_f64(self.order, c)).collect(),
            _ => return None,
        };
        (values.len() == count).then_some(values)
    }

    pub fn ascii(&self, tag: u16) -> Option<String> {
        let (entry, data) = self.raw(tag)?;
        let bytes = &data[..(entry.count as usize).min(data.len())];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

pub(crate) fn read_u16(order: TiffByteOrder, data: &[u8]) -> u16 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u16(data),
        TiffByteOrder::BigEndian => BigEndian::read_u16(data),
    }
}

pub(crate) fn read_u32(order: TiffByteOrder, data: &[u8]) -> u32 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u32(data),
        TiffByteOrder::BigEndian => BigEndian::read_u32(data),
    }
}

pub(crate) fn read_u64(order: TiffByteOrder, data: &[u8]) -> u64 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_u64(data),
        TiffByteOrder::BigEndian => BigEndian::read_u64(data),
    }
}

pub(crate) fn read_f32(order: TiffByteOrder, data: &[u8]) -> f32 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_f32(data),
        TiffByteOrder::BigEndian => BigEndian::read_f32(data),
    }
}

pub(crate) fn read_f64(order: TiffByteOrder, data: &[u8]) -> f64 {
    match order {
        TiffByteOrder::LittleEndian => LittleEndian::read_f64(data),
        TiffByteOrder::BigEndian => BigEndian::read_f64(data),
    }
}
