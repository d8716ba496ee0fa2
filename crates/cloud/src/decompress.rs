//! Block decompression and sample decoding for remote GeoTIFFs
//!
//! DEFLATE goes through `flate2`, LZW through `weezl`. Samples come out as
//! `f64` whatever their stored type.

use std::io::Read;

use crate::error::{CloudError, Result};
use crate::ifd::{read_f32, read_f64, read_u16, read_u32, read_u64, TiffByteOrder};

/// TIFF compression codes
pub mod compression {
    pub const NONE: u16 = 1;
    pub const LZW: u16 = 5;
    pub const DEFLATE: u16 = 8;
    pub const ADOBE_DEFLATE: u16 = 32946;
}

/// TIFF sample format codes
pub mod sample_format {
    pub const UNSIGNED_INT: u16 = 1;
    pub const SIGNED_INT: u16 = 2;
    pub const FLOAT: u16 = 3;
}

/// TIFF predictor codes
pub mod predictor {
    pub const NONE: u16 = 1;
    pub const HORIZONTAL: u16 = 2;
}

pub fn decompress_block(data: &[u8], compression_code: u16, expected_size: usize) -> Result<Vec<u8>> {
    match compression_code {
        compression::NONE => Ok(data.to_vec()),
        compression::DEFLATE | compression::ADOBE_DEFLATE => {
            // zlib framing is the norm; some writers emit raw deflate
            let mut out = Vec::with_capacity(expected_size);
            if flate2::read::ZlibDecoder::new(data).read_to_end(&mut out).is_ok() {
                return Ok(out);
            }
            out.clear();
            flate2::read::DeflateDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| CloudError::Decompress(format!("DEFLATE: {e}")))?;
            Ok(out)
        }
        compression::LZW => weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
            .decode(data)
            .map_err(|e| CloudError::Decompress(format!("LZW: {e}"))),
        other => Err(CloudError::UnsupportedCompression(other)),
    }
}

/// Reverse horizontal differencing in place, one row of `row_width` samples at a time
pub fn undo_horizontal_predictor(
    raw: &mut [u8],
    order: TiffByteOrder,
    bytes_per_sample: usize,
    row_width: usize,
) -> Result<()> {
    let row_bytes = bytes_per_sample * row_width;
    if row_bytes == 0 {
        return Ok(());
    }
    for row in raw.chunks_mut(row_bytes) {
        match bytes_per_sample {
            1 => {
                for i in 1..row.len() {
                    row[i] = row[i].wrapping_add(row[i - 1]);
                }
            }
            2 => accumulate(row, 2, |b| read_u16(order, b) as u64, |v, b| write_u16(order, v as u16, b)),
            4 => accumulate(row, 4, |b| read_u32(order, b) as u64, |v, b| write_u32(order, v as u32, b)),
            8 => accumulate(row, 8, |b| read_u64(order, b), |v, b| write_u64(order, v, b)),
            n => {
                return Err(CloudError::UnsupportedLayout(format!(
                    "horizontal predictor on {n}-byte samples"
                )))
            }
        }
    }
    Ok(())
}

fn accumulate(row: &mut [u8], size: usize, read: impl Fn(&[u8]) -> u64, write: impl Fn(u64, &mut [u8])) {
    let samples = row.len() / size;
    for i in 1..samples {
        let prev = read(&row[(i - 1) * size..i * size]);
        let cur = read(&row[i * size..(i + 1) * size]);
        // Truncation in `write` gives the wrap-around at the sample width
        write(cur.wrapping_add(prev), &mut row[i * size..(i + 1) * size]);
    }
}

fn write_u16(order: TiffByteOrder, v: u16, out: &mut [u8]) {
    out.copy_from_slice(&match order {
        TiffByteOrder::LittleEndian => v.to_le_bytes(),
        TiffByteOrder::BigEndian => v.to_be_bytes(),
    });
}

fn write_u32(order: TiffByteOrder, v: u32, out: &mut [u8]) {
    out.copy_from_slice(&match order {
        TiffByteOrder::LittleEndian => v.to_le_bytes(),
        TiffByteOrder::BigEndian => v.to_be_bytes(),
    });
}

fn write_u64(order: TiffByteOrder, v: u64, out: &mut [u8]) {
    out.copy_from_slice(&match order {
        TiffByteOrder::LittleEndian => v.to_le_bytes(),
        TiffByteOrder::BigEndian => v.to_be_bytes(),
    });
}

/// Decode raw sample bytes into `f64`
pub fn decode_samples(raw: &[u8], order: TiffByteOrder, bits_per_sample: u16, format: u16) -> Result<Vec<f64>> {
    let values = match (bits_per_sample, format) {
        (8, sample_format::UNSIGNED_INT) => raw.iter().map(|&b| b as f64).collect(),
        (8, sample_format::SIGNED_INT) => raw.iter().map(|&b| b as i8 as f64).collect(),
        (16, sample_format::UNSIGNED_INT) => raw.chunks_exact(2).map(|c| read_u16(order, c) as f64).collect(),
        (16, sample_format::SIGNED_INT) => raw.chunks_exact(2).map(|c| read_u16(order, c) as i16 as f64).collect(),
        (32, sample_format::UNSIGNED_INT) => raw.chunks_exact(4).map(|c| read_u32(order, c) as f64).collect(),
        (32, sample_format::SIGNED_INT) => raw.chunks_exact(4).map(|c| read_u32(order, c) as i32 as f64).collect(),
        (32, sample_format::FLOAT) => raw.chunks_exact(4).map(|c| read_f32(order, c) as f64).collect(),
        (64, sample_format::FLOAT) => raw.chunks_exact(8).map(|c| read_f64(order, c)).collect(),
        _ => {
            return Err(CloudError::UnsupportedDataType {
                bits_per_sample,
                sample_format: format,
            })
        }
    };
    Ok(values)
}
