//! Windowed reads from remote (Cloud Optimized) GeoTIFFs
//!
//! Opening a reader fetches the header, the first image directory and the
//! out-of-line tag values it needs. A bbox read then fetches only the tiles
//! or strips under the bbox, in concurrent batches, and keeps decoded blocks
//! in a [`TileCache`] shared by the caller.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::try_join_all;
use tracing::debug;

use basinscope_core::{GeoTransform, Raster};

use crate::cache::{TileCache, TileKey};
use crate::decompress::{self, compression, predictor, sample_format};
use crate::error::{CloudError, Result};
use crate::geotiff_keys::{extract_geotiff_meta, GeoTiffMeta};
use crate::ifd::{self, tags, TagValues, TiffByteOrder};
use crate::tile_index::{blocks_for_bbox, BBox, BlockGrid};

/// Random-access byte source behind a reader.
pub trait RangeSource {
    /// Stable name of the underlying file, used as the cache key
    fn id(&self) -> &str;

    /// Up to `length` bytes starting at `offset`; shorter only at end of file
    fn read_range(&self, offset: u64, length: u64) -> impl Future<Output = Result<Vec<u8>>>;
}

#[derive(Debug, Clone, Copy)]
pub struct CogReaderOptions {
    /// Block requests in flight at once
    pub max_concurrent_fetches: usize,
    /// Size of the first read; usually covers the header and first directory
    pub header_bytes: u64,
}

impl Default for CogReaderOptions {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 8,
            header_bytes: 64 * 1024,
        }
    }
}

/// Pixel layout of the full-resolution image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageLayout {
    pub width: usize,
    pub height: usize,
    pub block_width: usize,
    pub block_height: usize,
    pub tiled: bool,
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
    pub bits_per_sample: u16,
    pub sample_format: u16,
    pub compression: u16,
    pub predictor: u16,
}

impl ImageLayout {
    fn from_tags(values: &TagValues<'_>) -> Result<Self> {
        let width = required(values, tags::IMAGE_WIDTH, "ImageWidth")? as usize;
        let height = required(values, tags::IMAGE_LENGTH, "ImageLength")? as usize;

        let samples = values.u64(tags::SAMPLES_PER_PIXEL).unwrap_or(1);
        if samples != 1 {
            return Err(CloudError::UnsupportedLayout(format!("{samples} samples per pixel")));
        }
        let first_u16 = |tag| values.u16s(tag).and_then(|v| v.first().copied());

        let (block_width, block_height, offsets, byte_counts, tiled) =
            match (values.u64(tags::TILE_WIDTH), values.u64(tags::TILE_LENGTH)) {
                (Some(tw), Some(th)) => (
                    tw as usize,
                    th as usize,
                    values.u64s(tags::TILE_OFFSETS),
                    values.u64s(tags::TILE_BYTE_COUNTS),
                    true,
                ),
                _ => {
                    let rows_per_strip = values
                        .u64(tags::ROWS_PER_STRIP)
                        .map_or(height, |r| (r as usize).min(height))
                        .max(1);
                    (
                        width,
                        rows_per_strip,
                        values.u64s(tags::STRIP_OFFSETS),
                        values.u64s(tags::STRIP_BYTE_COUNTS),
                        false,
                    )
                }
            };
        let (Some(offsets), Some(byte_counts)) = (offsets, byte_counts) else {
            return Err(CloudError::InvalidTiff("missing block offsets or byte counts".into()));
        };

        let layout = Self {
            width,
            height,
            block_width,
            block_height,
            tiled,
            offsets,
            byte_counts,
            bits_per_sample: first_u16(tags::BITS_PER_SAMPLE).unwrap_or(1),
            sample_format: first_u16(tags::SAMPLE_FORMAT).unwrap_or(sample_format::UNSIGNED_INT),
            compression: first_u16(tags::COMPRESSION).unwrap_or(compression::NONE),
            predictor: first_u16(tags::PREDICTOR).unwrap_or(predictor::NONE),
        };

        let grid = layout.block_grid();
        let expected = if block_width == 0 || block_height == 0 {
            0
        } else {
            grid.blocks_across() * grid.blocks_down()
        };
        if expected == 0 || layout.offsets.len() < expected || layout.byte_counts.len() < expected {
            return Err(CloudError::InvalidTiff(format!(
                "{} block offsets for {expected} blocks",
                layout.offsets.len()
            )));
        }
        if !matches!(layout.predictor, predictor::NONE | predictor::HORIZONTAL) {
            return Err(CloudError::UnsupportedLayout(format!("predictor {}", layout.predictor)));
        }
        Ok(layout)
    }

    pub fn block_grid(&self) -> BlockGrid {
        BlockGrid {
            width: self.width,
            height: self.height,
            block_width: self.block_width,
            block_height: self.block_height,
        }
    }

    fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }
}

fn required(values: &TagValues<'_>, tag: u16, name: &str) -> Result<u64> {
    values
        .u64(tag)
        .ok_or_else(|| CloudError::InvalidTiff(format!("missing {name}")))
}

/// Reader over one remote GeoTIFF.
pub struct CogReader<S> {
    source: S,
    byte_order: TiffByteOrder,
    layout: ImageLayout,
    meta: GeoTiffMeta,
    options: CogReaderOptions,
}

impl<S: RangeSource> CogReader<S> {
    pub async fn open(source: S, options: CogReaderOptions) -> Result<Self> {
        let head = source.read_range(0, options.header_bytes).await?;
        let header = ifd::parse_header(&head)?;
        let order = header.byte_order;
        let ifd_offset = header.first_ifd_offset as u64;

        let count = slice_or_fetch(&source, &head, ifd_offset, 2).await?;
        let entry_count = ifd::ifd_entry_count(order, &count)?;
        let directory = slice_or_fetch(&source, &head, ifd_offset, ifd::ifd_size(entry_count)).await?;
        let raw = ifd::parse_ifd(order, &directory)?;

        let mut external = HashMap::new();
        for entry in raw
            .entries
            .iter()
            .filter(|e| tags::RESOLVED.contains(&e.tag) && !e.is_inline())
        {
            let bytes = slice_or_fetch(&source, &head, entry.offset(order), entry.value_size()).await?;
            external.insert(entry.tag, bytes);
        }

        let values = TagValues::new(order, &raw.entries, &external);
        let layout = ImageLayout::from_tags(&values)?;
        let meta = extract_geotiff_meta(&values)?;
        debug!(
            source = source.id(),
            width = layout.width,
            height = layout.height,
            block_width = layout.block_width,
            block_height = layout.block_height,
            compression = layout.compression,
            epsg = ?meta.epsg,
            "GeoTIFF opened"
        );

        Ok(Self {
            source,
            byte_order: order,
            layout,
            meta,
            options,
        })
    }

    pub fn metadata(&self) -> &GeoTiffMeta {
        &self.meta
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    /// Pixels under `bbox` (image CRS), cut to the covering pixel window.
    ///
    /// Blocks missing from the file and the declared no-data value read as NaN.
    pub async fn read_bbox(&self, bbox: &BBox, cache: &mut TileCache) -> Result<Raster<f64>> {
        let grid = self.layout.block_grid();
        let window = blocks_for_bbox(bbox, &self.meta.transform, &grid).ok_or(CloudError::BBoxOutside)?;

        let mut blocks: HashMap<usize, Arc<Vec<f64>>> = HashMap::new();
        let mut missing = Vec::new();
        for block in &window.blocks {
            match cache.get(&TileKey::new(self.source.id(), block.index)) {
                Some(data) => {
                    blocks.insert(block.index, data);
                }
                None => missing.push(block.index),
            }
        }

        for chunk in missing.chunks(self.options.max_concurrent_fetches.max(1)) {
            let fetched = try_join_all(chunk.iter().map(|&index| self.fetch_block(index))).await?;
            for (&index, data) in chunk.iter().zip(fetched) {
                if let Some(data) = data {
                    let data = Arc::new(data);
                    cache.insert(TileKey::new(self.source.id(), index), Arc::clone(&data));
                    blocks.insert(index, data);
                }
            }
        }
        debug!(
            source = self.source.id(),
            blocks = window.blocks.len(),
            fetched = missing.len(),
            "window read"
        );

        let (min_col, min_row, max_col, max_row) = window.pixel_window;
        let (rows, cols) = window.shape;
        let (bw, bh) = (grid.block_width, grid.block_height);
        let mut data = vec![f64::NAN; rows * cols];
        for block in &window.blocks {
            let Some(samples) = blocks.get(&block.index) else {
                continue;
            };
            let (row0, col0) = (block.row * bh, block.col * bw);
            for r in row0.max(min_row)..(row0 + bh).min(max_row) {
                for c in col0.max(min_col)..(col0 + bw).min(max_col) {
                    if let Some(&v) = samples.get((r - row0) * bw + (c - col0)) {
                        data[(r - min_row) * cols + (c - min_col)] = v;
                    }
                }
            }
        }

        let gt = &self.meta.transform;
        let mut raster = Raster::from_vec(data, rows, cols)?;
        raster.set_transform(GeoTransform::new(
            gt.origin_x + min_col as f64 * gt.pixel_width,
            gt.origin_y + min_row as f64 * gt.pixel_height,
            gt.pixel_width,
            gt.pixel_height,
        ));
        raster.set_epsg(self.meta.epsg);
        Ok(raster)
    }

    /// Decoded samples of one block; `None` for a sparse block
    async fn fetch_block(&self, index: usize) -> Result<Option<Vec<f64>>> {
        let (Some(&offset), Some(&length)) = (self.layout.offsets.get(index), self.layout.byte_counts.get(index))
        else {
            return Err(CloudError::InvalidTiff(format!("block {index} out of range")));
        };
        if length == 0 {
            return Ok(None);
        }

        let bytes = self.source.read_range(offset, length).await?;
        let layout = &self.layout;
        let bytes_per_sample = layout.bytes_per_sample();
        let expected = layout.block_width * layout.block_height * bytes_per_sample;
        let mut raw = decompress::decompress_block(&bytes, layout.compression, expected)?;
        if layout.predictor == predictor::HORIZONTAL {
            decompress::undo_horizontal_predictor(&mut raw, self.byte_order, bytes_per_sample, layout.block_width)?;
        }

        let mut samples = decompress::decode_samples(&raw, self.byte_order, layout.bits_per_sample, layout.sample_format)?;
        if let Some(nodata) = self.meta.nodata {
            for v in samples.iter_mut().filter(|v| **v == nodata) {
                *v = f64::NAN;
            }
        }
        Ok(Some(samples))
    }
}

/// `length` bytes at `offset`, sliced from the header read when it covers them
async fn slice_or_fetch<S: RangeSource>(source: &S, head: &[u8], offset: u64, length: u64) -> Result<Vec<u8>> {
    let end = offset.saturating_add(length);
    if end <= head.len() as u64 {
        return Ok(head[offset as usize..end as usize].to_vec());
    }
    let bytes = source.read_range(offset, length).await?;
    if (bytes.len() as u64) < length {
        return Err(CloudError::InvalidTiff(format!(
            "needed {length} bytes at offset {offset}, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}
