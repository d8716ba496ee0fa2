//! Block grid math for tiled and stripped TIFFs
//!
//! A strip is a block as wide as the image, so both layouts go through the
//! same mapping from a map-space bounding box to the blocks that cover it.

use basinscope_core::GeoTransform;

/// Map-space bounding box in the image CRS
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }
}

impl From<(f64, f64, f64, f64)> for BBox {
    fn from((min_x, min_y, max_x, max_y): (f64, f64, f64, f64)) -> Self {
        Self::new(min_x, min_y, max_x, max_y)
    }
}

/// Image size and block size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGrid {
    pub width: usize,
    pub height: usize,
    pub block_width: usize,
    pub block_height: usize,
}

impl BlockGrid {
    pub fn blocks_across(&self) -> usize {
        self.width.div_ceil(self.block_width)
    }

    pub fn blocks_down(&self) -> usize {
        self.height.div_ceil(self.block_height)
    }
}

/// One block to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    /// Linear index into the offset/byte-count arrays
    pub index: usize,
    pub col: usize,
    pub row: usize,
}

/// Blocks covering a bbox and the pixel window they are cut to
#[derive(Debug, Clone, PartialEq)]
pub struct BlockWindow {
    pub blocks: Vec<BlockRef>,
    /// `(min_col, min_row, max_col, max_row)`, max exclusive
    pub pixel_window: (usize, usize, usize, usize),
    /// `(rows, cols)` of the window
    pub shape: (usize, usize),
}

/// Blocks needed for `bbox`; `None` when the bbox misses the image
pub fn blocks_for_bbox(bbox: &BBox, transform: &GeoTransform, grid: &BlockGrid) -> Option<BlockWindow> {
    if grid.block_width == 0 || grid.block_height == 0 {
        return None;
    }

    // North-up: the top-left corner of the bbox is (min_x, max_y)
    let (col_a, row_a) = transform.geo_to_pixel(bbox.min_x, bbox.max_y);
    let (col_b, row_b) = transform.geo_to_pixel(bbox.max_x, bbox.min_y);
    if [col_a, row_a, col_b, row_b].iter().any(|v| !v.is_finite()) {
        return None;
    }

    let clamp = |v: f64, max: usize| (v.max(0.0) as usize).min(max);
    let min_col = clamp(col_a.min(col_b).floor(), grid.width);
    let max_col = clamp(col_a.max(col_b).ceil(), grid.width);
    let min_row = clamp(row_a.min(row_b).floor(), grid.height);
    let max_row = clamp(row_a.max(row_b).ceil(), grid.height);
    if min_col >= max_col || min_row >= max_row {
        return None;
    }

    let across = grid.blocks_across();
    let col_range = min_col / grid.block_width..max_col.div_ceil(grid.block_width).min(across);
    let row_range = min_row / grid.block_height..max_row.div_ceil(grid.block_height).min(grid.blocks_down());

    let blocks = row_range
        .flat_map(|row| {
            col_range.clone().map(move |col| BlockRef {
                index: row * across + col,
                col,
                row,
            })
        })
        .collect();

    Some(BlockWindow {
        blocks,
        pixel_window: (min_col, min_row, max_col, max_row),
        shape: (max_row - min_row, max_col - min_col),
    })
}
