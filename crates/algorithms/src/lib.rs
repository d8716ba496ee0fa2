//! # basinscope algorithms
//!
//! Pure raster and geometry stages of the region index pipeline.
//!
//! ## Categories
//!
//! - **imagery**: QA bit masking, normalized-difference indices, band pass-through
//! - **temporal**: max / mean / median / min composites, clip to region, composite difference
//! - **statistics**: region mean, histogram, threshold count, area share, per-scene time series
//! - **vector**: point buffers, polygon union/intersection, WGS84 → UTM projection

pub mod imagery;
pub(crate) mod maybe_rayon;
pub mod statistics;
pub mod temporal;
pub mod vector;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::imagery::{compute_index, mask_scene, ndsi, ndvi, normalized_difference, BitTest, IndexSpec, QaMask};
    pub use crate::statistics::{
        histogram, percent_above_threshold, region_mean, scene_time_series, summarize, threshold_count,
        threshold_mask, HistogramBucket, SummaryParams, SummaryStatistics, TimeSeries,
    };
    pub use crate::temporal::{clip_to_region, difference, map_scenes, reduce, Composite, TemporalOp};
    pub use crate::vector::{buffer_point, intersect, project_polygons, union_all, BufferParams};
    pub use basinscope_core::prelude::*;
}
