//! Region statistics
//!
//! - **region**: mean, histogram, threshold count and area share of a composite
//! - **timeseries**: region mean per scene

pub mod region;
pub mod timeseries;

pub use region::{
    histogram, percent_above_threshold, region_mean, region_values, summarize, threshold_count,
    threshold_mask, HistogramBucket, SummaryParams, SummaryStatistics,
};
pub use timeseries::{scene_time_series, TimeSeries, TimeSeriesPoint};
