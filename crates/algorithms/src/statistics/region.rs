//! Reductions of a composite over the analysis region
//!
//! Every reduction looks only at valid pixels whose center lies inside the
//! region, sampled at `scale` meters per pixel. A `scale` finer than the
//! composite's own cells is rejected; a coarser one resamples the composite
//! (nearest) onto a `scale` grid before reducing.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::temporal::Composite;
use basinscope_core::raster::{GridSpec, Raster};
use basinscope_core::{Error, Region, Result};

/// Relative slack when comparing `scale` with the native cell size
const SCALE_TOLERANCE: f64 = 1e-9;

/// One equal-width histogram bucket `[lower, lower + width)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub lower: f64,
    pub width: f64,
    pub count: usize,
}

/// Parameters for [`summarize`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryParams {
    /// Sampling resolution in meters per pixel edge
    pub scale: f64,
    pub max_buckets: usize,
    pub threshold: Option<f64>,
}

/// Everything the report layer prints about one composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub band: String,
    pub scale: f64,
    pub valid_pixels: usize,
    pub region_area_km2: f64,
    pub mean: Option<f64>,
    pub histogram: Vec<HistogramBucket>,
    pub threshold: Option<f64>,
    pub threshold_count: Option<usize>,
    pub percent_above_threshold: Option<f64>,
}

fn check_scale(scale: f64, native: f64) -> Result<()> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(Error::InvalidParameter {
            name: "scale",
            value: scale.to_string(),
            reason: "must be a positive number of meters".into(),
        });
    }
    if scale < native * (1.0 - SCALE_TOLERANCE) {
        return Err(Error::InvalidParameter {
            name: "scale",
            value: scale.to_string(),
            reason: format!("finer than the {native} m source pixels"),
        });
    }
    Ok(())
}

/// Valid in-region values of `raster` at `scale`, row-major
pub fn region_values(raster: &Raster<f64>, region: &Region, scale: f64) -> Result<Vec<f64>> {
    let native = raster.cell_size();
    check_scale(scale, native)?;

    let sampled = if scale <= native * (1.0 + SCALE_TOLERANCE) {
        raster.clone()
    } else {
        let grid = GridSpec::covering(raster.bounds(), scale, raster.grid().epsg)?;
        raster.warp_nearest(&grid)?
    };

    let inside = region.cell_mask(&sampled.grid())?;
    Ok(sampled
        .data()
        .iter()
        .zip(inside.iter())
        .filter(|(v, keep)| **keep && !v.is_nan())
        .map(|(&v, _)| v)
        .collect())
}

fn mean_of(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn histogram_of(values: &[f64], max_buckets: usize) -> Result<Vec<HistogramBucket>> {
    if max_buckets == 0 {
        return Err(Error::InvalidParameter {
            name: "max_buckets",
            value: "0".into(),
            reason: "at least one bucket is required".into(),
        });
    }
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return Ok(vec![HistogramBucket {
            lower: min,
            width: 0.0,
            count: values.len(),
        }]);
    }

    let n = max_buckets;
    let width = (max - min) / n as f64;
    let mut counts = vec![0usize; n];
    for &v in values {
        // The maximum lands in the last bucket
        let idx = (((v - min) / width).floor() as usize).min(n - 1);
        counts[idx] += 1;
    }

    Ok(counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBucket {
            lower: min + i as f64 * width,
            width,
            count,
        })
        .collect())
}

fn percent_of(count: usize, scale: f64, area_km2: f64) -> Option<f64> {
    if !(area_km2 > 0.0) {
        return None;
    }
    let pixel_km2 = (scale / 1000.0).powi(2);
    Some(count as f64 * pixel_km2 / area_km2 * 100.0)
}

/// Mean of the valid in-region pixels; `None` when there are none
pub fn region_mean(composite: &Composite, region: &Region, scale: f64) -> Result<Option<f64>> {
    let values = region_values(&composite.raster, region, scale)?;
    Ok(mean_of(&values))
}

/// Equal-width histogram of the valid in-region pixels.
///
/// Spans `[min, max]` of the observed values with `max_buckets` buckets, or
/// a single zero-width bucket when every value is equal. No valid pixels
/// gives no buckets.
pub fn histogram(composite: &Composite, region: &Region, scale: f64, max_buckets: usize) -> Result<Vec<HistogramBucket>> {
    let values = region_values(&composite.raster, region, scale)?;
    histogram_of(&values, max_buckets)
}

/// Number of valid in-region pixels strictly above `threshold`
pub fn threshold_count(composite: &Composite, region: &Region, scale: f64, threshold: f64) -> Result<usize> {
    let values = region_values(&composite.raster, region, scale)?;
    Ok(values.iter().filter(|&&v| v > threshold).count())
}

/// Share of the region area covered by pixels above `threshold`, in percent.
///
/// `None` for a zero-area region.
pub fn percent_above_threshold(composite: &Composite, region: &Region, scale: f64, threshold: f64) -> Result<Option<f64>> {
    let count = threshold_count(composite, region, scale, threshold)?;
    Ok(percent_of(count, scale, region.area_km2()))
}

/// 1.0 where the composite exceeds `threshold`, 0.0 at other valid pixels
pub fn threshold_mask(composite: &Composite, threshold: f64) -> Result<Composite> {
    let data = composite.raster.data().mapv(|v| {
        if v.is_nan() {
            f64::NAN
        } else if v > threshold {
            1.0
        } else {
            0.0
        }
    });
    Ok(Composite {
        band: format!("{}_above_{}", composite.band, threshold),
        raster: composite.raster.with_data(data)?,
        scene_count: composite.scene_count,
        dates: composite.dates,
    })
}

/// All region reductions of one composite in a single pass over its pixels
pub fn summarize(composite: &Composite, region: &Region, params: &SummaryParams) -> Result<SummaryStatistics> {
    let values = region_values(&composite.raster, region, params.scale)?;
    let region_area_km2 = region.area_km2();

    let threshold_count = params
        .threshold
        .map(|t| values.iter().filter(|&&v| v > t).count());
    let percent_above_threshold =
        threshold_count.and_then(|count| percent_of(count, params.scale, region_area_km2));

    let summary = SummaryStatistics {
        band: composite.band.clone(),
        scale: params.scale,
        valid_pixels: values.len(),
        region_area_km2,
        mean: mean_of(&values),
        histogram: histogram_of(&values, params.max_buckets)?,
        threshold: params.threshold,
        threshold_count,
        percent_above_threshold,
    };

    debug!(
        band = %summary.band,
        valid = summary.valid_pixels,
        mean = ?summary.mean,
        "region summary"
    );
    Ok(summary)
}
