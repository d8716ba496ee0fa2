//! Pixel-wise reduction of a scene sequence over time
//!
//! Every pixel aggregates the scenes holding a valid value there. Pixels no
//! scene observed stay no-data, and an empty sequence yields an all-no-data
//! composite on the requested grid. Valid values are sorted before they are
//! combined, so the result does not depend on scene order, not even in the
//! last bit of a floating-point mean.

use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::maybe_rayon::*;
use basinscope_core::raster::{GridSpec, Raster};
use basinscope_core::{DateRange, Error, Region, Result, SceneSequence};

/// Pixel-wise reducer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalOp {
    Max,
    Mean,
    Median,
    Min,
}

impl TemporalOp {
    /// Reduce sorted, non-empty valid values
    fn apply(self, sorted: &[f64]) -> f64 {
        let n = sorted.len();
        match self {
            TemporalOp::Max => sorted[n - 1],
            TemporalOp::Min => sorted[0],
            TemporalOp::Mean => sorted.iter().sum::<f64>() / n as f64,
            TemporalOp::Median => {
                if n % 2 == 0 {
                    (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
                } else {
                    sorted[n / 2]
                }
            }
        }
    }
}

impl fmt::Display for TemporalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TemporalOp::Max => "max",
            TemporalOp::Mean => "mean",
            TemporalOp::Median => "median",
            TemporalOp::Min => "min",
        };
        f.write_str(name)
    }
}

/// One band reduced over a date window
#[derive(Debug, Clone)]
pub struct Composite {
    pub band: String,
    pub raster: Raster<f64>,
    /// Scenes that went into the reduction
    pub scene_count: usize,
    /// Window the scenes were drawn from, when known
    pub dates: Option<DateRange>,
}

impl Composite {
    /// All-no-data composite on `grid`
    pub fn empty(band: impl Into<String>, grid: &GridSpec) -> Self {
        Self {
            band: band.into(),
            raster: Raster::on_grid(grid),
            scene_count: 0,
            dates: None,
        }
    }

    pub fn with_dates(mut self, dates: DateRange) -> Self {
        self.dates = Some(dates);
        self
    }

    pub fn grid(&self) -> GridSpec {
        self.raster.grid()
    }

    pub fn valid_count(&self) -> usize {
        self.raster.valid_count()
    }
}

/// Reduce `band` of every scene in `scenes` onto `grid`.
///
/// Bands not already on `grid` are resampled (nearest) first. A scene
/// without the band is an error.
pub fn reduce(scenes: &SceneSequence, band: &str, op: TemporalOp, grid: &GridSpec) -> Result<Composite> {
    if scenes.is_empty() {
        debug!(band, %op, "empty scene sequence, composite is all no-data");
        return Ok(Composite::empty(band, grid));
    }

    let aligned: Vec<Raster<f64>> = scenes
        .scenes()
        .par_iter()
        .map(|scene| {
            let raster = scene.band(band)?;
            if raster.grid() == *grid {
                Ok(raster.clone())
            } else {
                raster.warp_nearest(grid)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let (rows, cols) = grid.shape();
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut values = Vec::with_capacity(aligned.len());
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                values.clear();
                values.extend(
                    aligned
                        .iter()
                        .map(|r| unsafe { r.get_unchecked(row, col) })
                        .filter(|v| !v.is_nan()),
                );
                if values.is_empty() {
                    continue;
                }
                values.sort_by(f64::total_cmp);
                *out = op.apply(&values);
            }
            row_data
        })
        .collect();

    let array = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    let raster = Raster::on_grid(grid).with_data(array)?;

    debug!(band, %op, scenes = scenes.len(), valid = raster.valid_count(), "temporal composite");

    Ok(Composite {
        band: band.to_string(),
        raster,
        scene_count: scenes.len(),
        dates: None,
    })
}

/// Set every pixel whose center lies outside `region` to no-data
pub fn clip_to_region(composite: &mut Composite, region: &Region) -> Result<()> {
    let inside = region.cell_mask(&composite.grid())?;
    composite.raster.mask_with(&inside)
}

/// `a - b` per pixel under a new band name; no-data where either is
pub fn difference(a: &Composite, b: &Composite, name: impl Into<String>) -> Result<Composite> {
    a.raster.check_same_shape(&b.raster)?;
    let data = a.raster.data() - b.raster.data();
    let raster = a.raster.with_data(data)?;

    let dates = match (a.dates, b.dates) {
        (Some(x), Some(y)) => DateRange::new(x.start.min(y.start), x.end.max(y.end)).ok(),
        (x, y) => x.or(y),
    };

    Ok(Composite {
        band: name.into(),
        raster,
        scene_count: a.scene_count + b.scene_count,
        dates,
    })
}
