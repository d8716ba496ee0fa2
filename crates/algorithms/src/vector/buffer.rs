//! Point buffers
//!
//! A buffered point is a regular polygon approximating the circle of the
//! given radius. Coordinates must be planar (meters) for the radius to mean
//! anything.

use geo::{LineString, Point, Polygon};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use basinscope_core::{Error, Result};

/// Parameters for buffer operations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferParams {
    /// Buffer radius in map units
    pub distance: f64,
    /// Number of segments approximating the circle (at least 4)
    pub segments: usize,
}

impl BufferParams {
    pub fn new(distance: f64) -> Self {
        Self {
            distance,
            ..Self::default()
        }
    }
}

impl Default for BufferParams {
    fn default() -> Self {
        Self {
            distance: 1.0,
            segments: 64,
        }
    }
}

/// Create a circular buffer around a point.
///
/// Fails on a negative or non-finite radius. A zero radius collapses to a
/// zero-area polygon at the point.
pub fn buffer_point(point: &Point<f64>, params: &BufferParams) -> Result<Polygon<f64>> {
    if !(params.distance.is_finite() && params.distance >= 0.0) {
        return Err(Error::InvalidParameter {
            name: "radius",
            value: params.distance.to_string(),
            reason: "buffer radius must be a non-negative distance".into(),
        });
    }

    let n = params.segments.max(4);
    let r = params.distance;
    let (cx, cy) = (point.x(), point.y());

    let mut coords = Vec::with_capacity(n + 1);
    for i in 0..n {
        let angle = 2.0 * PI * i as f64 / n as f64;
        coords.push((cx + r * angle.cos(), cy + r * angle.sin()));
    }
    // Close the ring
    coords.push(coords[0]);

    Ok(Polygon::new(LineString::from(coords), vec![]))
}
