//! Per-scene region means over time

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::region::region_values;
use crate::maybe_rayon::*;
use basinscope_core::{Region, Result, SceneSequence};

/// Region mean of one scene; `None` when the region saw no valid pixel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub scene_id: String,
    pub acquired: DateTime<Utc>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub band: String,
    pub points: Vec<TimeSeriesPoint>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points that carry a value
    pub fn observed(&self) -> impl Iterator<Item = &TimeSeriesPoint> {
        self.points.iter().filter(|p| p.value.is_some())
    }
}

/// Region mean of `band` for every scene, ordered by acquisition time then id
pub fn scene_time_series(scenes: &SceneSequence, band: &str, region: &Region, scale: f64) -> Result<TimeSeries> {
    let ordered = scenes.sorted();
    let points = ordered
        .par_iter()
        .map(|scene| {
            let values = region_values(scene.band(band)?, region, scale)?;
            let value = (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64);
            Ok(TimeSeriesPoint {
                scene_id: scene.id.clone(),
                acquired: scene.acquired,
                value,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TimeSeries {
        band: band.to_string(),
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use basinscope_core::{GeoTransform, Raster, Scene, CRS};
    use chrono::TimeZone;

    fn scene(id: &str, month: u32, value: f64) -> Scene {
        let mut band = Raster::filled(4, 4, value);
        band.set_transform(GeoTransform::new(0.0, 120.0, 30.0, -30.0));
        band.set_epsg(Some(32610));
        Scene::new(id, "LT05", Utc.with_ymd_and_hms(1995, month, 1, 0, 0, 0).unwrap())
            .with_band("NDSI", band)
            .unwrap()
    }

    #[test]
    fn test_series_sorted_by_time() {
        let region = Region::rectangle(0.0, 0.0, 120.0, 120.0, CRS::from_epsg(32610)).unwrap();
        let seq = SceneSequence::new(vec![
            scene("c", 3, 0.3),
            scene("a", 1, 0.1),
            scene("b", 2, f64::NAN),
        ]);
        let series = scene_time_series(&seq, "NDSI", &region, 30.0).unwrap();
        let ids: Vec<&str> = series.points.iter().map(|p| p.scene_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_relative_eq!(series.points[0].value.unwrap(), 0.1);
        assert_eq!(series.points[1].value, None);
        assert_eq!(series.observed().count(), 2);
    }

    #[test]
    fn test_empty_sequence() {
        let region = Region::rectangle(0.0, 0.0, 120.0, 120.0, CRS::from_epsg(32610)).unwrap();
        let series = scene_time_series(&SceneSequence::empty(), "NDSI", &region, 30.0).unwrap();
        assert!(series.is_empty());
    }
}
