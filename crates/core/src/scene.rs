//! Scenes, scene sequences and acquisition date windows

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::{GridSpec, Raster};

// ---------------------------------------------------------------------------
// Date range
// ---------------------------------------------------------------------------

/// Half-open window of calendar dates `[start, end)`.
///
/// Windows are always absolute calendar boundaries; relative durations are
/// resolved by the caller before a query is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Unchecked wire form; deserialization goes through [`DateRange::new`]
#[derive(Deserialize)]
struct RawDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = Error;

    fn try_from(raw: RawDateRange) -> Result<Self> {
        Self::new(raw.start, raw.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end <= start {
            return Err(Error::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse two `YYYY-MM-DD` strings
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| Error::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            })
        };
        Self::new(parse(start)?, parse(end)?)
    }

    /// `[year-01-01, (year+1)-01-01)`
    pub fn calendar_year(year: i32) -> Result<Self> {
        let start = NaiveDate::from_ymd_opt(year, 1, 1);
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1);
        match (start, end) {
            (Some(start), Some(end)) => Self::new(start, end),
            _ => Err(Error::InvalidParameter {
                name: "year",
                value: year.to_string(),
                reason: "outside the supported calendar".into(),
            }),
        }
    }

    /// Whether `instant` falls on a date inside the window
    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        let day = instant.date_naive();
        day >= self.start && day < self.end
    }

    /// First instant of the window
    pub fn start_instant(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// First instant after the window
    pub fn end_instant(&self) -> DateTime<Utc> {
        self.end.and_time(NaiveTime::MIN).and_utc()
    }

    /// Calendar year of the first day
    pub fn start_year(&self) -> i32 {
        self.start.year()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// Scene
// ---------------------------------------------------------------------------

/// One timestamped multi-band observation.
///
/// All bands share a single grid. Scenes are treated as values: masking and
/// index computation produce new scenes.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub id: String,
    pub dataset: String,
    pub acquired: DateTime<Utc>,
    bands: BTreeMap<String, Raster<f64>>,
}

impl Scene {
    pub fn new(id: impl Into<String>, dataset: impl Into<String>, acquired: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            dataset: dataset.into(),
            acquired,
            bands: BTreeMap::new(),
        }
    }

    /// Add or replace a band. Every band must match the grid of the first.
    pub fn with_band(mut self, name: impl Into<String>, raster: Raster<f64>) -> Result<Self> {
        self.insert_band(name, raster)?;
        Ok(self)
    }

    pub fn insert_band(&mut self, name: impl Into<String>, raster: Raster<f64>) -> Result<()> {
        if let Some(existing) = self.bands.values().next() {
            existing.check_same_shape(&raster)?;
        }
        self.bands.insert(name.into(), raster);
        Ok(())
    }

    pub fn band(&self, name: &str) -> Result<&Raster<f64>> {
        self.bands.get(name).ok_or_else(|| Error::MissingBand {
            scene: self.id.clone(),
            band: name.to_string(),
        })
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.contains_key(name)
    }

    pub fn band_names(&self) -> impl Iterator<Item = &str> {
        self.bands.keys().map(String::as_str)
    }

    pub fn bands(&self) -> impl Iterator<Item = (&str, &Raster<f64>)> {
        self.bands.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn bands_mut(&mut self) -> impl Iterator<Item = (&str, &mut Raster<f64>)> {
        self.bands.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Keep only the named bands; missing names are an error
    pub fn select(&self, names: &[String]) -> Result<Self> {
        let mut out = Scene::new(self.id.clone(), self.dataset.clone(), self.acquired);
        for name in names {
            out.bands.insert(name.clone(), self.band(name)?.clone());
        }
        Ok(out)
    }

    /// Grid shared by the bands, if the scene has any
    pub fn grid(&self) -> Option<GridSpec> {
        self.bands.values().next().map(Raster::grid)
    }

    /// Footprint `(min_x, min_y, max_x, max_y)` of the scene grid
    pub fn footprint(&self) -> Option<(f64, f64, f64, f64)> {
        self.grid().map(|g| g.bounds())
    }
}

// ---------------------------------------------------------------------------
// Scene sequence
// ---------------------------------------------------------------------------

/// Scenes matching one query.
///
/// Archives may deliver scenes in any order. Operations that depend on
/// order (time series, first/last) use [`SceneSequence::sorted`], which
/// orders by acquisition time and then by scene id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneSequence {
    scenes: Vec<Scene>,
}

impl SceneSequence {
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.iter()
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn into_scenes(self) -> Vec<Scene> {
        self.scenes
    }

    /// Scenes ordered by acquisition time, then id
    pub fn sorted(&self) -> Vec<&Scene> {
        let mut refs: Vec<&Scene> = self.scenes.iter().collect();
        refs.sort_by(|a, b| a.acquired.cmp(&b.acquired).then_with(|| a.id.cmp(&b.id)));
        refs
    }

    pub fn first(&self) -> Option<&Scene> {
        self.sorted().first().copied()
    }

    pub fn last(&self) -> Option<&Scene> {
        self.sorted().last().copied()
    }
}

impl FromIterator<Scene> for SceneSequence {
    fn from_iter<I: IntoIterator<Item = Scene>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl IntoIterator for SceneSequence {
    type Item = Scene;
    type IntoIter = std::vec::IntoIter<Scene>;

    fn into_iter(self) -> Self::IntoIter {
        self.scenes.into_iter()
    }
}
