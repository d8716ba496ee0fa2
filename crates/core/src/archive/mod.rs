//! Seams to the remote collaborators
//!
//! The pipeline never talks to a network service directly. Scene archives
//! implement [`ArchiveClient`] and vector-feature services implement
//! [`FeatureService`]; the in-memory implementations in [`memory`] back the
//! tests and offline runs, the STAC/GeoJSON ones live in the cloud crate.

mod memory;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::raster::GridSpec;
use crate::scene::{DateRange, SceneSequence};
use crate::vector::FeatureCollection;

pub use memory::{InMemoryArchive, InMemoryFeatureService};

/// One spatial + temporal + band filter against a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneQuery {
    /// Dataset (collection) identifier
    pub dataset: String,
    /// Acquisition window, half-open
    pub dates: DateRange,
    /// Analysis grid; its extent is the spatial filter and every returned
    /// band is delivered on it
    pub grid: GridSpec,
    /// Bands to keep; everything else is discarded
    pub bands: Vec<String>,
    /// Extra equality filters on scene properties (e.g. `platform`).
    /// Archives that do not track properties ignore them.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl SceneQuery {
    pub fn new(dataset: impl Into<String>, dates: DateRange, grid: GridSpec, bands: Vec<String>) -> Self {
        Self {
            dataset: dataset.into(),
            dates,
            grid,
            bands,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Spatial filter `(min_x, min_y, max_x, max_y)` in the grid CRS
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.grid.bounds()
    }
}

/// Source of scenes.
///
/// An empty result is an empty sequence, never an error. A scene that lacks
/// one of the requested bands is left out with a warning. Errors are
/// reserved for an unreachable or misbehaving service.
pub trait ArchiveClient {
    fn list_scenes(&self, query: &SceneQuery) -> Result<SceneSequence>;
}

/// Attribute equality predicate over features
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFilter {
    pub field: String,
    pub value: String,
}

impl FeatureFilter {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Source of vector features (watershed boundaries)
pub trait FeatureService {
    fn get_features(&self, collection: &str, filter: &FeatureFilter) -> Result<FeatureCollection>;
}

impl<T: ArchiveClient + ?Sized> ArchiveClient for &T {
    fn list_scenes(&self, query: &SceneQuery) -> Result<SceneSequence> {
        (**self).list_scenes(query)
    }
}

impl<T: FeatureService + ?Sized> FeatureService for &T {
    fn get_features(&self, collection: &str, filter: &FeatureFilter) -> Result<FeatureCollection> {
        (**self).get_features(collection, filter)
    }
}
