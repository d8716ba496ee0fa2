//! In-memory archive and feature service

use std::collections::HashMap;

use tracing::{debug, warn};

use super::{ArchiveClient, FeatureFilter, FeatureService, SceneQuery};
use crate::error::Result;
use crate::scene::{Scene, SceneSequence};
use crate::vector::{Feature, FeatureCollection};

/// Scenes held in memory, grouped by dataset.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArchive {
    datasets: HashMap<String, Vec<Scene>>,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scene under its own dataset id
    pub fn insert(&mut self, scene: Scene) {
        self.datasets.entry(scene.dataset.clone()).or_default().push(scene);
    }

    pub fn with_scenes(scenes: impl IntoIterator<Item = Scene>) -> Self {
        let mut archive = Self::new();
        for scene in scenes {
            archive.insert(scene);
        }
        archive
    }

    pub fn len(&self) -> usize {
        self.datasets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn overlaps(a: (f64, f64, f64, f64), b: (f64, f64, f64, f64)) -> bool {
    a.0 < b.2 && b.0 < a.2 && a.1 < b.3 && b.1 < a.3
}

impl ArchiveClient for InMemoryArchive {
    fn list_scenes(&self, query: &SceneQuery) -> Result<SceneSequence> {
        let Some(scenes) = self.datasets.get(&query.dataset) else {
            return Ok(SceneSequence::empty());
        };
        let bounds = query.bounds();

        let mut out = Vec::new();
        for scene in scenes {
            if !query.dates.contains(&scene.acquired) {
                continue;
            }
            if let Some(footprint) = scene.footprint() {
                if !overlaps(footprint, bounds) {
                    continue;
                }
            }

            if let Some(band) = query.bands.iter().find(|b| !scene.has_band(b)) {
                warn!(scene = %scene.id, band = %band, "scene lacks requested band, skipped");
                continue;
            }

            let mut selected = scene.select(&query.bands)?;
            for (_, band) in selected.bands_mut() {
                if band.grid() != query.grid {
                    *band = band.warp_nearest(&query.grid)?;
                }
            }
            out.push(selected);
        }

        debug!(
            dataset = %query.dataset,
            dates = %query.dates,
            matched = out.len(),
            "in-memory archive query"
        );
        Ok(SceneSequence::new(out))
    }
}

/// Feature collections held in memory, keyed by collection id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFeatureService {
    collections: HashMap<String, Vec<Feature>>,
}

impl InMemoryFeatureService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: impl Into<String>, feature: Feature) {
        self.collections.entry(collection.into()).or_default().push(feature);
    }
}

impl FeatureService for InMemoryFeatureService {
    fn get_features(&self, collection: &str, filter: &FeatureFilter) -> Result<FeatureCollection> {
        Ok(self
            .collections
            .get(collection)
            .map(|features| {
                features
                    .iter()
                    .filter(|f| f.matches(&filter.field, &filter.value))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
