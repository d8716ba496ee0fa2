//! The pipeline runner
//!
//! For each analysis window: query the archive on the region grid, run the
//! scene stages (QA mask, then index) over every scene, reduce the index
//! band over time, clip to the region, and summarize. Window composites are
//! then differenced pairwise where the configuration asks for it.

use serde::Serialize;
use tracing::{debug, info, warn};

use basinscope_algorithms::imagery::{compute_index, mask_scene, IndexSpec, QaMask};
use basinscope_algorithms::statistics::{scene_time_series, summarize, SummaryStatistics, TimeSeries};
use basinscope_algorithms::temporal::{clip_to_region, difference, map_scenes, reduce, Composite};
use basinscope_core::{
    ArchiveClient, DateRange, Error, FeatureService, GridSpec, Region, Result, Scene, SceneQuery, SceneSequence,
};

use crate::config::{AnalysisWindow, ChangeSpec, PipelineConfig};
use crate::geometry::region_for;

/// One per-scene transform
#[derive(Debug, Clone, PartialEq)]
pub enum SceneStage {
    Mask(QaMask),
    Index(IndexSpec),
}

impl SceneStage {
    pub fn apply(&self, scene: &Scene) -> Result<Scene> {
        match self {
            SceneStage::Mask(mask) => mask_scene(scene, mask),
            SceneStage::Index(spec) => compute_index(scene, spec),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SceneStage::Mask(_) => "mask",
            SceneStage::Index(_) => "index",
        }
    }
}

/// Run `stages` in order over one scene
pub fn apply_stages(scene: &Scene, stages: &[SceneStage]) -> Result<Scene> {
    let mut current = scene.clone();
    for stage in stages {
        current = stage.apply(&current)?;
    }
    Ok(current)
}

/// Result of one analysis window
#[derive(Debug, Clone)]
pub struct WindowResult {
    pub label: String,
    pub dates: DateRange,
    pub composite: Composite,
    pub summary: Option<SummaryStatistics>,
    pub time_series: Option<TimeSeries>,
    /// Publish the composite as a layer
    pub layer: bool,
}

/// Result of one window difference
#[derive(Debug, Clone)]
pub struct ChangeResult {
    pub label: String,
    pub composite: Composite,
    pub summary: SummaryStatistics,
}

/// Everything one invocation produced
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub name: String,
    pub region: Region,
    pub grid: GridSpec,
    pub windows: Vec<WindowResult>,
    pub changes: Vec<ChangeResult>,
}

/// Serializable digest of an [`AnalysisReport`]
#[derive(Debug, Clone, Serialize)]
pub struct ReportDigest {
    pub name: String,
    pub epsg: u32,
    pub region_area_km2: f64,
    pub grid_shape: (usize, usize),
    pub windows: Vec<WindowDigest>,
    pub changes: Vec<ChangeDigest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WindowDigest {
    pub label: String,
    pub dates: DateRange,
    pub scene_count: usize,
    pub valid_pixels: usize,
    pub summary: Option<SummaryStatistics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangeDigest {
    pub label: String,
    pub summary: SummaryStatistics,
}

impl AnalysisReport {
    pub fn window(&self, label: &str) -> Option<&WindowResult> {
        self.windows.iter().find(|w| w.label == label)
    }

    pub fn change(&self, label: &str) -> Option<&ChangeResult> {
        self.changes.iter().find(|c| c.label == label)
    }

    pub fn digest(&self) -> ReportDigest {
        ReportDigest {
            name: self.name.clone(),
            epsg: self.region.epsg(),
            region_area_km2: self.region.area_km2(),
            grid_shape: self.grid.shape(),
            windows: self
                .windows
                .iter()
                .map(|w| WindowDigest {
                    label: w.label.clone(),
                    dates: w.dates,
                    scene_count: w.composite.scene_count,
                    valid_pixels: w.composite.valid_count(),
                    summary: w.summary.clone(),
                })
                .collect(),
            changes: self
                .changes
                .iter()
                .map(|c| ChangeDigest {
                    label: c.label.clone(),
                    summary: c.summary.clone(),
                })
                .collect(),
        }
    }
}

/// A validated configuration plus its scene stages
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    stages: Vec<SceneStage>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let mut stages = Vec::with_capacity(2);
        if let Some(qa) = &config.dataset.qa {
            stages.push(SceneStage::Mask(qa.clone()));
        }
        stages.push(SceneStage::Index(config.index.clone()));
        Ok(Self { config, stages })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stages(&self) -> &[SceneStage] {
        &self.stages
    }

    /// Build the region from the feature service, then run
    pub fn run<A, F>(&self, archive: &A, features: &F) -> Result<AnalysisReport>
    where
        A: ArchiveClient + ?Sized,
        F: FeatureService + ?Sized,
    {
        let rc = &self.config.region;
        let region = region_for(
            features,
            &rc.watershed,
            (rc.center[0], rc.center[1]),
            rc.radius_m,
            rc.epsg,
        )?;
        self.run_in_region(archive, region)
    }

    /// Run against an already-built region
    pub fn run_in_region<A>(&self, archive: &A, region: Region) -> Result<AnalysisReport>
    where
        A: ArchiveClient + ?Sized,
    {
        let grid = region.grid(self.config.summary.scale)?;
        info!(
            pipeline = %self.config.name,
            area_km2 = region.area_km2(),
            rows = grid.rows,
            cols = grid.cols,
            windows = self.config.windows.len(),
            "pipeline start"
        );

        let windows = self
            .config
            .windows
            .iter()
            .map(|w| self.run_window(archive, w, &region, &grid))
            .collect::<Result<Vec<_>>>()?;

        let changes = self
            .config
            .changes
            .iter()
            .map(|c| self.run_change(c, &windows, &region))
            .collect::<Result<Vec<_>>>()?;

        Ok(AnalysisReport {
            name: self.config.name.clone(),
            region,
            grid,
            windows,
            changes,
        })
    }

    /// Query and clean the scenes of one window
    pub fn window_scenes<A>(&self, archive: &A, window: &AnalysisWindow, grid: &GridSpec) -> Result<SceneSequence>
    where
        A: ArchiveClient + ?Sized,
    {
        let mut query = SceneQuery::new(
            self.config.dataset.collection.clone(),
            window.dates,
            *grid,
            self.config.dataset.bands.clone(),
        );
        if let Some(platform) = self.config.platform_for(window) {
            query = query.with_property("platform", platform);
        }

        let raw = archive.list_scenes(&query)?;
        debug!(window = %window.label, scenes = raw.len(), "archive query");
        map_scenes(&raw, |scene| apply_stages(scene, &self.stages))
    }

    fn run_window<A>(&self, archive: &A, window: &AnalysisWindow, region: &Region, grid: &GridSpec) -> Result<WindowResult>
    where
        A: ArchiveClient + ?Sized,
    {
        let scenes = self.window_scenes(archive, window, grid)?;
        if scenes.is_empty() {
            warn!(window = %window.label, dates = %window.dates, "no scenes, composite is all no-data");
        }

        let band = self.config.index_band();
        let mut composite = reduce(&scenes, band, self.config.reducer, grid)?.with_dates(window.dates);
        clip_to_region(&mut composite, region)?;

        let summary = if window.summarize {
            Some(summarize(&composite, region, &self.config.summary.params())?)
        } else {
            None
        };

        let time_series = match &self.config.time_series {
            Some(_) => Some(scene_time_series(&scenes, band, region, self.config.summary.scale)?),
            None => None,
        };

        info!(
            window = %window.label,
            scenes = scenes.len(),
            valid = composite.valid_count(),
            mean = ?summary.as_ref().and_then(|s| s.mean),
            "window reduced"
        );

        Ok(WindowResult {
            label: window.label.clone(),
            dates: window.dates,
            composite,
            summary,
            time_series,
            layer: window.layer,
        })
    }

    fn run_change(&self, change: &ChangeSpec, windows: &[WindowResult], region: &Region) -> Result<ChangeResult> {
        let find = |label: &str| {
            windows
                .iter()
                .find(|w| w.label == label)
                .ok_or_else(|| Error::InvalidParameter {
                    name: "changes",
                    value: label.to_string(),
                    reason: "no window with this label".into(),
                })
        };
        let from = find(&change.from)?;
        let to = find(&change.to)?;

        let mut composite = difference(&to.composite, &from.composite, change.band.clone())?;
        clip_to_region(&mut composite, region)?;
        let summary = summarize(&composite, region, &self.config.summary.params())?;

        info!(change = %change.label, mean = ?summary.mean, "change summarized");
        Ok(ChangeResult {
            label: change.label.clone(),
            composite,
            summary,
        })
    }
}
