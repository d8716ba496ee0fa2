//! Pipeline configuration and built-in presets
//!
//! A [`PipelineConfig`] is plain data: where the region comes from, which
//! dataset to query, how scenes are masked and indexed, which date windows
//! are reduced, which window pairs are differenced, and how summaries are
//! sampled. It round-trips through JSON so the CLI can read it from disk or
//! print a preset as a starting point.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use basinscope_algorithms::imagery::{landsat_c2, ndsi, ndvi, IndexSpec, QaMask};
use basinscope_algorithms::statistics::SummaryParams;
use basinscope_algorithms::temporal::TemporalOp;
use basinscope_core::{DateRange, Error, Result};

use crate::geometry::WatershedQuery;

/// Names accepted by [`PipelineConfig::preset`]
pub const PRESETS: [&str; 3] = ["burn", "ndsi", "ndvi-change"];

/// Hogg Pass SNOTEL, the shared point of interest of the presets
const HOGG_PASS: [f64; 2] = [-121.85, 44.4167];

fn default_true() -> bool {
    true
}

/// Where the analysis region comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub watershed: WatershedQuery,
    /// `[lon, lat]` in WGS84
    pub center: [f64; 2],
    pub radius_m: f64,
    /// Projected CRS; the UTM zone of `center` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epsg: Option<u32>,
}

/// How one archive dataset is queried and cleaned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    /// Archive dataset (STAC collection) id
    pub collection: String,
    /// Bands fetched from the archive, QA band included
    pub bands: Vec<String>,
    /// Quality mask; none for datasets without a QA band
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa: Option<QaMask>,
    /// Platform filter, overridable per window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// One date window reduced to one composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisWindow {
    pub label: String,
    pub dates: DateRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Publish the composite as a map layer
    #[serde(default = "default_true")]
    pub layer: bool,
    /// Compute region statistics for the composite
    #[serde(default)]
    pub summarize: bool,
}

impl AnalysisWindow {
    pub fn new(label: impl Into<String>, dates: DateRange) -> Self {
        Self {
            label: label.into(),
            dates,
            platform: None,
            layer: true,
            summarize: false,
        }
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn summarized(mut self) -> Self {
        self.summarize = true;
        self
    }

    pub fn without_layer(mut self) -> Self {
        self.layer = false;
        self
    }
}

/// `to − from` between two window composites, always summarized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSpec {
    pub label: String,
    /// Label of the earlier window
    pub from: String,
    /// Label of the later window
    pub to: String,
    /// Band name of the difference
    pub band: String,
}

/// Region sampling for summaries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Meters per pixel edge; also the composite grid resolution
    pub scale: f64,
    pub max_buckets: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

impl SummaryConfig {
    pub fn params(&self) -> SummaryParams {
        SummaryParams {
            scale: self.scale,
            max_buckets: self.max_buckets,
            threshold: self.threshold,
        }
    }
}

/// Per-scene time series export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesConfig {
    /// Export folder under the output root
    pub folder: String,
    /// File stem prefix; the window label is appended
    pub prefix: String,
}

/// Everything one pipeline invocation needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub region: RegionConfig,
    pub dataset: DatasetProfile,
    pub index: IndexSpec,
    pub reducer: TemporalOp,
    pub windows: Vec<AnalysisWindow>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ChangeSpec>,
    pub summary: SummaryConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_series: Option<TimeSeriesConfig>,
}

impl PipelineConfig {
    /// Built-in configuration by name, see [`PRESETS`]
    pub fn preset(name: &str) -> Result<Self> {
        let config = match name {
            "burn" => burn_preset()?,
            "ndsi" => ndsi_preset()?,
            "ndvi-change" => ndvi_change_preset()?,
            other => {
                return Err(Error::InvalidParameter {
                    name: "preset",
                    value: other.to_string(),
                    reason: format!("expected one of {}", PRESETS.join(", ")),
                })
            }
        };
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| Error::Other(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Other(e.to_string()))
    }

    /// Band the reducer and summaries work on
    pub fn index_band(&self) -> &str {
        self.index.output()
    }

    /// Platform filter for `window`
    pub fn platform_for<'a>(&'a self, window: &'a AnalysisWindow) -> Option<&'a str> {
        window.platform.as_deref().or(self.dataset.platform.as_deref())
    }

    pub fn window(&self, label: &str) -> Option<&AnalysisWindow> {
        self.windows.iter().find(|w| w.label == label)
    }

    /// Reject configurations the runner cannot execute
    pub fn validate(&self) -> Result<()> {
        let invalid = |name: &'static str, value: String, reason: &str| Error::InvalidParameter {
            name,
            value,
            reason: reason.to_string(),
        };

        if !(self.region.radius_m.is_finite() && self.region.radius_m > 0.0) {
            return Err(invalid("radius_m", self.region.radius_m.to_string(), "must be positive"));
        }
        let [lon, lat] = self.region.center;
        if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
            return Err(invalid("center", format!("{lon}, {lat}"), "must be WGS84 lon/lat"));
        }
        if !(self.summary.scale.is_finite() && self.summary.scale > 0.0) {
            return Err(invalid("scale", self.summary.scale.to_string(), "must be positive"));
        }
        if self.summary.max_buckets == 0 {
            return Err(invalid("max_buckets", "0".into(), "must be at least 1"));
        }
        if self.windows.is_empty() {
            return Err(invalid("windows", "[]".into(), "at least one window is required"));
        }

        let mut labels = HashSet::new();
        for w in &self.windows {
            DateRange::new(w.dates.start, w.dates.end)?;
            if !labels.insert(w.label.as_str()) {
                return Err(invalid("windows", w.label.clone(), "duplicate window label"));
            }
        }
        for c in &self.changes {
            for end in [&c.from, &c.to] {
                if !labels.contains(end.as_str()) {
                    return Err(invalid("changes", end.clone(), "no window with this label"));
                }
            }
        }

        if let Some(qa) = &self.dataset.qa {
            qa.validate()?;
            if !self.dataset.bands.contains(&qa.band) {
                return Err(invalid("qa", qa.band.clone(), "QA band is not among the fetched bands"));
            }
        }
        for input in self.index.inputs() {
            if !self.dataset.bands.iter().any(|b| b == input) {
                return Err(invalid("index", input.to_string(), "index input is not among the fetched bands"));
            }
        }
        Ok(())
    }
}

fn hogg_pass_region() -> RegionConfig {
    RegionConfig {
        watershed: WatershedQuery::new("huc8", "huc8", "17090004"),
        center: HOGG_PASS,
        radius_m: 14_000.0,
        epsg: None,
    }
}

/// B&B Complex fire: FIRMS brightness temperature before and after 2003
fn burn_preset() -> Result<PipelineConfig> {
    Ok(PipelineConfig {
        name: "burn".into(),
        region: hogg_pass_region(),
        dataset: DatasetProfile {
            collection: "firms".into(),
            bands: vec!["T21".into()],
            qa: None,
            platform: None,
        },
        index: IndexSpec::band("T21", "T21"),
        reducer: TemporalOp::Max,
        windows: vec![
            AnalysisWindow::new("pre-burn", DateRange::parse("2000-11-01", "2003-03-01")?),
            AnalysisWindow::new("post-burn", DateRange::parse("2003-03-01", "2004-03-01")?).summarized(),
        ],
        changes: vec![],
        summary: SummaryConfig {
            scale: 1000.0,
            max_buckets: 30,
            threshold: Some(300.0),
        },
        time_series: None,
    })
}

/// Landsat 5 snow cover over two multi-year periods
fn ndsi_preset() -> Result<PipelineConfig> {
    Ok(PipelineConfig {
        name: "ndsi".into(),
        region: hogg_pass_region(),
        dataset: DatasetProfile {
            collection: "landsat-c2-l2".into(),
            bands: vec!["green".into(), "swir16".into(), "qa_pixel".into()],
            // Bits 3-6 must all be zero. In Collection 2 bit 6 is the
            // clear-sky flag, not water, so clear pixels are dropped as
            // well; use `landsat_c2::WATER` (bit 7) for a water mask.
            qa: Some(QaMask::all_clear(
                "qa_pixel",
                &[landsat_c2::CLOUD, landsat_c2::CLOUD_SHADOW, landsat_c2::SNOW, landsat_c2::CLEAR],
            )?),
            platform: Some("landsat-5".into()),
        },
        index: ndsi("green", "swir16"),
        reducer: TemporalOp::Median,
        windows: vec![
            AnalysisWindow::new("1997-2002", DateRange::parse("1997-01-01", "2003-01-01")?),
            AnalysisWindow::new("2003-2009", DateRange::parse("2003-01-01", "2010-01-01")?),
        ],
        changes: vec![],
        summary: SummaryConfig {
            scale: 30.0,
            max_buckets: 30,
            threshold: None,
        },
        time_series: Some(TimeSeriesConfig {
            folder: "exports".into(),
            prefix: "NDSI".into(),
        }),
    })
}

/// Landsat 5/7 mean-NDVI change over three year pairs
fn ndvi_change_preset() -> Result<PipelineConfig> {
    let year = |y: i32, platform: &str| -> Result<AnalysisWindow> {
        Ok(AnalysisWindow::new(y.to_string(), DateRange::calendar_year(y)?)
            .with_platform(platform)
            .without_layer())
    };
    let change = |from: i32, to: i32| ChangeSpec {
        label: format!("NDVI change {from}-{to}"),
        from: from.to_string(),
        to: to.to_string(),
        band: "NDVI_change".into(),
    };

    Ok(PipelineConfig {
        name: "ndvi-change".into(),
        region: hogg_pass_region(),
        dataset: DatasetProfile {
            collection: "landsat-c2-l2".into(),
            bands: vec!["nir08".into(), "red".into(), "qa_pixel".into()],
            qa: Some(QaMask::all_clear(
                "qa_pixel",
                &[landsat_c2::CLOUD, landsat_c2::CLOUD_SHADOW],
            )?),
            platform: None,
        },
        index: ndvi("nir08", "red"),
        reducer: TemporalOp::Mean,
        windows: vec![
            year(1997, "landsat-5")?,
            year(2002, "landsat-5")?,
            year(2003, "landsat-5")?,
            year(2009, "landsat-5")?,
            year(2010, "landsat-7")?,
            year(2016, "landsat-7")?,
        ],
        changes: vec![change(1997, 2002), change(2003, 2009), change(2010, 2016)],
        summary: SummaryConfig {
            scale: 30.0,
            max_buckets: 30,
            threshold: None,
        },
        time_series: None,
    })
}
