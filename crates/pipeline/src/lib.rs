//! # basinscope pipeline
//!
//! Region-scoped remote-sensing index analysis:
//!
//! ```text
//! GeometryProvider → ArchiveQuery → PixelMasker → IndexComputer
//!     → TemporalReducer → clip → RegionSummarizer → ReportSink
//! ```
//!
//! - [`geometry`]: buffer-around-a-point clipped to a watershed
//! - [`config`]: serde configuration and the `burn` / `ndsi` / `ndvi-change` presets
//! - [`pipeline`]: scene stages and the runner
//! - [`report`]: report sinks and publishing

pub mod config;
pub mod geometry;
pub mod pipeline;
pub mod report;

pub use config::{
    AnalysisWindow, ChangeSpec, DatasetProfile, PipelineConfig, RegionConfig, SummaryConfig, TimeSeriesConfig,
    PRESETS,
};
pub use geometry::{region_for, target_crs, WatershedQuery};
pub use pipeline::{apply_stages, AnalysisReport, ChangeResult, Pipeline, ReportDigest, SceneStage, WindowResult};
pub use report::{
    publish, Cell, Chart, ChartKind, DirectorySink, ExportDestination, MemorySink, ReportSink, Table,
};
