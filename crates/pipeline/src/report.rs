//! Report and export adapter
//!
//! The pipeline never prints or writes files itself. [`publish`] walks an
//! [`AnalysisReport`] and hands layers, scalar values, charts and tables to
//! a [`ReportSink`]. [`DirectorySink`] writes them under one output
//! directory; [`MemorySink`] keeps them for inspection.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use basinscope_algorithms::statistics::{threshold_mask, HistogramBucket, SummaryStatistics, TimeSeries};
use basinscope_algorithms::temporal::Composite;
use basinscope_core::io::write_geotiff;
use basinscope_core::{Error, Raster, Result};

use crate::config::PipelineConfig;
use crate::pipeline::{AnalysisReport, ReportDigest};

// ---------------------------------------------------------------------------
// Tables and charts
// ---------------------------------------------------------------------------

/// One table cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    /// `None` is no data and renders empty
    Number(Option<f64>),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Number(Some(v)) => write!(f, "{v}"),
            Cell::Number(None) => Ok(()),
        }
    }
}

/// Titled rows under named columns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(title: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            title: title.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::InvalidParameter {
                name: "row",
                value: row.len().to_string(),
                reason: format!("table '{}' has {} columns", self.title, self.columns.len()),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Bucket bounds and counts
    pub fn from_histogram(title: impl Into<String>, buckets: &[HistogramBucket]) -> Self {
        let mut table = Self::new(title, &["lower", "upper", "count"]);
        table.rows = buckets
            .iter()
            .map(|b| {
                vec![
                    Cell::Number(Some(b.lower)),
                    Cell::Number(Some(b.lower + b.width)),
                    Cell::Number(Some(b.count as f64)),
                ]
            })
            .collect();
        table
    }

    /// Scene id, acquisition time and region mean per scene
    pub fn from_time_series(title: impl Into<String>, series: &TimeSeries) -> Self {
        let mut table = Self::new(title, &["scene_id", "date", series.band.as_str()]);
        table.rows = series
            .points
            .iter()
            .map(|p| {
                vec![
                    Cell::Text(p.scene_id.clone()),
                    Cell::Text(p.acquired.to_rfc3339()),
                    Cell::Number(p.value),
                ]
            })
            .collect();
        table
    }

    /// Write as CSV with a header row
    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let csv_err = |e: csv::Error| Error::Other(format!("CSV write error: {e}"));
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns).map_err(csv_err)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|c| c.to_string())).map_err(csv_err)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Histogram,
    Line,
}

/// A table meant to be drawn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub kind: ChartKind,
    pub x_label: String,
    pub y_label: String,
    pub table: Table,
}

impl Chart {
    pub fn title(&self) -> &str {
        &self.table.title
    }
}

/// Export target: a folder under the sink root and a file stem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportDestination {
    pub folder: String,
    pub description: String,
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receiver of everything a run presents
pub trait ReportSink {
    fn add_layer(&mut self, name: &str, raster: &Raster<f64>) -> Result<()>;
    fn print_value(&mut self, label: &str, value: Option<f64>) -> Result<()>;
    fn chart(&mut self, chart: &Chart) -> Result<()>;
    fn export_table(&mut self, table: &Table, destination: &ExportDestination) -> Result<()>;
}

/// File-system-safe stem: ASCII alphanumerics, `-` and `_`; runs of anything
/// else become one `_`.
pub fn file_stem(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
struct PrintedValue {
    label: String,
    value: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
struct WrittenFile {
    name: String,
    path: PathBuf,
}

/// Writes layers as GeoTIFF and tables/charts as CSV under `root`:
///
/// ```text
/// root/layers/<name>.tif
/// root/charts/<title>.csv
/// root/<folder>/<description>.csv
/// root/summary.json
/// ```
#[derive(Debug)]
pub struct DirectorySink {
    root: PathBuf,
    values: Vec<PrintedValue>,
    layers: Vec<WrittenFile>,
    charts: Vec<WrittenFile>,
    exports: Vec<WrittenFile>,
}

impl DirectorySink {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            values: Vec::new(),
            layers: Vec::new(),
            charts: Vec::new(),
            exports: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn write_table(&self, dir: &Path, stem: &str, table: &Table) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{stem}.csv"));
        table.write_csv(fs::File::create(&path)?)?;
        Ok(path)
    }

    /// Write `summary.json`: the report digest plus every value and file
    /// this sink produced.
    pub fn write_summary(&self, digest: &ReportDigest) -> Result<PathBuf> {
        #[derive(Serialize)]
        struct Summary<'a> {
            report: &'a ReportDigest,
            values: &'a [PrintedValue],
            layers: &'a [WrittenFile],
            charts: &'a [WrittenFile],
            exports: &'a [WrittenFile],
        }

        let summary = Summary {
            report: digest,
            values: &self.values,
            layers: &self.layers,
            charts: &self.charts,
            exports: &self.exports,
        };
        let path = self.root.join("summary.json");
        let text = serde_json::to_string_pretty(&summary).map_err(|e| Error::Other(e.to_string()))?;
        fs::write(&path, text)?;
        info!(path = %path.display(), "summary written");
        Ok(path)
    }
}

impl ReportSink for DirectorySink {
    fn add_layer(&mut self, name: &str, raster: &Raster<f64>) -> Result<()> {
        let dir = self.root.join("layers");
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.tif", file_stem(name)));
        write_geotiff(raster, &path, None)?;
        info!(layer = name, path = %path.display(), "layer written");
        self.layers.push(WrittenFile {
            name: name.to_string(),
            path,
        });
        Ok(())
    }

    fn print_value(&mut self, label: &str, value: Option<f64>) -> Result<()> {
        match value {
            Some(v) => info!("{label}: {v}"),
            None => info!("{label}: no data"),
        }
        self.values.push(PrintedValue {
            label: label.to_string(),
            value,
        });
        Ok(())
    }

    fn chart(&mut self, chart: &Chart) -> Result<()> {
        let path = self.write_table(&self.root.join("charts"), &file_stem(chart.title()), &chart.table)?;
        info!(chart = chart.title(), rows = chart.table.len(), "chart data written");
        self.charts.push(WrittenFile {
            name: chart.title().to_string(),
            path,
        });
        Ok(())
    }

    fn export_table(&mut self, table: &Table, destination: &ExportDestination) -> Result<()> {
        let dir = self.root.join(file_stem(&destination.folder));
        let path = self.write_table(&dir, &file_stem(&destination.description), table)?;
        info!(table = %table.title, path = %path.display(), "table exported");
        self.exports.push(WrittenFile {
            name: destination.description.clone(),
            path,
        });
        Ok(())
    }
}

/// Keeps everything in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub layers: Vec<(String, Raster<f64>)>,
    pub values: Vec<(String, Option<f64>)>,
    pub charts: Vec<Chart>,
    pub exports: Vec<(ExportDestination, Table)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Printed value by label; outer `None` when never printed
    pub fn value(&self, label: &str) -> Option<Option<f64>> {
        self.values.iter().find(|(l, _)| l == label).map(|(_, v)| *v)
    }

    pub fn layer(&self, name: &str) -> Option<&Raster<f64>> {
        self.layers.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }
}

impl ReportSink for MemorySink {
    fn add_layer(&mut self, name: &str, raster: &Raster<f64>) -> Result<()> {
        self.layers.push((name.to_string(), raster.clone()));
        Ok(())
    }

    fn print_value(&mut self, label: &str, value: Option<f64>) -> Result<()> {
        self.values.push((label.to_string(), value));
        Ok(())
    }

    fn chart(&mut self, chart: &Chart) -> Result<()> {
        self.charts.push(chart.clone());
        Ok(())
    }

    fn export_table(&mut self, table: &Table, destination: &ExportDestination) -> Result<()> {
        self.exports.push((destination.clone(), table.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

/// Layer name of a composite
pub fn layer_name(label: &str, band: &str) -> String {
    format!("{band} {label}")
}

/// Label of the printed region mean
pub fn mean_label(label: &str, band: &str) -> String {
    format!("{label}: mean {band} within region")
}

/// Label of the printed area share above the threshold
pub fn percent_label(label: &str, band: &str, threshold: f64) -> String {
    format!("{label}: % of region with {band} > {threshold}")
}

fn publish_summary<S: ReportSink + ?Sized>(
    sink: &mut S,
    label: &str,
    composite: &Composite,
    summary: &SummaryStatistics,
) -> Result<()> {
    let band = composite.band.as_str();
    sink.print_value(&mean_label(label, band), summary.mean)?;
    sink.chart(&Chart {
        kind: ChartKind::Histogram,
        x_label: band.to_string(),
        y_label: "frequency".into(),
        table: Table::from_histogram(format!("{label} {band} histogram"), &summary.histogram),
    })?;

    if let Some(t) = summary.threshold {
        sink.print_value(&percent_label(label, band, t), summary.percent_above_threshold)?;
        let mask = threshold_mask(composite, t)?;
        sink.add_layer(&layer_name(label, &mask.band), &mask.raster)?;
    }
    Ok(())
}

/// Present a finished run through `sink`
pub fn publish<S: ReportSink + ?Sized>(report: &AnalysisReport, config: &PipelineConfig, sink: &mut S) -> Result<()> {
    for window in &report.windows {
        let band = window.composite.band.as_str();
        if window.layer {
            sink.add_layer(&layer_name(&window.label, band), &window.composite.raster)?;
        }
        if let Some(summary) = &window.summary {
            publish_summary(sink, &window.label, &window.composite, summary)?;
        }
        if let (Some(series), Some(ts)) = (&window.time_series, &config.time_series) {
            let title = format!("{band} time series {}", window.label);
            let table = Table::from_time_series(title, series);
            sink.chart(&Chart {
                kind: ChartKind::Line,
                x_label: "date".into(),
                y_label: band.to_string(),
                table: table.clone(),
            })?;
            let destination = ExportDestination {
                folder: ts.folder.clone(),
                description: format!("{}_{}", ts.prefix, window.label.replace('-', "_")),
            };
            sink.export_table(&table, &destination)?;
        }
    }

    for change in &report.changes {
        sink.add_layer(&layer_name(&change.label, &change.composite.band), &change.composite.raster)?;
        publish_summary(sink, &change.label, &change.composite, &change.summary)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use basinscope_algorithms::statistics::TimeSeriesPoint;
    use basinscope_core::GeoTransform;
    use chrono::{TimeZone, Utc};

    fn series() -> TimeSeries {
        TimeSeries {
            band: "NDSI".into(),
            points: vec![
                TimeSeriesPoint {
                    scene_id: "LT05_a".into(),
                    acquired: Utc.with_ymd_and_hms(1997, 3, 1, 18, 0, 0).unwrap(),
                    value: Some(0.25),
                },
                TimeSeriesPoint {
                    scene_id: "LT05_b".into(),
                    acquired: Utc.with_ymd_and_hms(1997, 3, 17, 18, 0, 0).unwrap(),
                    value: None,
                },
            ],
        }
    }

    #[test]
    fn test_time_series_csv() {
        let table = Table::from_time_series("NDSI 1997", &series());
        let mut buf = Vec::new();
        table.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "scene_id,date,NDSI");
        assert_eq!(lines[1], "LT05_a,1997-03-01T18:00:00+00:00,0.25");
        assert_eq!(lines[2], "LT05_b,1997-03-17T18:00:00+00:00,");
    }

    #[test]
    fn test_histogram_table() {
        let buckets = [
            HistogramBucket { lower: 300.0, width: 10.0, count: 4 },
            HistogramBucket { lower: 310.0, width: 10.0, count: 1 },
        ];
        let table = Table::from_histogram("h", &buckets);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[1], vec![Cell::Number(Some(310.0)), Cell::Number(Some(320.0)), Cell::Number(Some(1.0))]);
    }

    #[test]
    fn test_row_width_checked() {
        let mut table = Table::new("t", &["a", "b"]);
        assert!(table.push_row(vec![Cell::Text("x".into())]).is_err());
        table.push_row(vec![Cell::Text("x".into()), Cell::Number(None)]).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("NDVI_change NDVI change 1997-2002"), "NDVI_change_NDVI_change_1997-2002");
        assert_eq!(file_stem("T21 > 300 post-burn"), "T21_300_post-burn");
        assert_eq!(file_stem("../../etc"), "etc");
        assert_eq!(file_stem("%%"), "unnamed");
    }

    #[test]
    fn test_directory_sink_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path().join("out")).unwrap();

        let mut raster = Raster::filled(2, 2, 1.5);
        raster.set_transform(GeoTransform::new(0.0, 60.0, 30.0, -30.0));
        raster.set_epsg(Some(32610));
        sink.add_layer("NDSI 1997-2002", &raster).unwrap();
        sink.print_value("mean", Some(0.5)).unwrap();
        sink.export_table(
            &Table::from_time_series("ts", &series()),
            &ExportDestination {
                folder: "exports".into(),
                description: "NDSI_1997_2002".into(),
            },
        )
        .unwrap();

        let root = sink.root().to_path_buf();
        let layer = root.join("layers").join("NDSI_1997-2002.tif");
        assert!(layer.exists());
        let back: Raster<f64> = basinscope_core::io::read_geotiff(&layer).unwrap();
        assert_eq!(back.get(1, 1).unwrap(), 1.5);
        assert_eq!(back.epsg(), Some(32610));

        let csv = fs::read_to_string(root.join("exports").join("NDSI_1997_2002.csv")).unwrap();
        assert!(csv.starts_with("scene_id,date,NDSI"));
    }

    #[test]
    fn test_memory_sink_lookup() {
        let mut sink = MemorySink::new();
        sink.print_value("a", None).unwrap();
        assert_eq!(sink.value("a"), Some(None));
        assert_eq!(sink.value("b"), None);
    }
}
