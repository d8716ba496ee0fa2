//! End-to-end runs over in-memory archives and feature services.

use approx::assert_relative_eq;
use chrono::{TimeZone, Utc};
use geo::{Geometry, Rect};
use ndarray::Array2;

use basinscope_algorithms::temporal::TemporalOp;
use basinscope_core::{
    AttributeValue, DateRange, Error, Feature, GridSpec, InMemoryArchive, InMemoryFeatureService, Raster, Region,
    Scene, CRS,
};
use basinscope_pipeline::report::{layer_name, mean_label, percent_label};
use basinscope_pipeline::{
    publish, region_for, AnalysisWindow, ChangeSpec, DirectorySink, MemorySink, Pipeline, PipelineConfig,
    WatershedQuery,
};

const EPSG: u32 = 32610;

/// 10 km x 10 km, 100 km²
fn square_region() -> Region {
    Region::rectangle(500_000.0, 4_900_000.0, 510_000.0, 4_910_000.0, CRS::from_epsg(EPSG)).unwrap()
}

fn raster_on(grid: &GridSpec, f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
    Raster::on_grid(grid)
        .with_data(Array2::from_shape_fn(grid.shape(), |(r, c)| f(r, c)))
        .unwrap()
}

fn scene_at(id: &str, dataset: &str, y: i32, m: u32, d: u32) -> Scene {
    Scene::new(id, dataset, Utc.with_ymd_and_hms(y, m, d, 18, 0, 0).unwrap())
}

fn burn_config() -> PipelineConfig {
    let mut config = PipelineConfig::preset("burn").unwrap();
    config.summary.threshold = Some(315.0);
    config
}

#[test]
fn burn_max_composite_and_threshold_share() {
    let region = square_region();
    let grid = region.grid(1000.0).unwrap();
    assert_eq!(grid.shape(), (10, 10));

    let t21 = |v: f64| raster_on(&grid, move |_, _| v);
    let archive = InMemoryArchive::with_scenes(vec![
        scene_at("pre", "firms", 2001, 8, 1).with_band("T21", t21(330.0)).unwrap(),
        scene_at("a", "firms", 2003, 7, 1).with_band("T21", t21(300.0)).unwrap(),
        scene_at("b", "firms", 2003, 8, 1).with_band("T21", t21(310.0)).unwrap(),
        // only the north-west 5x5 block is observed hot
        scene_at("c", "firms", 2003, 8, 20)
            .with_band("T21", raster_on(&grid, |r, c| if r < 5 && c < 5 { 320.0 } else { f64::NAN }))
            .unwrap(),
        // outside both windows
        scene_at("late", "firms", 2005, 8, 1).with_band("T21", t21(500.0)).unwrap(),
    ]);

    let pipeline = Pipeline::new(burn_config()).unwrap();
    let report = pipeline.run_in_region(&archive, region).unwrap();

    let pre = report.window("pre-burn").unwrap();
    assert_eq!(pre.composite.scene_count, 1);
    assert!(pre.summary.is_none());

    let post = report.window("post-burn").unwrap();
    assert_eq!(post.composite.scene_count, 3);
    assert_eq!(post.composite.raster.get(0, 0).unwrap(), 320.0);
    assert_eq!(post.composite.raster.get(9, 9).unwrap(), 310.0);

    let summary = post.summary.as_ref().unwrap();
    assert_eq!(summary.valid_pixels, 100);
    assert_relative_eq!(summary.mean.unwrap(), 312.5, epsilon = 1e-9);
    assert_eq!(summary.threshold_count, Some(25));
    assert_relative_eq!(summary.percent_above_threshold.unwrap(), 25.0, epsilon = 1e-9);
    assert_eq!(summary.histogram.iter().map(|b| b.count).sum::<usize>(), 100);

    let mut sink = MemorySink::new();
    publish(&report, pipeline.config(), &mut sink).unwrap();
    assert!(sink.layer(&layer_name("pre-burn", "T21")).is_some());
    assert!(sink.layer(&layer_name("post-burn", "T21")).is_some());
    let hot = sink.layer(&layer_name("post-burn", "T21_above_315")).unwrap();
    assert_eq!(hot.get(0, 0).unwrap(), 1.0);
    assert_eq!(hot.get(9, 9).unwrap(), 0.0);
    assert_relative_eq!(sink.value(&mean_label("post-burn", "T21")).unwrap().unwrap(), 312.5, epsilon = 1e-9);
    assert_relative_eq!(
        sink.value(&percent_label("post-burn", "T21", 315.0)).unwrap().unwrap(),
        25.0,
        epsilon = 1e-9
    );
    assert_eq!(sink.charts.len(), 1);
}

#[test]
fn empty_archive_gives_no_data_not_errors() {
    let region = square_region();
    let pipeline = Pipeline::new(burn_config()).unwrap();
    let report = pipeline.run_in_region(&InMemoryArchive::new(), region).unwrap();

    let post = report.window("post-burn").unwrap();
    assert_eq!(post.composite.grid(), report.grid);
    assert_eq!(post.composite.valid_count(), 0);

    let summary = post.summary.as_ref().unwrap();
    assert_eq!(summary.mean, None);
    assert!(summary.histogram.is_empty());
    assert_eq!(summary.threshold_count, Some(0));
    assert_eq!(summary.percent_above_threshold, Some(0.0));
}

#[test]
fn degenerate_region_reports_no_percent() {
    // zero-width sliver: a footprint but no area
    let region = Region::rectangle(500_000.0, 4_900_000.0, 500_000.0, 4_905_000.0, CRS::from_epsg(EPSG)).unwrap();
    assert_eq!(region.area_km2(), 0.0);

    let pipeline = Pipeline::new(burn_config()).unwrap();
    let report = pipeline.run_in_region(&InMemoryArchive::new(), region).unwrap();
    let summary = report.window("post-burn").unwrap().summary.clone().unwrap();
    assert_eq!(summary.percent_above_threshold, None);
    assert_eq!(summary.mean, None);
}

fn landsat_scene(id: &str, y: i32, grid: &GridSpec, green: f64, swir: f64, qa: f64) -> Scene {
    let uniform = |v: f64| raster_on(grid, move |_, _| v);
    scene_at(id, "landsat-c2-l2", y, 2, 1)
        .with_band("green", uniform(green))
        .unwrap()
        .with_band("swir16", uniform(swir))
        .unwrap()
        .with_band("qa_pixel", uniform(qa))
        .unwrap()
}

#[test]
fn ndsi_time_series_masks_clouds_and_exports() {
    // 300 m square at 30 m: 10 x 10 pixels
    let region = Region::rectangle(600_000.0, 4_900_000.0, 600_300.0, 4_900_300.0, CRS::from_epsg(EPSG)).unwrap();
    let grid = region.grid(30.0).unwrap();

    let mut config = PipelineConfig::preset("ndsi").unwrap();
    config.windows = vec![AnalysisWindow::new("1997-2002", DateRange::parse("1997-01-01", "2003-01-01").unwrap())];

    let archive = InMemoryArchive::with_scenes(vec![
        landsat_scene("s3", 1999, &grid, 0.3, 0.1, 0.0),
        // every pixel flagged cloud (bit 3)
        landsat_scene("s2", 1998, &grid, 0.5, 0.5, 8.0),
        landsat_scene("s1", 1997, &grid, 0.6, 0.2, 0.0),
    ]);

    let pipeline = Pipeline::new(config).unwrap();
    let report = pipeline.run_in_region(&archive, region).unwrap();
    let window = report.window("1997-2002").unwrap();

    assert_eq!(window.composite.band, "NDSI");
    assert_relative_eq!(window.composite.raster.get(5, 5).unwrap(), 0.5, epsilon = 1e-12);

    let series = window.time_series.as_ref().unwrap();
    let ids: Vec<&str> = series.points.iter().map(|p| p.scene_id.as_str()).collect();
    assert_eq!(ids, vec!["s1", "s2", "s3"]);
    assert_relative_eq!(series.points[0].value.unwrap(), 0.5, epsilon = 1e-12);
    assert_eq!(series.points[1].value, None);

    let mut sink = MemorySink::new();
    publish(&report, pipeline.config(), &mut sink).unwrap();
    assert_eq!(sink.exports.len(), 1);
    let (dest, table) = &sink.exports[0];
    assert_eq!(dest.folder, "exports");
    assert_eq!(dest.description, "NDSI_1997_2002");
    assert_eq!(table.len(), 3);
    assert_eq!(table.columns, vec!["scene_id", "date", "NDSI"]);
}

#[test]
fn ndvi_change_between_two_years() {
    let region = Region::rectangle(600_000.0, 4_900_000.0, 600_300.0, 4_900_300.0, CRS::from_epsg(EPSG)).unwrap();
    let grid = region.grid(30.0).unwrap();
    let band = |v: f64| raster_on(&grid, move |_, _| v);
    let ndvi_scene = |id: &str, y: i32, nir: f64, red: f64| {
        scene_at(id, "landsat-c2-l2", y, 7, 1)
            .with_band("nir08", band(nir))
            .unwrap()
            .with_band("red", band(red))
            .unwrap()
            .with_band("qa_pixel", band(0.0))
            .unwrap()
    };

    let mut config = PipelineConfig::preset("ndvi-change").unwrap();
    config.windows.retain(|w| w.label == "1997" || w.label == "2002");
    config.changes = vec![ChangeSpec {
        label: "NDVI change 1997-2002".into(),
        from: "1997".into(),
        to: "2002".into(),
        band: "NDVI_change".into(),
    }];
    assert_eq!(config.reducer, TemporalOp::Mean);

    let archive = InMemoryArchive::with_scenes(vec![
        // 1997 mean NDVI 0.5
        ndvi_scene("a", 1997, 0.6, 0.2),
        ndvi_scene("b", 1997, 0.6, 0.2),
        // 2002 mean NDVI 0.0
        ndvi_scene("c", 2002, 0.3, 0.3),
    ]);

    let pipeline = Pipeline::new(config).unwrap();
    let report = pipeline.run_in_region(&archive, region).unwrap();
    let change = report.change("NDVI change 1997-2002").unwrap();
    assert_eq!(change.composite.band, "NDVI_change");
    assert_relative_eq!(change.summary.mean.unwrap(), -0.5, epsilon = 1e-12);
    assert_eq!(change.composite.scene_count, 3);

    let mut sink = MemorySink::new();
    publish(&report, pipeline.config(), &mut sink).unwrap();
    // year composites are not layers, the change is
    assert!(sink.layer(&layer_name("1997", "NDVI")).is_none());
    assert!(sink.layer(&layer_name("NDVI change 1997-2002", "NDVI_change")).is_some());
    assert_relative_eq!(
        sink.value(&mean_label("NDVI change 1997-2002", "NDVI_change")).unwrap().unwrap(),
        -0.5,
        epsilon = 1e-12
    );
}

fn watershed_service(rect: Rect<f64>) -> InMemoryFeatureService {
    let mut svc = InMemoryFeatureService::new();
    svc.insert(
        "huc8",
        Feature::new(Geometry::Polygon(rect.to_polygon()))
            .with_property("huc8", AttributeValue::String("17090004".into())),
    );
    svc
}

#[test]
fn full_run_from_watershed_and_buffer() {
    let features = watershed_service(Rect::new((-123.0, 43.5), (-121.0, 45.0)));
    let config = PipelineConfig::preset("burn").unwrap();

    // the runner rebuilds the same region; build scenes on its grid
    let rc = &config.region;
    let region = region_for(&features, &rc.watershed, (rc.center[0], rc.center[1]), rc.radius_m, rc.epsg).unwrap();
    let grid = region.grid(config.summary.scale).unwrap();
    let archive = InMemoryArchive::with_scenes(vec![scene_at("hot", "firms", 2003, 8, 1)
        .with_band("T21", raster_on(&grid, |_, _| 320.0))
        .unwrap()]);

    let pipeline = Pipeline::new(config).unwrap();
    let report = pipeline.run(&archive, &features).unwrap();
    assert_eq!(report.region.epsg(), EPSG);
    assert_eq!(report.grid, grid);

    let summary = report.window("post-burn").unwrap().summary.clone().unwrap();
    assert_relative_eq!(summary.mean.unwrap(), 320.0, epsilon = 1e-9);
    // every in-region 1 km pixel is hot: the share is close to 100 %
    let percent = summary.percent_above_threshold.unwrap();
    assert!(percent > 90.0 && percent < 110.0, "percent {percent}");

    // clipped: corner pixels of the bounding grid fall outside the circle
    let composite = &report.window("post-burn").unwrap().composite;
    assert!(composite.raster.get(0, 0).unwrap().is_nan());
}

#[test]
fn unmatched_watershed_aborts_run() {
    let features = watershed_service(Rect::new((-123.0, 43.5), (-121.0, 45.0)));
    let mut config = PipelineConfig::preset("burn").unwrap();
    config.region.watershed = WatershedQuery::new("huc8", "huc8", "17100001");

    let pipeline = Pipeline::new(config).unwrap();
    let result = pipeline.run(&InMemoryArchive::new(), &features);
    assert!(matches!(result, Err(Error::EmptyRegion { .. })));
}

#[test]
fn directory_sink_end_to_end() {
    let region = square_region();
    let grid = region.grid(1000.0).unwrap();
    let archive = InMemoryArchive::with_scenes(vec![scene_at("a", "firms", 2003, 7, 1)
        .with_band("T21", raster_on(&grid, |r, _| 300.0 + r as f64 * 5.0))
        .unwrap()]);

    let pipeline = Pipeline::new(burn_config()).unwrap();
    let report = pipeline.run_in_region(&archive, region).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let mut sink = DirectorySink::new(dir.path()).unwrap();
    publish(&report, pipeline.config(), &mut sink).unwrap();
    let summary_path = sink.write_summary(&report.digest()).unwrap();

    assert!(dir.path().join("layers").join("T21_post-burn.tif").exists());
    assert!(dir.path().join("layers").join("T21_above_315_post-burn.tif").exists());
    assert!(dir.path().join("charts").join("post-burn_T21_histogram.csv").exists());

    let summary: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(summary_path).unwrap()).unwrap();
    assert_eq!(summary["report"]["name"], "burn");
    assert_eq!(summary["report"]["windows"][1]["label"], "post-burn");
    assert_eq!(summary["report"]["windows"][1]["scene_count"], 1);
    // rows 4..9 hold 320..345
    assert_eq!(summary["report"]["windows"][1]["summary"]["threshold_count"], 60);
}
