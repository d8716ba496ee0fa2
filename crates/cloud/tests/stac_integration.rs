//! Integration tests against live catalogs.
//!
//! Tests marked `#[ignore]` require network access.
//! Run with: `cargo test -p basinscope-cloud -- --ignored stac`

use basinscope_cloud::{
    read_stac_asset, BBox, CogReaderOptions, StacArchive, StacCatalog, StacClient, StacClientOptions,
    StacSearchParams, TileCache,
};
use basinscope_core::{ArchiveClient, DateRange, GeoTransform, GridSpec, SceneQuery};

/// Landsat 5 over Upper Klamath Lake, summer 1995.
#[tokio::test]
#[ignore]
async fn stac_planetary_computer_landsat() {
    let client = StacClient::new(StacCatalog::PlanetaryComputer, StacClientOptions::default())
        .expect("failed to create client");

    let params = StacSearchParams::new()
        .bbox(-122.0, 42.3, -121.8, 42.5)
        .datetime("1995-07-01/1995-08-31")
        .collections(&["landsat-c2-l2"])
        .property_eq("platform", "landsat-5")
        .limit(5);

    let results = client.search(&params).await.expect("search failed");
    assert!(!results.is_empty(), "should find at least one item");

    for item in &results.features {
        assert!(item.acquired().is_some());
        assert_eq!(item.property_text("platform").as_deref(), Some("landsat-5"));
        assert!(item.asset("qa_pixel").is_some());
    }
}

#[tokio::test]
#[ignore]
async fn stac_planetary_computer_signing() {
    let client = StacClient::new(StacCatalog::PlanetaryComputer, StacClientOptions::default())
        .expect("failed to create client");

    let params = StacSearchParams::new()
        .bbox(-122.0, 42.3, -121.8, 42.5)
        .datetime("1995-07-01/1995-08-31")
        .collections(&["landsat-c2-l2"])
        .limit(1);
    let results = client.search(&params).await.expect("search failed");
    let item = results.features.first().expect("no items");
    let href = &item.asset("green").expect("no green asset").href;

    let signed = client.sign_asset_href(href).await.expect("signing failed");
    assert!(signed.starts_with(href.as_str()));
    assert!(signed.contains("sig="), "signed URL should carry a SAS token");
}

/// A 1.5 km window of one Landsat band, read with range requests.
#[tokio::test]
#[ignore]
async fn stac_windowed_asset_read() {
    let client = StacClient::new(StacCatalog::PlanetaryComputer, StacClientOptions::default())
        .expect("failed to create client");

    let params = StacSearchParams::new()
        .bbox(-122.0, 42.3, -121.8, 42.5)
        .datetime("1995-07-01/1995-08-31")
        .collections(&["landsat-c2-l2"])
        .limit(1);
    let results = client.search(&params).await.expect("search failed");
    let item = results.features.first().expect("no items");
    assert_eq!(item.epsg(), Some(32610));
    let href = &item.asset("qa_pixel").expect("no qa_pixel asset").href;

    let bbox = BBox::new(584_000.0, 4_698_500.0, 585_500.0, 4_700_000.0);
    let mut cache = TileCache::default();
    let raster = read_stac_asset(&client, href, &bbox, CogReaderOptions::default(), &mut cache)
        .await
        .expect("window read failed");

    // 50 cells, one more when the window straddles pixel edges
    let (rows, cols) = raster.shape();
    assert!((50..=51).contains(&rows) && (50..=51).contains(&cols));
    assert_eq!(raster.epsg(), Some(32610));
    assert!(!cache.is_empty());
}

/// Full archive query: one small grid, one month, two bands.
#[test]
#[ignore]
fn stac_archive_lists_scenes_on_grid() {
    let archive = StacArchive::new(StacCatalog::PlanetaryComputer, StacClientOptions::default())
        .expect("failed to create archive");

    let grid = GridSpec::new(GeoTransform::new(584_000.0, 4_700_000.0, 30.0, -30.0), 50, 50, 32610);
    let query = SceneQuery::new(
        "landsat-c2-l2",
        DateRange::parse("1995-08-01", "1995-09-01").unwrap(),
        grid,
        vec!["green".into(), "qa_pixel".into()],
    )
    .with_property("platform", "landsat-5");

    let scenes = archive.list_scenes(&query).expect("archive query failed");
    for scene in scenes.iter() {
        assert_eq!(scene.band("green").unwrap().grid(), grid);
        assert!(query.dates.contains(&scene.acquired));
    }
}
