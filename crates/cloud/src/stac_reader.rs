//! Bridge between STAC assets and the windowed GeoTIFF reader.

use std::future::Future;

use basinscope_core::Raster;

use crate::cache::TileCache;
use crate::cog_reader::{CogReader, CogReaderOptions, RangeSource};
use crate::error::Result;
use crate::stac_client::StacClient;
use crate::tile_index::BBox;

/// Range reads of one asset through the catalog's HTTP client.
pub struct HttpRangeSource<'a> {
    client: &'a StacClient,
    url: String,
    href: String,
}

impl<'a> HttpRangeSource<'a> {
    /// `url` is what gets fetched (possibly signed); `href` names the asset.
    pub fn new(client: &'a StacClient, url: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            href: href.into(),
        }
    }
}

impl RangeSource for HttpRangeSource<'_> {
    fn id(&self) -> &str {
        &self.href
    }

    fn read_range(&self, offset: u64, length: u64) -> impl Future<Output = Result<Vec<u8>>> {
        self.client.fetch_range(&self.url, offset, length)
    }
}

/// Read the part of an asset under `bbox` (asset CRS).
///
/// Signs the href when the catalog needs it, opens the GeoTIFF and reads the
/// blocks covering `bbox`, reusing any already in `cache`.
pub async fn read_stac_asset(
    client: &StacClient,
    href: &str,
    bbox: &BBox,
    options: CogReaderOptions,
    cache: &mut TileCache,
) -> Result<Raster<f64>> {
    let url = client.sign_asset_href(href).await?;
    let reader = CogReader::open(HttpRangeSource::new(client, url, href), options).await?;
    reader.read_bbox(bbox, cache).await
}
