//! Blocking facade over [`StacClient`]
//!
//! The pipeline is synchronous, so the archive drives the async client from
//! a private current-thread runtime.

use tokio::runtime::{Builder, Runtime};

use basinscope_core::Raster;

use crate::cache::TileCache;
use crate::cog_reader::CogReaderOptions;
use crate::error::{CloudError, Result};
use crate::stac_client::{StacCatalog, StacClient, StacClientOptions};
use crate::stac_models::{StacItem, StacItemCollection, StacSearchParams};
use crate::stac_reader::read_stac_asset;
use crate::tile_index::BBox;

pub struct StacClientBlocking {
    rt: Runtime,
    inner: StacClient,
}

impl StacClientBlocking {
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        let rt = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CloudError::Network(format!("starting runtime: {e}")))?;
        Ok(Self {
            rt,
            inner: StacClient::new(catalog, options)?,
        })
    }

    pub fn client(&self) -> &StacClient {
        &self.inner
    }

    pub fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        self.rt.block_on(self.inner.search(params))
    }

    pub fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        self.rt.block_on(self.inner.search_all(params))
    }

    /// Pixels of asset `href` under `bbox`, in the asset's CRS
    pub fn read_asset_window(&self, href: &str, bbox: &BBox, cache: &mut TileCache) -> Result<Raster<f64>> {
        self.rt
            .block_on(read_stac_asset(&self.inner, href, bbox, CogReaderOptions::default(), cache))
    }
}
