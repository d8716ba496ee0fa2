//! [`ArchiveClient`] over a STAC catalog.
//!
//! A query becomes one paginated item search (bbox in WGS84, closed datetime
//! interval, collection = dataset, property filters through the query
//! extension). For each item only the part of every requested band asset
//! under the query grid is read, through HTTP Range requests, then converted
//! to physical values and resampled onto the grid. Decoded blocks are kept in
//! an LRU cache shared by all reads of the archive.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use basinscope_core::{ArchiveClient, Raster, Scene, SceneQuery, SceneSequence, CRS};

use crate::cache::TileCache;
use crate::error::{CloudError, Result};
use crate::stac_client::{StacCatalog, StacClientOptions};
use crate::stac_models::{StacAsset, StacItem, StacSearchParams};
use crate::sync_api::StacClientBlocking;
use crate::tile_index::BBox;

/// Items requested per search page
const PAGE_SIZE: u32 = 100;

/// Scene archive backed by a STAC API.
pub struct StacArchive {
    client: StacClientBlocking,
    cache: Mutex<TileCache>,
}

impl StacArchive {
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        Ok(StacClientBlocking::new(catalog, options)?.into())
    }

    /// Replace the block cache with one holding `capacity` blocks
    pub fn with_cache_capacity(self, capacity: usize) -> Self {
        Self {
            cache: Mutex::new(TileCache::new(capacity)),
            ..self
        }
    }

    /// Search request for `query`
    pub fn search_params(query: &SceneQuery) -> Result<StacSearchParams> {
        let crs = CRS::from_epsg(query.grid.epsg);
        let (west, south, east, north) = crs.bounds_to_wgs84(query.bounds())?;
        let mut params = StacSearchParams::new()
            .bbox(west, south, east, north)
            .date_range(&query.dates)
            .collections(&[query.dataset.as_str()])
            .limit(PAGE_SIZE);
        for (key, value) in &query.properties {
            params = params.property_eq(key, value);
        }
        Ok(params)
    }

    /// Build one scene from an item, or `None` when it cannot serve the query
    fn load_item(&self, item: &StacItem, query: &SceneQuery) -> Result<Option<Scene>> {
        let Some(acquired) = item.acquired() else {
            warn!(item = %item.id, "item has no parseable datetime, skipped");
            return Ok(None);
        };
        if !query.dates.contains(&acquired) {
            return Ok(None);
        }
        // Catalogs without the query extension ignore property filters
        if !item_matches(item, query) {
            debug!(item = %item.id, "item fails property filter, skipped");
            return Ok(None);
        }

        if let Some(epsg) = item.epsg().filter(|&e| e != query.grid.epsg) {
            warn!(
                item = %item.id,
                native = epsg,
                requested = query.grid.epsg,
                "item CRS differs from the analysis grid, scene skipped"
            );
            return Ok(None);
        }

        let bbox = BBox::from(query.bounds());
        let mut scene = Scene::new(item.id.clone(), query.dataset.clone(), acquired);
        for band in &query.bands {
            let Some(asset) = item.asset(band) else {
                warn!(item = %item.id, band, "item lacks requested band asset, skipped");
                return Ok(None);
            };
            let raster = match self.load_asset(asset, &bbox) {
                Ok(raster) => raster,
                Err(CloudError::BBoxOutside) => {
                    debug!(item = %item.id, band, "asset does not cover the grid, skipped");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            let epsg = raster.epsg().unwrap_or(query.grid.epsg);
            if epsg != query.grid.epsg {
                warn!(
                    item = %item.id,
                    band,
                    native = epsg,
                    requested = query.grid.epsg,
                    "asset CRS differs from the analysis grid, scene skipped"
                );
                return Ok(None);
            }

            let aligned = if raster.grid() == query.grid {
                raster
            } else {
                raster.warp_nearest(&query.grid)?
            };
            scene.insert_band(band.clone(), aligned)?;
        }
        Ok(Some(scene))
    }

    /// Window of `asset` under `bbox`, in physical units
    fn load_asset(&self, asset: &StacAsset, bbox: &BBox) -> Result<Raster<f64>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let mut raster = self.client.read_asset_window(&asset.href, bbox, &mut cache)?;
        apply_raster_bands(&mut raster, asset);
        Ok(raster)
    }
}

/// Turn digital numbers into physical values.
///
/// The declared no-data value becomes NaN before scaling.
pub fn apply_raster_bands(raster: &mut Raster<f64>, asset: &StacAsset) {
    let nodata = asset.nodata();
    let (scale, offset) = asset.scale_offset();
    raster.data_mut().mapv_inplace(|v| {
        if v.is_nan() || nodata.is_some_and(|nd| v == nd) {
            f64::NAN
        } else {
            v * scale + offset
        }
    });
}

fn item_matches(item: &StacItem, query: &SceneQuery) -> bool {
    query
        .properties
        .iter()
        .all(|(key, value)| item.property_text(key).is_some_and(|v| &v == value))
}

impl ArchiveClient for StacArchive {
    fn list_scenes(&self, query: &SceneQuery) -> basinscope_core::Result<SceneSequence> {
        let params = Self::search_params(query)?;
        let items = self.client.search_all(&params)?;
        info!(dataset = %query.dataset, dates = %query.dates, items = items.len(), "STAC search");

        let mut scenes = Vec::with_capacity(items.len());
        for item in &items {
            if let Some(scene) = self.load_item(item, query)? {
                scenes.push(scene);
            }
        }

        debug!(dataset = %query.dataset, scenes = scenes.len(), "scenes loaded");
        Ok(SceneSequence::new(scenes))
    }
}

impl From<StacClientBlocking> for StacArchive {
    fn from(client: StacClientBlocking) -> Self {
        Self {
            client,
            cache: Mutex::new(TileCache::default()),
        }
    }
}
