//! # basinscope cloud
//!
//! Remote collaborators for the basinscope pipeline.
//!
//! - [`StacArchive`]: a scene archive over any STAC API (Planetary Computer,
//!   Earth Search or a custom endpoint). Only the part of each band asset
//!   under the analysis grid is read, via HTTP Range requests against the
//!   (Cloud Optimized) GeoTIFF, then scaled to physical values and resampled
//!   onto the grid.
//! - [`GeoJsonFeatureService`]: watershed and other boundary collections
//!   served as GeoJSON files or URLs.
//!
//! Both implement the seams defined in `basinscope_core::archive`, so the
//! pipeline sees them exactly like the in-memory doubles used in tests.

pub mod cache;
pub mod cog_reader;
pub mod decompress;
pub mod error;
pub mod feature_service;
pub mod geotiff_keys;
pub mod ifd;
pub mod stac_archive;
pub mod stac_client;
pub mod stac_models;
pub mod stac_reader;
pub mod sync_api;
pub mod tile_index;

pub use cache::{TileCache, TileKey};
pub use cog_reader::{CogReader, CogReaderOptions, ImageLayout, RangeSource};
pub use error::{CloudError, Result};
pub use feature_service::{parse_feature_collection, FeatureSource, GeoJsonFeatureService};
pub use stac_archive::StacArchive;
pub use stac_client::{next_page, NextPage, StacCatalog, StacClient, StacClientOptions};
pub use stac_models::{StacAsset, StacItem, StacItemCollection, StacLink, StacSearchParams};
pub use stac_reader::{read_stac_asset, HttpRangeSource};
pub use sync_api::StacClientBlocking;
pub use tile_index::BBox;
