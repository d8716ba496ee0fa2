//! # basinscope core
//!
//! Core types for region-scoped remote-sensing index analysis.
//!
//! This crate provides:
//! - `Raster<f64>`: georeferenced grid with `NaN` as the no-data marker
//! - `GeoTransform` / `GridSpec`: pixel ↔ map coordinates and analysis footprints
//! - `CRS`: EPSG handling and WGS84 → UTM projection
//! - `Region`: the immutable analysis polygon
//! - `Scene` / `SceneSequence`: timestamped multi-band observations
//! - `ArchiveClient` / `FeatureService`: the seams to remote collaborators
//! - GeoTIFF I/O

pub mod archive;
pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod region;
pub mod scene;
pub mod vector;

pub use archive::{
    ArchiveClient, FeatureFilter, FeatureService, InMemoryArchive, InMemoryFeatureService, SceneQuery,
};
pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, GridSpec, Raster, RasterElement};
pub use region::Region;
pub use scene::{DateRange, Scene, SceneSequence};
pub use vector::{AttributeValue, Feature, FeatureCollection};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::archive::{ArchiveClient, FeatureFilter, FeatureService, SceneQuery};
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, GridSpec, Raster, RasterElement};
    pub use crate::region::Region;
    pub use crate::scene::{DateRange, Scene, SceneSequence};
}
