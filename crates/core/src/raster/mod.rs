//! Raster data structures and operations

mod element;
mod footprint;
mod geotransform;
mod grid;

pub use element::RasterElement;
pub use footprint::GridSpec;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
