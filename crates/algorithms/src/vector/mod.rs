//! Vector geometry for building the analysis region
//!
//! - Buffer: circle polygon around a projected point
//! - Overlay: union, intersection and WGS84 → UTM projection of polygons

mod buffer;
mod overlay;

pub use buffer::{buffer_point, BufferParams};
pub use overlay::{intersect, project_polygons, union_all};
