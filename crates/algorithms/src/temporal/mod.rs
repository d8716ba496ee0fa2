//! Temporal reduction of scene sequences into composites

mod composite;
mod sequence;

pub use composite::{clip_to_region, difference, reduce, Composite, TemporalOp};
pub use sequence::map_scenes;
