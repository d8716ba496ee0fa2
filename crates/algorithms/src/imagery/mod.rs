//! Per-scene imagery stages
//!
//! - QA masking: null pixels whose packed quality bits fail a test
//! - Indices: normalized difference or band pass-through

mod indices;
mod qa_mask;

pub use indices::{compute_index, ndsi, ndvi, normalized_difference, IndexSpec, ZERO_SUM_EPSILON};
pub use qa_mask::{landsat_c2, mask_scene, qa_keep_mask, BitTest, QaMask};
