//! Per-scene transforms over a sequence

use crate::maybe_rayon::*;
use basinscope_core::{Result, Scene, SceneSequence};

/// Apply `f` to every scene, in parallel when enabled.
///
/// Output keeps input order. The first error aborts the whole map.
pub fn map_scenes<F>(scenes: &SceneSequence, f: F) -> Result<SceneSequence>
where
    F: Fn(&Scene) -> Result<Scene> + Sync + Send,
{
    let out = scenes.scenes().par_iter().map(f).collect::<Result<Vec<_>>>()?;
    Ok(SceneSequence::new(out))
}
