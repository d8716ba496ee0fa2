//! Quality-bit pixel masking
//!
//! Landsat Collection 2 and similar products pack per-pixel quality flags
//! into an integer band. A [`QaMask`] names that band and a set of bit
//! tests; a pixel is kept only when every test holds. Pixels that fail are
//! set to no-data in every band of the scene, the QA band included, which
//! makes masking idempotent.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::maybe_rayon::*;
use basinscope_core::{Error, Result, Scene};

/// Landsat C2 `QA_PIXEL` bit positions
pub mod landsat_c2 {
    pub const DILATED_CLOUD: u8 = 1;
    pub const CIRRUS: u8 = 2;
    pub const CLOUD: u8 = 3;
    pub const CLOUD_SHADOW: u8 = 4;
    pub const SNOW: u8 = 5;
    pub const CLEAR: u8 = 6;
    pub const WATER: u8 = 7;
}

/// One bit of the packed QA word and the value it must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitTest {
    pub bit: u8,
    pub set: bool,
}

impl BitTest {
    /// Require the bit to be 0
    pub fn clear(bit: u8) -> Self {
        Self { bit, set: false }
    }

    /// Require the bit to be 1
    pub fn set(bit: u8) -> Self {
        Self { bit, set: true }
    }

    #[inline]
    fn holds(&self, word: u32) -> bool {
        ((word >> self.bit) & 1 == 1) == self.set
    }
}

/// QA band name plus the bit tests every kept pixel must pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaMask {
    pub band: String,
    pub tests: Vec<BitTest>,
}

impl QaMask {
    pub fn new(band: impl Into<String>, tests: Vec<BitTest>) -> Result<Self> {
        let mask = Self {
            band: band.into(),
            tests,
        };
        mask.validate()?;
        Ok(mask)
    }

    /// Require every listed bit to be clear
    pub fn all_clear(band: impl Into<String>, bits: &[u8]) -> Result<Self> {
        Self::new(band, bits.iter().map(|&b| BitTest::clear(b)).collect())
    }

    /// Bit positions must address a 32-bit word
    pub fn validate(&self) -> Result<()> {
        if let Some(bad) = self.tests.iter().find(|t| t.bit >= 32) {
            return Err(Error::InvalidParameter {
                name: "bit",
                value: bad.bit.to_string(),
                reason: "QA words are 32 bits wide".into(),
            });
        }
        Ok(())
    }

    /// Whether a QA value passes every test. No-data never passes.
    pub fn passes(&self, qa: f64) -> bool {
        if !qa.is_finite() || qa < 0.0 {
            return false;
        }
        let word = qa as u32;
        self.tests.iter().all(|t| t.holds(word))
    }
}

/// Keep-mask for one scene: `true` where the QA value passes
pub fn qa_keep_mask(scene: &Scene, mask: &QaMask) -> Result<Array2<bool>> {
    mask.validate()?;
    let qa = scene.band(&mask.band)?;
    let (rows, cols) = qa.shape();

    let keep: Vec<bool> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| mask.passes(unsafe { qa.get_unchecked(row, col) }))
                .collect::<Vec<_>>()
        })
        .collect();

    Array2::from_shape_vec((rows, cols), keep).map_err(|e| Error::Other(e.to_string()))
}

/// Null every band of `scene` where the QA tests fail.
///
/// Returns a new scene; the input is untouched.
pub fn mask_scene(scene: &Scene, mask: &QaMask) -> Result<Scene> {
    let keep = qa_keep_mask(scene, mask)?;
    let mut out = scene.clone();
    for (_, band) in out.bands_mut() {
        band.mask_with(&keep)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use basinscope_core::{GeoTransform, Raster};
    use chrono::{TimeZone, Utc};

    fn make_band(values: Vec<f64>) -> Raster<f64> {
        let mut r = Raster::from_vec(values, 2, 2).unwrap();
        r.set_transform(GeoTransform::new(0.0, 60.0, 30.0, -30.0));
        r
    }

    fn landsat_scene(qa: Vec<f64>) -> Scene {
        Scene::new("LT05_X", "landsat-c2-l2", Utc.with_ymd_and_hms(1990, 7, 4, 18, 0, 0).unwrap())
            .with_band("green", make_band(vec![0.3, 0.3, 0.3, 0.3]))
            .unwrap()
            .with_band("qa_pixel", make_band(qa))
            .unwrap()
    }

    fn clear_sky() -> QaMask {
        QaMask::all_clear("qa_pixel", &[3, 4, 5, 6]).unwrap()
    }

    #[test]
    fn test_bit_tests() {
        let mask = clear_sky();
        // 21824 = 0b0101_0101_0100_0000: bit 6 set (clear flag)
        assert!(!mask.passes(21824.0));
        assert!(mask.passes(0.0));
        assert!(!mask.passes(8.0)); // cloud
        assert!(!mask.passes(16.0)); // shadow
        assert!(mask.passes(128.0)); // water bit 7 not tested
        assert!(!mask.passes(f64::NAN));
    }

    #[test]
    fn test_required_set_bit() {
        let mask = QaMask::new("qa", vec![BitTest::set(landsat_c2::CLEAR)]).unwrap();
        assert!(mask.passes(64.0));
        assert!(!mask.passes(0.0));
    }

    #[test]
    fn test_failing_pixels_null_every_band() {
        let scene = landsat_scene(vec![0.0, 8.0, f64::NAN, 1.0]);
        let masked = mask_scene(&scene, &clear_sky()).unwrap();

        let green = masked.band("green").unwrap();
        assert_eq!(green.get(0, 0).unwrap(), 0.3);
        assert!(green.get(0, 1).unwrap().is_nan());
        assert!(green.get(1, 0).unwrap().is_nan());
        assert_eq!(green.get(1, 1).unwrap(), 0.3);

        let qa = masked.band("qa_pixel").unwrap();
        assert!(qa.get(0, 1).unwrap().is_nan());

        // Input untouched
        assert_eq!(scene.band("green").unwrap().valid_count(), 4);
    }

    #[test]
    fn test_masking_is_idempotent() {
        let scene = landsat_scene(vec![0.0, 8.0, 32.0, 64.0]);
        let once = mask_scene(&scene, &clear_sky()).unwrap();
        let twice = mask_scene(&once, &clear_sky()).unwrap();
        for (name, band) in once.bands() {
            let again = twice.band(name).unwrap();
            for (a, b) in band.data().iter().zip(again.data().iter()) {
                assert!(a == b || (a.is_nan() && b.is_nan()));
            }
        }
    }

    #[test]
    fn test_missing_qa_band() {
        let scene = landsat_scene(vec![0.0; 4]);
        let mask = QaMask::all_clear("QA_PIXEL", &[3]).unwrap();
        assert!(matches!(mask_scene(&scene, &mask), Err(Error::MissingBand { .. })));
    }

    #[test]
    fn test_bit_out_of_range() {
        assert!(QaMask::all_clear("qa", &[32]).is_err());
    }
}
