//! Normalized-difference indices and band pass-through
//!
//! Index computation appends one derived band to a scene. NDSI and NDVI are
//! both `(a - b) / (a + b)` over two reflectance bands; burn severity uses
//! the brightness temperature band as-is.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::maybe_rayon::*;
use basinscope_core::raster::Raster;
use basinscope_core::{Error, Result, Scene};

/// Sums closer to zero than this are treated as a zero denominator
pub const ZERO_SUM_EPSILON: f64 = 1e-10;

/// How a scene's index band is derived
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexSpec {
    /// `(a - b) / (a + b)` written to `name`
    NormalizedDifference { a: String, b: String, name: String },
    /// Copy of `source` written to `name`
    Band { source: String, name: String },
}

impl IndexSpec {
    pub fn normalized_difference(a: impl Into<String>, b: impl Into<String>, name: impl Into<String>) -> Self {
        IndexSpec::NormalizedDifference {
            a: a.into(),
            b: b.into(),
            name: name.into(),
        }
    }

    pub fn band(source: impl Into<String>, name: impl Into<String>) -> Self {
        IndexSpec::Band {
            source: source.into(),
            name: name.into(),
        }
    }

    /// Name of the output band
    pub fn output(&self) -> &str {
        match self {
            IndexSpec::NormalizedDifference { name, .. } | IndexSpec::Band { name, .. } => name,
        }
    }

    /// Bands the index reads
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            IndexSpec::NormalizedDifference { a, b, .. } => vec![a.as_str(), b.as_str()],
            IndexSpec::Band { source, .. } => vec![source.as_str()],
        }
    }
}

/// NDSI (Green, SWIR1)
pub fn ndsi(green: impl Into<String>, swir: impl Into<String>) -> IndexSpec {
    IndexSpec::normalized_difference(green, swir, "NDSI")
}

/// NDVI (NIR, Red)
pub fn ndvi(nir: impl Into<String>, red: impl Into<String>) -> IndexSpec {
    IndexSpec::normalized_difference(nir, red, "NDVI")
}

/// Compute the normalized difference between two bands:
///
/// `(band_a - band_b) / (band_a + band_b)`
///
/// Pixels where either band is no-data, or where the sum is zero, are
/// no-data in the output.
pub fn normalized_difference(band_a: &Raster<f64>, band_b: &Raster<f64>) -> Result<Raster<f64>> {
    band_a.check_same_shape(band_b)?;

    let (rows, cols) = band_a.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let a = unsafe { band_a.get_unchecked(row, col) };
                let b = unsafe { band_b.get_unchecked(row, col) };

                if a.is_nan() || b.is_nan() {
                    continue;
                }

                let sum = a + b;
                if sum.abs() < ZERO_SUM_EPSILON {
                    continue;
                }

                *out = (a - b) / sum;
            }
            row_data
        })
        .collect();

    build_output(band_a, rows, cols, data)
}

/// Append the index band described by `spec` to a copy of `scene`
pub fn compute_index(scene: &Scene, spec: &IndexSpec) -> Result<Scene> {
    let derived = match spec {
        IndexSpec::NormalizedDifference { a, b, .. } => {
            normalized_difference(scene.band(a)?, scene.band(b)?)?
        }
        IndexSpec::Band { source, .. } => scene.band(source)?.clone(),
    };
    scene.clone().with_band(spec.output(), derived)
}

fn build_output(template: &Raster<f64>, rows: usize, cols: usize, data: Vec<f64>) -> Result<Raster<f64>> {
    let array = Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;
    template.with_data(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use basinscope_core::GeoTransform;
    use chrono::{TimeZone, Utc};

    fn make_band(rows: usize, cols: usize, value: f64) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, value);
        r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        r
    }

    fn make_scene() -> Scene {
        Scene::new("s", "ds", Utc.with_ymd_and_hms(2003, 1, 15, 0, 0, 0).unwrap())
            .with_band("green", make_band(3, 3, 0.6))
            .unwrap()
            .with_band("swir16", make_band(3, 3, 0.2))
            .unwrap()
    }

    #[test]
    fn test_normalized_difference_basic() {
        let a = make_band(5, 5, 0.8);
        let b = make_band(5, 5, 0.2);
        let result = normalized_difference(&a, &b).unwrap();
        // (0.8 - 0.2) / (0.8 + 0.2) = 0.6
        assert_relative_eq!(result.get(2, 2).unwrap(), 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_equal_bands_give_zero() {
        let a = make_band(2, 2, 0.37);
        let result = normalized_difference(&a, &a).unwrap();
        assert!(result.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_zero_sum_is_nodata() {
        let a = make_band(2, 2, 0.5);
        let b = make_band(2, 2, -0.5);
        let result = normalized_difference(&a, &b).unwrap();
        assert_eq!(result.valid_count(), 0);

        let zeros = make_band(2, 2, 0.0);
        assert_eq!(normalized_difference(&zeros, &zeros).unwrap().valid_count(), 0);
    }

    #[test]
    fn test_nodata_propagates() {
        let a = make_band(2, 2, 0.5);
        let mut b = make_band(2, 2, 0.1);
        b.set(1, 1, f64::NAN).unwrap();
        let result = normalized_difference(&a, &b).unwrap();
        assert!(result.get(1, 1).unwrap().is_nan());
        assert_eq!(result.valid_count(), 3);
    }

    #[test]
    fn test_size_mismatch() {
        let a = make_band(2, 2, 0.5);
        let b = make_band(3, 2, 0.5);
        assert!(matches!(
            normalized_difference(&a, &b),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_compute_index_appends_band() {
        let scene = make_scene();
        let out = compute_index(&scene, &ndsi("green", "swir16")).unwrap();
        assert!(out.has_band("NDSI"));
        assert!(out.has_band("green"));
        assert_relative_eq!(out.band("NDSI").unwrap().get(0, 0).unwrap(), 0.5, epsilon = 1e-12);
        assert!(!scene.has_band("NDSI"));
    }

    #[test]
    fn test_band_pass_through() {
        let scene = make_scene();
        let out = compute_index(&scene, &IndexSpec::band("green", "T21")).unwrap();
        assert_eq!(out.band("T21").unwrap(), out.band("green").unwrap());
    }

    #[test]
    fn test_missing_input_band() {
        let scene = make_scene();
        assert!(matches!(
            compute_index(&scene, &ndvi("nir08", "red")),
            Err(Error::MissingBand { .. })
        ));
    }

    #[test]
    fn test_spec_inputs_and_output() {
        let spec = ndvi("nir08", "red");
        assert_eq!(spec.output(), "NDVI");
        assert_eq!(spec.inputs(), vec!["nir08", "red"]);
        assert_eq!(IndexSpec::band("T21", "T21").inputs(), vec!["T21"]);
    }
}
