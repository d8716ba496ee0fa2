//! Raster element trait for cell values

use num_traits::{Float, NumCast};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Rasters in basinscope carry reflectance, brightness temperature, packed
/// QA integers and derived indices. All of them are held as floating point
/// so that `NaN` can serve as the single "no data" marker; QA words fit
/// exactly in the mantissa of both `f32` (up to 24 bits) and `f64`.
pub trait RasterElement:
    Float + Copy + Clone + Debug + PartialOrd + NumCast + Send + Sync + 'static
{
    /// The no-data marker for this type
    fn nodata() -> Self {
        Self::nan()
    }

    /// Check if this value represents no-data
    fn is_nodata(&self) -> bool {
        self.is_nan()
    }

    /// Whether this cell holds a usable value
    fn is_valid(&self) -> bool {
        !self.is_nodata()
    }

    /// Convert from f64, mapping unrepresentable values to no-data
    fn from_f64(value: f64) -> Self {
        NumCast::from(value).unwrap_or_else(Self::nodata)
    }

    /// Convert self to f64
    fn as_f64(self) -> f64 {
        NumCast::from(self).unwrap_or(f64::NAN)
    }
}

impl RasterElement for f32 {}
impl RasterElement for f64 {}
