//! Main Raster type

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, GridSpec, RasterElement};
use ndarray::{Array2, Zip};

/// A georeferenced 2D raster grid.
///
/// `Raster<T>` stores values of type `T` in a 2D grid with its geotransform
/// and the EPSG code of its CRS. `NaN` marks "no data" in every raster; the
/// no-data value of a source file is translated to `NaN` when it is read.
///
/// # Example
///
/// ```ignore
/// use basinscope_core::Raster;
///
/// let mut raster: Raster<f64> = Raster::filled(100, 100, 0.0);
/// raster.set(10, 20, 42.0)?;
/// let value = raster.get(10, 20)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T: RasterElement = f64> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    /// Affine transformation
    transform: GeoTransform,
    /// EPSG code of the coordinate reference system
    epsg: Option<u32>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster where every cell is no-data
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::filled(rows, cols, T::nodata())
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            data: Array2::from_elem((rows, cols), value),
            transform: GeoTransform::default(),
            epsg: None,
        }
    }

    /// Create an all-no-data raster on an analysis grid
    pub fn on_grid(grid: &GridSpec) -> Self {
        Self {
            data: Array2::from_elem(grid.shape(), T::nodata()),
            transform: grid.transform,
            epsg: Some(grid.epsg),
        }
    }

    /// Create a raster from existing data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let data = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self {
            data,
            transform: GeoTransform::default(),
            epsg: None,
        })
    }

    /// Replace the data, keeping georeferencing
    pub fn with_data(&self, data: Array2<T>) -> Result<Self> {
        if data.dim() != self.data.dim() {
            let (ar, ac) = data.dim();
            return Err(Error::SizeMismatch {
                er: self.rows(),
                ec: self.cols(),
                ar,
                ac,
            });
        }
        Ok(Self {
            data,
            transform: self.transform,
            epsg: self.epsg,
        })
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> T {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// EPSG code of the CRS, if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Set the EPSG code
    pub fn set_epsg(&mut self, epsg: Option<u32>) {
        self.epsg = epsg;
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Grid this raster lives on. Rasters without a CRS report EPSG 0.
    pub fn grid(&self) -> GridSpec {
        GridSpec::new(self.transform, self.rows(), self.cols(), self.epsg.unwrap_or(0))
    }

    /// Error unless `other` has the same shape as `self`
    pub fn check_same_shape<U: RasterElement>(&self, other: &Raster<U>) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::SizeMismatch {
                er: self.rows(),
                ec: self.cols(),
                ar: other.rows(),
                ac: other.cols(),
            });
        }
        Ok(())
    }

    /// Number of cells holding a value
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_valid()).count()
    }

    /// Set every cell where `keep` is false to no-data
    pub fn mask_with(&mut self, keep: &Array2<bool>) -> Result<()> {
        if keep.dim() != self.data.dim() {
            let (ar, ac) = keep.dim();
            return Err(Error::SizeMismatch {
                er: self.rows(),
                ec: self.cols(),
                ar,
                ac,
            });
        }
        Zip::from(&mut self.data).and(keep).for_each(|v, &k| {
            if !k {
                *v = T::nodata();
            }
        });
        Ok(())
    }

    /// Resample onto `grid` by nearest neighbour.
    ///
    /// Target cells whose center falls outside this raster are no-data.
    /// Both rasters must be in the same CRS; a raster without an EPSG code
    /// is assumed to be in the grid's CRS.
    pub fn warp_nearest(&self, grid: &GridSpec) -> Result<Self> {
        if let Some(epsg) = self.epsg {
            if epsg != grid.epsg {
                return Err(Error::CrsMismatch(epsg, grid.epsg));
            }
        }

        let mut out = Array2::from_elem(grid.shape(), T::nodata());
        for ((row, col), cell) in out.indexed_iter_mut() {
            let (x, y) = grid.cell_center(row, col);
            if let Some((src_row, src_col)) =
                self.transform.cell_at(x, y, self.rows(), self.cols())
            {
                *cell = self.data[(src_row, src_col)];
            }
        }

        Ok(Self {
            data: out,
            transform: grid.transform,
            epsg: Some(grid.epsg),
        })
    }

    // Statistics

    /// Calculate basic statistics (min, max, mean, count of valid cells)
    pub fn statistics(&self) -> RasterStatistics {
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;
        let mut sum: f64 = 0.0;
        let mut count: usize = 0;

        for &value in self.data.iter() {
            if value.is_nodata() {
                continue;
            }
            let v = value.as_f64();
            min = Some(min.map_or(v, |m| m.min(v)));
            max = Some(max.map_or(v, |m| m.max(v)));
            sum += v;
            count += 1;
        }

        let mean = (count > 0).then(|| sum / count as f64);

        RasterStatistics {
            min,
            max,
            mean,
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone, PartialEq)]
pub struct RasterStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}
