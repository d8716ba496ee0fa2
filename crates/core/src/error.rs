//! Error types for basinscope

use thiserror::Error;

/// Main error type for basinscope operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("CRS mismatch: EPSG:{0} vs EPSG:{1}")]
    CrsMismatch(u32, u32),

    #[error("Unsupported CRS: EPSG:{0}")]
    UnsupportedCrs(u32),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("No region: {collection} has no feature with {field} = {value}")]
    EmptyRegion {
        collection: String,
        field: String,
        value: String,
    },

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Band '{band}' not present in scene '{scene}'")]
    MissingBand { scene: String, band: String },

    #[error("Invalid date range: {start} .. {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Remote service failure: {0}")]
    RemoteService(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for basinscope operations
pub type Result<T> = std::result::Result<T, Error>;
