//! Error types for the STAC archive and feature service.

use thiserror::Error;

/// Errors produced while talking to remote catalogs.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("malformed response: {0}")]
    InvalidResponse(String),

    #[error("asset '{asset}' not found in item '{item}'")]
    MissingAsset { item: String, asset: String },

    #[error("unknown feature collection '{0}'")]
    UnknownCollection(String),

    #[error("invalid TIFF: {0}")]
    InvalidTiff(String),

    #[error("unsupported TIFF layout: {0}")]
    UnsupportedLayout(String),

    #[error("unsupported TIFF compression: {0}")]
    UnsupportedCompression(u16),

    #[error("unsupported sample type: {bits_per_sample} bits, format {sample_format}")]
    UnsupportedDataType { bits_per_sample: u16, sample_format: u16 },

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("server ignored range request for {0}")]
    RangeNotSupported(String),

    #[error("bounding box does not intersect the image")]
    BBoxOutside,

    #[error("core error: {0}")]
    Core(#[from] basinscope_core::Error),
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;

impl From<CloudError> for basinscope_core::Error {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::Core(inner) => inner,
            other => basinscope_core::Error::RemoteService(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_errors_become_remote_service_failures() {
        let err: basinscope_core::Error = CloudError::Network("timed out".into()).into();
        assert!(matches!(err, basinscope_core::Error::RemoteService(msg) if msg.contains("timed out")));
    }

    #[test]
    fn core_errors_pass_through() {
        let core = basinscope_core::Error::MissingBand {
            scene: "s".into(),
            band: "red".into(),
        };
        let err: basinscope_core::Error = CloudError::Core(core).into();
        assert!(matches!(err, basinscope_core::Error::MissingBand { .. }));
    }
}
