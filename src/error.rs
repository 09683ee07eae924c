use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GribError>;

/// Error taxonomy of the conversion pipeline.
///
/// Malformed input data (`NotARaster`, `InconsistentGrid`, `TimeParse`,
/// `MissingMetadata`), bad configuration (`InvalidSetting`,
/// `SettingsNotReady`) and unusable reprojection output
/// (`InvalidProjection`) are fatal and always name the offending value.
/// `Transient` covers network/filesystem failures during fetch,
/// decompression and archive writing; these are retryable by re-invoking
/// the same operation, which the sentinel-marker protocol keeps idempotent.
/// [`GribError::is_transient`] is the single switch retry loops need.
#[derive(Debug, Error)]
pub enum GribError {
    #[error("not a GRIB raster at {path}: {reason}")]
    NotARaster { path: PathBuf, reason: String },

    #[error("band {band} is inconsistent with band 0: expected {expected}, found {found}")]
    InconsistentGrid {
        band: usize,
        expected: String,
        found: String,
    },

    #[error("could not parse reference time {raw:?} of band {band}")]
    TimeParse { band: usize, raw: String },

    #[error("metadata key {key:?} missing in band {band}")]
    MissingMetadata { key: String, band: usize },

    #[error("invalid setting {value:?}; allowed: {allowed}")]
    InvalidSetting { value: String, allowed: String },

    #[error("settings not ready; missing: {missing}")]
    SettingsNotReady { missing: String },

    #[error("reprojection produced {count} non-finite coordinates out of {total}")]
    InvalidProjection { count: usize, total: usize },

    #[error("no file names ending in {ext:?} found at {url}")]
    EmptyListing { url: String, ext: String },

    #[error(transparent)]
    Transient(#[from] TransientError),

    #[error(transparent)]
    Gdal(#[from] gdal::errors::GdalError),

    #[error(transparent)]
    Netcdf(#[from] netcdf::Error),
}

/// Retryable network and filesystem failures.
#[derive(Debug, Error)]
pub enum TransientError {
    #[error("I/O failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl GribError {
    /// Wraps a filesystem error together with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Transient(TransientError::Io {
            path: path.into(),
            source,
        })
    }

    /// True when retrying the failed operation may succeed. All other
    /// variants describe malformed input or configuration and will fail the
    /// same way every time.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for GribError {
    fn from(source: reqwest::Error) -> Self {
        Self::Transient(TransientError::Http(source))
    }
}
