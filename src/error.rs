/// Error taxonomy for the catalog core
///
/// Per-file failures (`PathError`, `DecodeError`) are recovered where they
/// happen and surfaced as events. `CatalogError` is fatal to the running
/// cycle. Cancellation is a normal early exit and has its own variants.

use std::path::PathBuf;
use thiserror::Error;

use crate::state::data::{RecordId, ThumbnailRef};

/// Stat/open/read failure on a single file. The file is skipped.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("failed to stat {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("path is not valid UTF-8: {0}")]
    NotUtf8(PathBuf),
}

impl PathError {
    /// The offending path, when the error carries one
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            PathError::Stat { path, .. } | PathError::Read { path, .. } => Some(path),
            PathError::Walk(err) => err.path(),
            PathError::NotUtf8(path) => Some(path),
        }
    }
}

/// Content could not be interpreted as an image.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported format for {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    #[error("malformed file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("failed to decode {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl DecodeError {
    pub(crate) fn malformed(path: &std::path::Path, reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(path: &std::path::Path, reason: impl Into<String>) -> Self {
        DecodeError::Unsupported {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Persistent-store failure. Aborts the current cycle.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("tag serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to prepare catalog directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("record not found: {0}")]
    RecordNotFound(RecordId),

    #[error("thumbnail not found: {0}")]
    ThumbnailNotFound(ThumbnailRef),

    #[error("invalid stored value in {column}: {value}")]
    InvalidValue { column: &'static str, value: String },

    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// Failure while extracting hash, tags and thumbnail for one file.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("failed to encode thumbnail for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("extraction canceled")]
    Canceled,
}

/// Failure of a whole crawl cycle.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("catalog error, cycle aborted: {0}")]
    Catalog(#[from] CatalogError),

    #[error("scan canceled")]
    Canceled,

    #[error("failed to spawn {stage} thread: {source}")]
    Spawn {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("no readable roots to scan")]
    NoRoots,

    #[error("scan task failed: {0}")]
    Task(String),
}

impl ScanError {
    /// Cancellation is a normal early termination, not a failure.
    pub fn is_canceled(&self) -> bool {
        matches!(self, ScanError::Canceled)
    }
}

/// Configuration could not be loaded or is invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;
