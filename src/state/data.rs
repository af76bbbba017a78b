/// Shared data structures for the catalog
///
/// These structs represent the data model that flows between
/// the crawler, the change filter, the extraction pipeline and the
/// database layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Metadata tags extracted from a file (keyword -> value).
/// Ordered so that serialized tags are byte-identical across runs.
pub type Tags = BTreeMap<String, String>;

/// Unique database ID of a catalog record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub i64);

/// Opaque handle to a stored thumbnail blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThumbnailRef(pub i64);

/// Identifier of one crawl cycle. Ids increase monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CycleId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record#{}", self.0)
    }
}

impl fmt::Display for ThumbnailRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thumbnail#{}", self.0)
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cycle#{}", self.0)
    }
}

/// File modification time with nanosecond precision.
///
/// Stored as seconds + nanoseconds so equality survives the database
/// round trip exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Mtime {
    pub secs: i64,
    pub nanos: u32,
}

impl Mtime {
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self { secs, nanos }
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.secs, self.nanos)
    }
}

impl From<std::time::SystemTime> for Mtime {
    fn from(time: std::time::SystemTime) -> Self {
        let dt: DateTime<Utc> = time.into();
        Self {
            secs: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos(),
        }
    }
}

/// What the crawler emits for every regular file it finds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    /// Absolute path to the file
    pub absolute_path: PathBuf,
    /// Canonical string key used by the catalog
    pub key: String,
    pub size_bytes: u64,
    pub mtime: Mtime,
}

/// Lifecycle state of a catalog record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordState {
    Present,
    MarkedRemoved,
}

impl RecordState {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordState::Present => "present",
            RecordState::MarkedRemoved => "removed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "present" => Some(RecordState::Present),
            "removed" => Some(RecordState::MarkedRemoved),
            _ => None,
        }
    }
}

/// A single file in the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRecord {
    /// Unique database ID
    pub id: RecordId,
    /// Canonical absolute path, unique across the catalog
    pub absolute_path: String,
    pub size_bytes: u64,
    pub mtime: Mtime,
    /// Hex digest of the file contents
    pub content_hash: String,
    pub tags: Tags,
    pub thumbnail_ref: ThumbnailRef,
    pub state: RecordState,
    /// Most recent cycle that observed the file
    pub seen_cycle: CycleId,
    /// Wall-clock time of that observation
    pub last_seen: DateTime<Utc>,
}

/// Everything the extraction pipeline hands to `Catalog::upsert`
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub absolute_path: String,
    pub size_bytes: u64,
    pub mtime: Mtime,
    pub content_hash: String,
    pub tags: Tags,
    pub thumbnail: ThumbnailBlob,
    pub seen_cycle: CycleId,
}

/// An encoded (PNG) thumbnail image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailBlob {
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Result of comparing a discovered path against the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Current,
    Modified,
    Removed,
    New,
}

impl Classification {
    /// New and Modified files go through the extraction pipeline
    pub fn needs_extraction(self) -> bool {
        matches!(self, Classification::New | Classification::Modified)
    }
}

/// Per-cycle tallies reported with `CycleEnded`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleCounts {
    pub found: usize,
    pub current: usize,
    pub modified: usize,
    pub new: usize,
    pub removed: usize,
    pub extracted: usize,
    pub failed: usize,
    pub skipped: usize,
}
