//! Incremental file catalog and thumbnail cache for astrophotography
//! libraries.
//!
//! A crawl cycle walks the configured roots, classifies every image file
//! against the persistent catalog, extracts hash, tags and a thumbnail for
//! new or modified files and marks vanished ones as removed. The
//! [`cache::ThumbnailCache`] serves thumbnail requests from the UI newest
//! first. Everything observable is published on an [`events::EventBus`].

pub mod cache;
pub mod cancel;
pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod import;
pub mod logging;
pub mod scan;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{PushOutcome, RequestStack, ThumbnailCache, MAX_REQUEST};
pub use cancel::CancelToken;
pub use config::CatalogConfig;
pub use error::{CatalogError, ConfigError, DecodeError, ExtractError, PathError, ScanError};
pub use events::{CatalogEvent, EventBus};
pub use scan::cycle::{CycleReport, Scanner};
pub use state::data::{CatalogRecord, Classification, CycleCounts, CycleId, PathInfo, RecordId};
pub use state::library::{Catalog, Library};
