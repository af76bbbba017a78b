//! Events published to external subscribers (the GUI in the desktop app).

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

use crate::state::data::{CatalogRecord, CycleCounts, CycleId, RecordId, ThumbnailBlob};

/// Everything the catalog core reports while crawling, extracting and
/// serving thumbnails.
#[derive(Debug, Clone)]
pub enum CatalogEvent {
    CycleStarted { cycle: CycleId },
    CycleEnded { cycle: CycleId, counts: CycleCounts },
    /// The cycle stopped early (cancellation or catalog error); no Removed
    /// sweep was performed.
    CycleAborted { cycle: CycleId, reason: String },

    FileFound { path: PathBuf },
    FileIsCurrent { path: PathBuf },
    FileIsModified { path: PathBuf },
    FileIsRemoved { path: PathBuf },
    /// A path not yet in the catalog (or previously removed) needs extraction
    FileShouldProcess { path: PathBuf },
    /// Stat or walk failure; the path was skipped
    PathSkipped { path: Option<PathBuf>, reason: String },

    ExtractionCompleted { record: CatalogRecord },
    ExtractionFailed { path: PathBuf, reason: String },

    ThumbnailLoaded { record: RecordId, blob: Arc<ThumbnailBlob> },
    ThumbnailLoadFailed { record: RecordId, reason: String },
    /// A pending request was dropped because the cache shut down
    ThumbnailCanceled { record: RecordId },
    /// The request queue was full and dropped its oldest request
    QueueSaturated { evicted: RecordId },
}

/// Broadcast-style event bus using fan-out to per-subscriber channels.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<CatalogEvent>>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribe to events. Returns a Receiver that will get future events.
    pub fn subscribe(&self) -> Receiver<CatalogEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Broadcast an event to all subscribers. Dropped receivers are pruned.
    pub fn emit(&self, event: CatalogEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|sub| sub.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
