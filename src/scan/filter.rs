use std::sync::Arc;
use tracing::trace;

use crate::error::CatalogResult;
use crate::state::data::{CatalogRecord, Classification, CycleId, PathInfo, RecordState};
use crate::state::library::Catalog;

/// Compare a discovered file against its catalog record.
///
/// Rules, in order: no record or a MarkedRemoved record is New; identical
/// size and mtime is Current; anything else is Modified. Removed is never
/// produced here, only by the end-of-cycle sweep.
pub fn classify_against(record: Option<&CatalogRecord>, info: &PathInfo) -> Classification {
    match record {
        None => Classification::New,
        Some(record) if record.state == RecordState::MarkedRemoved => Classification::New,
        Some(record) if record.size_bytes == info.size_bytes && record.mtime == info.mtime => {
            Classification::Current
        }
        Some(_) => Classification::Modified,
    }
}

/// Classifies paths for one crawl cycle and records every observation.
pub struct ChangeFilter {
    catalog: Arc<dyn Catalog>,
    cycle: CycleId,
}

impl ChangeFilter {
    pub fn new(catalog: Arc<dyn Catalog>, cycle: CycleId) -> Self {
        Self { catalog, cycle }
    }

    pub fn cycle(&self) -> CycleId {
        self.cycle
    }

    /// Classify without side effects.
    pub fn classify(&self, info: &PathInfo) -> CatalogResult<Classification> {
        let record = self.catalog.get(&info.key)?;
        Ok(classify_against(record.as_ref(), info))
    }

    /// Classify and mark existing Current/Modified records as seen in this
    /// cycle, so the Removed sweep leaves them alone. New records are
    /// stamped with the cycle when the pipeline writes them.
    pub fn observe(&self, info: &PathInfo) -> CatalogResult<Classification> {
        let class = self.classify(info)?;
        if matches!(class, Classification::Current | Classification::Modified) {
            self.catalog.touch(&info.key, self.cycle)?;
        }
        trace!("{:?}: {}", class, info.key);
        Ok(class)
    }
}
