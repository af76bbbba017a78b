//! One crawl cycle: crawl, classify, extract, sweep.
//!
//! Stages run on their own named threads and hand paths along bounded
//! channels, so a slow extractor makes the crawler block instead of
//! buffering the whole tree in memory.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{Scope, ScopedJoinHandle};
use tracing::{debug, info, warn};

use super::crawler::{normalize_roots, Crawler};
use super::filter::ChangeFilter;
use crate::cancel::CancelToken;
use crate::config::CatalogConfig;
use crate::error::{CatalogError, ExtractError, ScanError};
use crate::events::{CatalogEvent, EventBus};
use crate::extract::pipeline::ExtractionPipeline;
use crate::state::data::{Classification, CycleCounts, CycleId, PathInfo};
use crate::state::library::Catalog;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Outcome of a completed cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: CycleId,
    pub counts: CycleCounts,
}

/// Shared state of the stage threads for one cycle
struct CycleContext {
    cycle: CycleId,
    /// Child of the caller's token; canceled on a fatal catalog error
    run: CancelToken,
    counts: Mutex<CycleCounts>,
    fatal: Mutex<Option<CatalogError>>,
    /// Paths the crawl could not read; their records are kept out of the sweep
    skipped: Mutex<Vec<PathBuf>>,
}

impl CycleContext {
    /// Keep the first catalog error and stop every stage.
    fn fail(&self, err: CatalogError) {
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            warn!("Catalog error in cycle {}: {}", self.cycle, err);
            *fatal = Some(err);
        }
        self.run.cancel();
    }

    fn tally(&self, update: impl FnOnce(&mut CycleCounts)) {
        update(&mut self.counts.lock());
    }
}

/// Runs crawl cycles against a catalog.
pub struct Scanner {
    catalog: Arc<dyn Catalog>,
    pipeline: ExtractionPipeline,
    crawler: Crawler,
    events: Arc<EventBus>,
    workers: usize,
    channel_capacity: usize,
}

impl Scanner {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        pipeline: ExtractionPipeline,
        crawler: Crawler,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            catalog,
            pipeline,
            crawler,
            events,
            workers: 1,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn from_config(
        config: &CatalogConfig,
        catalog: Arc<dyn Catalog>,
        events: Arc<EventBus>,
    ) -> Self {
        Self::new(
            catalog,
            ExtractionPipeline::from_config(config),
            Crawler::new(&config.extensions),
            events,
        )
        .with_workers(config.extract_workers)
        .with_channel_capacity(config.channel_capacity)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn catalog(&self) -> &Arc<dyn Catalog> {
        &self.catalog
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Run one full cycle over `roots`.
    ///
    /// Files under the roots are classified against the catalog; New and
    /// Modified files are extracted and upserted. Once every stage has
    /// drained, Present records under the roots that were not seen are
    /// marked removed. A canceled cycle, or one that hit a catalog error,
    /// is recorded as aborted and skips that sweep.
    pub fn run_cycle(
        &self,
        roots: &[PathBuf],
        cancel: &CancelToken,
    ) -> Result<CycleReport, ScanError> {
        let roots = normalize_roots(roots);
        if roots.is_empty() {
            return Err(ScanError::NoRoots);
        }

        let cycle = self.catalog.begin_cycle()?;
        info!("Cycle {} started over {} root(s)", cycle, roots.len());
        self.events.emit(CatalogEvent::CycleStarted { cycle });

        let ctx = CycleContext {
            cycle,
            run: cancel.child(),
            counts: Mutex::new(CycleCounts::default()),
            fatal: Mutex::new(None),
            skipped: Mutex::new(Vec::new()),
        };

        if let Err(err) = self.run_stages(&roots, &ctx) {
            self.abort(cycle, &err.to_string());
            return Err(err);
        }
        if let Some(err) = ctx.fatal.lock().take() {
            self.abort(cycle, &err.to_string());
            return Err(ScanError::Catalog(err));
        }
        if ctx.run.is_canceled() {
            self.abort(cycle, "canceled");
            return Err(ScanError::Canceled);
        }

        let mut counts = ctx.counts.into_inner();
        let skipped = ctx.skipped.into_inner();
        if let Err(err) = self.sweep(cycle, &roots, &skipped, &mut counts) {
            self.abort(cycle, &err.to_string());
            return Err(err.into());
        }
        if let Err(err) = self.catalog.end_cycle(cycle, &counts) {
            self.abort(cycle, &err.to_string());
            return Err(err.into());
        }

        info!(
            "Cycle {} finished: {} found, {} new, {} modified, {} removed, {} failed",
            cycle, counts.found, counts.new, counts.modified, counts.removed, counts.failed
        );
        self.events.emit(CatalogEvent::CycleEnded { cycle, counts });
        Ok(CycleReport { cycle, counts })
    }

    fn run_stages(&self, roots: &[PathBuf], ctx: &CycleContext) -> Result<(), ScanError> {
        std::thread::scope(|scope| {
            let (found_tx, found_rx) = bounded::<PathInfo>(self.channel_capacity);
            let (work_tx, work_rx) = bounded::<PathInfo>(self.channel_capacity);
            let mut handles = Vec::with_capacity(self.workers + 2);

            handles.push(spawn_stage(scope, ctx, "crawler", "catalog-crawler".into(), move || {
                self.crawl_roots(roots, found_tx, ctx)
            })?);
            handles.push(spawn_stage(scope, ctx, "filter", "catalog-filter".into(), move || {
                self.filter_paths(found_rx, work_tx, ctx)
            })?);
            for index in 0..self.workers {
                let work_rx = work_rx.clone();
                handles.push(spawn_stage(
                    scope,
                    ctx,
                    "extractor",
                    format!("catalog-extract-{index}"),
                    move || self.extract_paths(work_rx, ctx),
                )?);
            }
            drop(work_rx);

            let mut result = Ok(());
            for handle in handles {
                if handle.join().is_err() {
                    ctx.run.cancel();
                    result = Err(ScanError::Task("pipeline thread panicked".into()));
                }
            }
            result
        })
    }

    /// Crawler stage: walk every root and feed the filter.
    fn crawl_roots(&self, roots: &[PathBuf], found: Sender<PathInfo>, ctx: &CycleContext) {
        for root in roots {
            let mut crawl = self.crawler.crawl(root, &ctx.run);
            for item in crawl.by_ref() {
                match item {
                    Ok(info) => {
                        ctx.tally(|c| c.found += 1);
                        self.events.emit(CatalogEvent::FileFound {
                            path: info.absolute_path.clone(),
                        });
                        if found.send(info).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        ctx.tally(|c| c.skipped += 1);
                        let path = err.path().map(Path::to_path_buf);
                        if let Some(path) = &path {
                            ctx.skipped.lock().push(path.clone());
                        }
                        self.events.emit(CatalogEvent::PathSkipped {
                            path,
                            reason: err.to_string(),
                        });
                    }
                }
            }
            if crawl.was_canceled() {
                debug!("Crawl of {} canceled", root.display());
                return;
            }
        }
    }

    /// Filter stage: classify each path and forward New/Modified ones.
    fn filter_paths(&self, found: Receiver<PathInfo>, work: Sender<PathInfo>, ctx: &CycleContext) {
        let filter = ChangeFilter::new(self.catalog.clone(), ctx.cycle);

        for info in found {
            if ctx.run.is_canceled() {
                break;
            }
            let class = match filter.observe(&info) {
                Ok(class) => class,
                Err(err) => {
                    ctx.fail(err);
                    break;
                }
            };

            let path = info.absolute_path.clone();
            let event = match class {
                Classification::Current => {
                    ctx.tally(|c| c.current += 1);
                    CatalogEvent::FileIsCurrent { path }
                }
                Classification::Modified => {
                    ctx.tally(|c| c.modified += 1);
                    CatalogEvent::FileIsModified { path }
                }
                Classification::New => {
                    ctx.tally(|c| c.new += 1);
                    CatalogEvent::FileShouldProcess { path }
                }
                // Removal is decided by the end-of-cycle sweep only
                Classification::Removed => {
                    debug!("Ignoring per-path removal of {}", info.key);
                    continue;
                }
            };
            self.events.emit(event);

            if class.needs_extraction() && work.send(info).is_err() {
                break;
            }
        }
    }

    /// Extraction stage: one of `workers` threads sharing the work queue.
    fn extract_paths(&self, work: Receiver<PathInfo>, ctx: &CycleContext) {
        for info in work {
            if ctx.run.is_canceled() {
                break;
            }
            match self
                .pipeline
                .process(&info, ctx.cycle, self.catalog.as_ref(), &ctx.run)
            {
                Ok(record) => {
                    ctx.tally(|c| c.extracted += 1);
                    self.events.emit(CatalogEvent::ExtractionCompleted { record });
                }
                Err(ExtractError::Canceled) => break,
                Err(ExtractError::Catalog(err)) => {
                    ctx.fail(err);
                    break;
                }
                Err(err) => {
                    warn!("Extraction failed for {}: {}", info.key, err);
                    ctx.tally(|c| c.failed += 1);
                    self.events.emit(CatalogEvent::ExtractionFailed {
                        path: info.absolute_path,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    /// Mark every Present record under `roots` not seen during `cycle`,
    /// except those at or below a path the crawl had to skip.
    fn sweep(
        &self,
        cycle: CycleId,
        roots: &[PathBuf],
        skipped: &[PathBuf],
        counts: &mut CycleCounts,
    ) -> Result<(), CatalogError> {
        for record in self.catalog.stale_records(cycle, roots)? {
            let path = Path::new(&record.absolute_path);
            if skipped.iter().any(|dir| path.starts_with(dir)) {
                debug!("Keeping {}: path was unreadable this cycle", record.absolute_path);
                continue;
            }
            if self.catalog.mark_removed(&record.absolute_path, cycle)? {
                counts.removed += 1;
                self.events.emit(CatalogEvent::FileIsRemoved {
                    path: PathBuf::from(record.absolute_path),
                });
            }
        }
        Ok(())
    }

    fn abort(&self, cycle: CycleId, reason: &str) {
        warn!("Cycle {} aborted: {}", cycle, reason);
        if let Err(err) = self.catalog.abort_cycle(cycle, reason) {
            warn!("Failed to record abort of cycle {}: {}", cycle, err);
        }
        self.events.emit(CatalogEvent::CycleAborted {
            cycle,
            reason: reason.to_string(),
        });
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("pipeline", &self.pipeline)
            .field("crawler", &self.crawler)
            .field("workers", &self.workers)
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

fn spawn_stage<'scope, 'env, F>(
    scope: &'scope Scope<'scope, 'env>,
    ctx: &CycleContext,
    stage: &'static str,
    name: String,
    body: F,
) -> Result<ScopedJoinHandle<'scope, ()>, ScanError>
where
    F: FnOnce() + Send + 'scope,
{
    std::thread::Builder::new()
        .name(name)
        .spawn_scoped(scope, body)
        .map_err(|source| {
            ctx.run.cancel();
            ScanError::Spawn { stage, source }
        })
}
