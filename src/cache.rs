//! Thumbnail request queue.
//!
//! The UI asks for thumbnails of whatever is on screen, often in bursts.
//! Requests go into a small LIFO stack with per-key dedup; a single
//! consumer thread pops the newest request and loads the blob from the
//! catalog. When the stack is full the oldest request is dropped, the UI
//! re-requests on scroll.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::CatalogConfig;
use crate::events::{CatalogEvent, EventBus};
use crate::state::data::RecordId;
use crate::state::library::Catalog;

/// Nominal capacity of the request stack
pub const MAX_REQUEST: usize = 5;

/// How often a waiting consumer re-checks the cancel flag
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome<K> {
    Queued,
    /// Same key already pending; its slot was left where it was
    AlreadyPending,
    /// Queued after dropping the oldest pending key
    Evicted(K),
    /// The queue has shut down
    Closed,
}

/// Bounded LIFO stack with per-key dedup.
#[derive(Debug, Clone)]
pub struct RequestStack<K> {
    /// Front is the oldest request, back is the top of the stack
    entries: VecDeque<K>,
    capacity: usize,
}

impl<K: Copy + PartialEq> RequestStack<K> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, key: K) -> PushOutcome<K> {
        if self.entries.contains(&key) {
            return PushOutcome::AlreadyPending;
        }
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(key);
        match evicted {
            Some(old) => PushOutcome::Evicted(old),
            None => PushOutcome::Queued,
        }
    }

    /// Newest request first
    pub fn pop(&mut self) -> Option<K> {
        self.entries.pop_back()
    }

    /// Pending keys, top of the stack first
    pub fn pending(&self) -> Vec<K> {
        self.entries.iter().rev().copied().collect()
    }

    /// Remove everything, top of the stack first
    pub fn drain(&mut self) -> Vec<K> {
        let drained = self.pending();
        self.entries.clear();
        drained
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

struct QueueState {
    stack: RequestStack<RecordId>,
    paused: bool,
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signaled on push, resume and shutdown
    wake: Condvar,
    cancel: CancelToken,
    catalog: Arc<dyn Catalog>,
    events: Arc<EventBus>,
}

/// Serializes thumbnail loads from the catalog on one consumer thread.
/// Results are published as `ThumbnailLoaded` / `ThumbnailLoadFailed`.
pub struct ThumbnailCache {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl ThumbnailCache {
    pub fn start(
        catalog: Arc<dyn Catalog>,
        events: Arc<EventBus>,
        capacity: usize,
        cancel: &CancelToken,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                stack: RequestStack::new(capacity),
                paused: false,
                closed: false,
            }),
            wake: Condvar::new(),
            cancel: cancel.clone(),
            catalog,
            events,
        });

        let worker = std::thread::Builder::new()
            .name("thumbnail-loader".into())
            .spawn({
                let shared = shared.clone();
                move || run_consumer(&shared)
            })?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Start with the configured `thumbnail_cache_capacity`.
    pub fn from_config(
        config: &CatalogConfig,
        catalog: Arc<dyn Catalog>,
        events: Arc<EventBus>,
        cancel: &CancelToken,
    ) -> std::io::Result<Self> {
        Self::start(catalog, events, config.thumbnail_cache_capacity, cancel)
    }

    /// Capacity of the request stack
    pub fn capacity(&self) -> usize {
        self.shared.state.lock().stack.capacity()
    }

    /// Ask for the thumbnail of `record`. Evictions are also published as
    /// `QueueSaturated`.
    pub fn request(&self, record: RecordId) -> PushOutcome<RecordId> {
        let outcome = {
            let mut state = self.shared.state.lock();
            if state.closed || self.shared.cancel.is_canceled() {
                return PushOutcome::Closed;
            }
            state.stack.push(record)
        };

        match outcome {
            PushOutcome::Evicted(evicted) => {
                debug!("Thumbnail queue full, dropped {}", evicted);
                self.shared
                    .events
                    .emit(CatalogEvent::QueueSaturated { evicted });
                self.shared.wake.notify_one();
            }
            PushOutcome::Queued => {
                self.shared.wake.notify_one();
            }
            PushOutcome::AlreadyPending | PushOutcome::Closed => {}
        }
        outcome
    }

    /// Pending requests, next to be served first
    pub fn pending(&self) -> Vec<RecordId> {
        self.shared.state.lock().stack.pending()
    }

    /// Hold the consumer; requests keep queueing.
    pub fn pause(&self) {
        self.shared.state.lock().paused = true;
    }

    pub fn resume(&self) {
        self.shared.state.lock().paused = false;
        self.shared.wake.notify_one();
    }

    /// Stop the consumer. Pending requests are reported as
    /// `ThumbnailCanceled`.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shared.state.lock().closed = true;
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Thumbnail loader thread panicked");
            }
        }
    }
}

impl Drop for ThumbnailCache {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ThumbnailCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailCache")
            .field("pending", &self.pending())
            .finish()
    }
}

fn run_consumer(shared: &Shared) {
    loop {
        let next = {
            let mut state = shared.state.lock();
            loop {
                if state.closed || shared.cancel.is_canceled() {
                    break None;
                }
                if !state.paused {
                    if let Some(record) = state.stack.pop() {
                        break Some(record);
                    }
                }
                shared.wake.wait_for(&mut state, POLL_INTERVAL);
            }
        };

        let Some(record) = next else {
            break;
        };

        match shared.catalog.thumbnail_for_record(record) {
            Ok(blob) => shared.events.emit(CatalogEvent::ThumbnailLoaded {
                record,
                blob: Arc::new(blob),
            }),
            Err(err) => {
                warn!("Failed to load thumbnail for {}: {}", record, err);
                shared.events.emit(CatalogEvent::ThumbnailLoadFailed {
                    record,
                    reason: err.to_string(),
                });
            }
        }
    }

    let drained = {
        let mut state = shared.state.lock();
        state.closed = true;
        state.stack.drain()
    };
    if !drained.is_empty() {
        debug!("Thumbnail loader exiting, canceled {} requests", drained.len());
    }
    for record in drained {
        shared.events.emit(CatalogEvent::ThumbnailCanceled { record });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::library::Library;
    use crate::test_support;
    use crossbeam_channel::Receiver;

    const WAIT: Duration = Duration::from_secs(5);

    fn ids(keys: &[i64]) -> Vec<RecordId> {
        keys.iter().copied().map(RecordId).collect()
    }

    fn next_event(rx: &Receiver<CatalogEvent>) -> CatalogEvent {
        rx.recv_timeout(WAIT).expect("event")
    }

    fn loaded_id(event: CatalogEvent) -> RecordId {
        match event {
            CatalogEvent::ThumbnailLoaded { record, .. } => record,
            other => panic!("expected ThumbnailLoaded, got {other:?}"),
        }
    }

    #[test]
    fn test_stack_is_lifo() {
        let mut stack = RequestStack::new(MAX_REQUEST);
        for key in ['a', 'b', 'c'] {
            assert_eq!(stack.push(key), PushOutcome::Queued);
        }
        assert_eq!(stack.pop(), Some('c'));
        assert_eq!(stack.pop(), Some('b'));
        assert_eq!(stack.pop(), Some('a'));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn test_stack_evicts_oldest() {
        let mut stack = RequestStack::new(5);
        let outcomes: Vec<_> = (1..=7).map(|k| stack.push(k)).collect();
        assert_eq!(outcomes[4], PushOutcome::Queued);
        assert_eq!(outcomes[5], PushOutcome::Evicted(1));
        assert_eq!(outcomes[6], PushOutcome::Evicted(2));

        let served: Vec<_> = std::iter::from_fn(|| stack.pop()).collect();
        assert_eq!(served, vec![7, 6, 5, 4, 3]);
    }

    #[test]
    fn test_stack_dedup_keeps_slot() {
        let mut stack = RequestStack::new(5);
        stack.push(1);
        stack.push(2);
        assert_eq!(stack.push(1), PushOutcome::AlreadyPending);
        stack.push(3);
        assert_eq!(stack.pending(), vec![3, 2, 1]);
        assert_eq!(stack.len(), 3);
    }

    #[test]
    fn test_stack_never_exceeds_capacity_or_duplicates() {
        let mut stack = RequestStack::new(3);
        for key in [1, 2, 1, 3, 4, 4, 2, 5, 1, 1, 6] {
            stack.push(key);
            let pending = stack.pending();
            assert!(pending.len() <= stack.capacity());
            for (i, k) in pending.iter().enumerate() {
                assert!(!pending[i + 1..].contains(k));
            }
        }
    }

    #[test]
    fn test_cache_burst_serves_newest_five() {
        let library = Arc::new(Library::open_in_memory().unwrap());
        test_support::seed_records(&library, 7);
        let events = EventBus::new();
        let rx = events.subscribe();

        let cache = ThumbnailCache::start(library, events, 5, &CancelToken::new()).unwrap();
        cache.pause();
        for id in 1..=7 {
            cache.request(RecordId(id));
        }
        assert_eq!(cache.pending(), ids(&[7, 6, 5, 4, 3]));

        let mut saturated = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let CatalogEvent::QueueSaturated { evicted } = event {
                saturated.push(evicted);
            }
        }
        assert_eq!(saturated, ids(&[1, 2]));

        cache.resume();
        let served: Vec<_> = (0..5).map(|_| loaded_id(next_event(&rx))).collect();
        assert_eq!(served, ids(&[7, 6, 5, 4, 3]));
        cache.shutdown();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_cache_dedup_loads_each_key_once() {
        let library = Arc::new(Library::open_in_memory().unwrap());
        test_support::seed_records(&library, 3);
        let events = EventBus::new();
        let rx = events.subscribe();

        let cache = ThumbnailCache::start(library, events, 5, &CancelToken::new()).unwrap();
        cache.pause();
        for id in [1, 2, 1, 3] {
            cache.request(RecordId(id));
        }
        assert_eq!(cache.pending(), ids(&[3, 2, 1]));

        cache.resume();
        let served: Vec<_> = (0..3).map(|_| loaded_id(next_event(&rx))).collect();
        assert_eq!(served, ids(&[3, 2, 1]));
        cache.shutdown();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_capacity_comes_from_config() {
        let library = Arc::new(Library::open_in_memory().unwrap());
        let events = EventBus::new();
        let rx = events.subscribe();
        let config = CatalogConfig::from_toml("thumbnail_cache_capacity = 2").unwrap();

        let cache =
            ThumbnailCache::from_config(&config, library, events, &CancelToken::new()).unwrap();
        assert_eq!(cache.capacity(), 2);

        cache.pause();
        for id in 1..=3 {
            cache.request(RecordId(id));
        }
        assert_eq!(cache.pending(), ids(&[3, 2]));
        assert!(rx.try_iter().any(|event| matches!(
            event,
            CatalogEvent::QueueSaturated { evicted: RecordId(1) }
        )));
    }

    #[test]
    fn test_load_error_is_reported_and_consumer_survives() {
        let library = Arc::new(Library::open_in_memory().unwrap());
        test_support::seed_records(&library, 1);
        let events = EventBus::new();
        let rx = events.subscribe();

        let cache = ThumbnailCache::start(library, events, 5, &CancelToken::new()).unwrap();
        cache.request(RecordId(99));
        match next_event(&rx) {
            CatalogEvent::ThumbnailLoadFailed { record, reason } => {
                assert_eq!(record, RecordId(99));
                assert!(reason.contains("not found"));
            }
            other => panic!("unexpected {other:?}"),
        }

        cache.request(RecordId(1));
        assert_eq!(loaded_id(next_event(&rx)), RecordId(1));
    }

    #[test]
    fn test_shutdown_drains_pending_requests() {
        let library = Arc::new(Library::open_in_memory().unwrap());
        let events = EventBus::new();
        let rx = events.subscribe();

        let cache = ThumbnailCache::start(library, events, 5, &CancelToken::new()).unwrap();
        cache.pause();
        cache.request(RecordId(1));
        cache.request(RecordId(2));
        cache.shutdown();

        let canceled: Vec<_> = rx
            .try_iter()
            .filter_map(|event| match event {
                CatalogEvent::ThumbnailCanceled { record } => Some(record),
                _ => None,
            })
            .collect();
        assert_eq!(canceled, ids(&[2, 1]));
    }

    #[test]
    fn test_cancel_token_stops_consumer() {
        let library = Arc::new(Library::open_in_memory().unwrap());
        let events = EventBus::new();
        let rx = events.subscribe();
        let cancel = CancelToken::new();

        let cache = ThumbnailCache::start(library, events, 5, &cancel).unwrap();
        cache.pause();
        cache.request(RecordId(4));
        cancel.cancel();

        match next_event(&rx) {
            CatalogEvent::ThumbnailCanceled { record } => assert_eq!(record, RecordId(4)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(cache.request(RecordId(5)), PushOutcome::Closed);
    }
}
