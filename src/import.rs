//! Running cycles from async code.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::error::ScanError;
use crate::scan::cycle::{CycleReport, Scanner};

/// Run one crawl cycle on tokio's blocking pool so the caller's event loop
/// keeps running. Progress is reported through the scanner's event bus.
pub async fn scan_async(
    scanner: Arc<Scanner>,
    roots: Vec<PathBuf>,
    cancel: CancelToken,
) -> Result<CycleReport, ScanError> {
    tokio::task::spawn_blocking(move || scanner.run_cycle(&roots, &cancel))
        .await
        .map_err(|err| ScanError::Task(err.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CatalogConfig;
    use crate::events::{CatalogEvent, EventBus};
    use crate::state::data::RecordState;
    use crate::state::library::Library;
    use crate::test_support;

    #[tokio::test]
    async fn test_scan_async_runs_a_cycle() {
        let dir = tempfile::tempdir().unwrap();
        test_support::write_fits(&dir.path().join("m33.fits"), 32, 24, 5);
        test_support::write_png(&dir.path().join("preview.png"), 64, 64);

        let library = Arc::new(Library::open_in_memory().unwrap());
        let events = EventBus::new();
        let rx = events.subscribe();
        let scanner = Arc::new(Scanner::from_config(
            &CatalogConfig::default(),
            library.clone(),
            events,
        ));

        let report = scan_async(scanner, vec![dir.path().to_path_buf()], CancelToken::new())
            .await
            .unwrap();

        assert_eq!(report.counts.new, 2);
        assert_eq!(report.counts.extracted, 2);
        assert_eq!(library.record_count(RecordState::Present).unwrap(), 2);
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, CatalogEvent::CycleEnded { cycle, .. } if cycle == report.cycle)));
    }

    #[tokio::test]
    async fn test_scan_async_reports_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let library = Arc::new(Library::open_in_memory().unwrap());
        let scanner = Arc::new(Scanner::from_config(
            &CatalogConfig::default(),
            library,
            EventBus::new(),
        ));
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = scan_async(scanner, vec![dir.path().to_path_buf()], cancel)
            .await
            .unwrap_err();
        assert!(err.is_canceled());
    }
}
