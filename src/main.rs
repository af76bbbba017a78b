use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use astro_catalog::events::CatalogEvent;
use astro_catalog::state::data::RecordState;
use astro_catalog::{import, logging, CancelToken, CatalogConfig, EventBus, Library, Scanner};

/// Headless crawl of an astrophotography library
#[derive(Debug, Parser)]
#[command(name = "astro-catalog", version, about)]
struct Opts {
    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Catalog database, overrides the config
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Extraction worker threads, overrides the config
    #[arg(short, long)]
    workers: Option<usize>,

    /// Delete removed records after the cycle
    #[arg(long)]
    purge_removed: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Directories to crawl, in addition to the configured roots
    roots: Vec<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let opts = Opts::parse();
    logging::init(opts.verbose);

    if let Err(e) = run(opts).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(opts: Opts) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = CatalogConfig::load_or_default(opts.config.as_deref())?;
    config.roots.extend(opts.roots);
    if let Some(database) = opts.database {
        config.database_path = Some(database);
    }
    if let Some(workers) = opts.workers {
        config.extract_workers = workers;
    }
    config.validate()?;

    let library = Arc::new(match &config.database_path {
        Some(path) => Library::open(path)?,
        None => Library::open_default()?,
    });
    info!("Catalog has {} records", library.record_count(RecordState::Present)?);

    let events = EventBus::new();
    let progress = std::thread::Builder::new()
        .name("catalog-progress".into())
        .spawn({
            let rx = events.subscribe();
            move || {
                for event in rx {
                    log_event(&event);
                }
            }
        })?;

    let scanner = Arc::new(Scanner::from_config(&config, library.clone(), events));
    let outcome = import::scan_async(scanner, config.roots.clone(), CancelToken::new()).await;
    // The scanner held the last handle on the bus, so this ends once drained
    let _ = progress.join();
    let report = outcome?;

    let counts = report.counts;
    println!(
        "Cycle {}: {} found, {} new, {} modified, {} current, {} removed, {} failed, {} skipped",
        report.cycle,
        counts.found,
        counts.new,
        counts.modified,
        counts.current,
        counts.removed,
        counts.failed,
        counts.skipped
    );

    if opts.purge_removed {
        let purged = library.purge_removed()?;
        println!("Purged {purged} removed records");
    }
    Ok(())
}

fn log_event(event: &CatalogEvent) {
    match event {
        CatalogEvent::FileIsModified { path } => info!("Modified: {}", path.display()),
        CatalogEvent::FileShouldProcess { path } => info!("New: {}", path.display()),
        CatalogEvent::FileIsRemoved { path } => info!("Removed: {}", path.display()),
        CatalogEvent::ExtractionFailed { path, reason } => {
            warn!("Failed {}: {}", path.display(), reason)
        }
        CatalogEvent::PathSkipped { reason, .. } => warn!("Skipped: {}", reason),
        CatalogEvent::CycleAborted { cycle, reason } => {
            warn!("Cycle {} aborted: {}", cycle, reason)
        }
        other => debug!("{:?}", other),
    }
}
