/// Crawl cycles
///
/// - crawler.rs: walks roots and stats matching files
/// - filter.rs: classifies each file against the catalog
/// - cycle.rs: wires the stages together and runs the Removed sweep

pub mod crawler;
pub mod cycle;
pub mod filter;
