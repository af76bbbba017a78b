//! Tracing setup for the binary and for embedders that want the same output.

use tracing::{subscriber::set_global_default, Level};
use tracing_subscriber::EnvFilter;

/// Map a -v count to a level; RUST_LOG directives still apply on top.
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install a compact stderr subscriber.
pub fn init(verbosity: u8) {
    let env_filter = EnvFilter::from_default_env().add_directive(level_for(verbosity).into());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .finish();

    // Already set when embedded or under test
    let _ = set_global_default(subscriber);
}
