use std::io;

use tracing_subscriber::{EnvFilter, fmt};

/// Sends log records to stderr, filtered by `RUST_LOG` (default `info`).
///
/// Stdout stays reserved for command output.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();
}
