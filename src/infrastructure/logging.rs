//! Logging configuration
//!
//! Logs go to stderr so compiled manifests on stdout stay clean.

use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber at `level`; `RUST_LOG` takes precedence.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_logging(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .try_init()
        .is_ok()
}
