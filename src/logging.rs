//! Tracing setup for the daemon.
//!
//! A single init with `EnvFilter`: the configured level is the default and
//! `RUST_LOG` overrides it, so a stuck mount can be debugged without
//! touching the config file.

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Initialize tracing for the daemon process.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Logging initialized");
}
