//! Logging configuration for the lintel CLI
//!
//! Diagnostics go to stderr so hook output on stdout stays clean. An optional
//! file receives everything at debug level.

use crate::{Error, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the logging system
///
/// # Arguments
/// * `verbose` - Enable debug level logging and timestamps
/// * `log_file` - Optional path to append logs to
///
/// `RUST_LOG` overrides the default `lintel=info` filter.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    // Target prefixes match every lintel_* crate
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("lintel={level}")))
        .map_err(|e| Error::Message(format!("invalid log filter: {e}")))?;

    let stderr_layer = if verbose {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .with_filter(env_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time() // No timestamps in normal mode
            .compact()
            .with_filter(env_filter)
            .boxed()
    };

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Message(format!("failed to initialize logging: {e}")))
}
