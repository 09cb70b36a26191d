//! Logging setup.
//!
//! Two `tracing` layers share one `EnvFilter` (`RUST_LOG`, default `info`):
//! - JSON records to a daily rolling file in the data directory
//! - Human-readable records on stderr, leaving stdout to command output

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE: &str = "oauth2client.log";
const DEFAULT_FILTER: &str = "info";

/// Default log directory: `{data_dir}/oauth2client/logs`.
pub fn default_log_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("oauth2client").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the global subscriber.
///
/// Keep the returned guard alive until exit; dropping it flushes and stops
/// the file writer.
pub fn init(log_dir: Option<&Path>) -> WorkerGuard {
    let log_dir = log_dir.map(Path::to_path_buf).unwrap_or_else(default_log_dir);

    if !log_dir.exists() {
        if let Err(e) = fs::create_dir_all(&log_dir) {
            eprintln!("Failed to create logs directory: {}", e);
        }
    }

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // File Layer: JSON format for easy parsing/ingestion
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .json()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(true)
        .with_filter(env_filter());

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .compact()
        .with_target(false)
        .with_filter(env_filter());

    // try_init: a second call (tests, embedding) keeps the first subscriber
    if let Err(e) = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
    {
        eprintln!("Logging already initialized: {}", e);
    }

    tracing::debug!(
        path = %log_dir.join(LOG_FILE).display(),
        "Logging initialized (daily rolling)"
    );

    guard
}
