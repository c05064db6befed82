//! Shared logging initialization for filetool binaries.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the embedding binary.

use std::sync::OnceLock;

static INIT: OnceLock<()> = OnceLock::new();

/// Environment variable selecting the log level
pub const LOG_ENV: &str = "FILETOOL_LOG";

fn parse_level(default: tracing::Level) -> tracing::Level {
    match std::env::var(LOG_ENV)
        .map(|v| v.to_ascii_lowercase())
        .as_deref()
    {
        Ok("trace") => tracing::Level::TRACE,
        Ok("debug") => tracing::Level::DEBUG,
        Ok("info") => tracing::Level::INFO,
        Ok("warn") => tracing::Level::WARN,
        Ok("error") => tracing::Level::ERROR,
        _ => default,
    }
}

/// Initialize process-level tracing output on stderr from `FILETOOL_LOG`.
///
/// Safe to call multiple times; only the first call installs the subscriber.
/// Best-effort, never returns an error.
pub fn init() {
    if INIT.get().is_some() {
        return;
    }
    let level = parse_level(tracing::Level::WARN);
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
    let _ = INIT.set(());
}
