//! Logging setup, driven by the `[logging]` config section.
//!
//! Records go to an append-only log file so daemon output never mixes with
//! the CLI's stdout (compiled G-code, plan JSON). The file path and fallback
//! filter come from [`LoggingConfig`]; `RUST_LOG` overrides the filter.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Default log location under the XDG state dir.
pub fn default_log_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("plotterd")?;
    Ok(xdg_dirs.get_state_home().join("plotterd.log"))
}

fn env_filter(cfg: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.filter))
}

/// Initialize logging to the configured file (or the default path). Fails
/// before touching the global subscriber when the file cannot be opened, so
/// the caller can still fall back to [`init_stderr`].
pub fn init(cfg: &LoggingConfig) -> Result<()> {
    let path = match &cfg.file {
        Some(path) => path.clone(),
        None => default_log_path()?,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log dir {}", parent.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(cfg))
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();

    tracing::info!(path = %path.display(), "logging to file");
    Ok(())
}

/// Stderr-only logging for when the log file is unavailable.
pub fn init_stderr(cfg: &LoggingConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(cfg))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
