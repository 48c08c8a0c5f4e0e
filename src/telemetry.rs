// 📝 Logging setup
// RUST_LOG filter (default info). Stations log to a dated file because the
// terminal belongs to the swipe prompt.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

/// `<dir>/<prefix>-YYYY-MM-DD.log`
pub fn log_file_path(dir: &Path, prefix: &str) -> PathBuf {
    dir.join(format!("{}-{}.log", prefix, Local::now().format("%Y-%m-%d")))
}

/// Install the global subscriber. With `log_dir` set, logs append to a dated
/// file there; otherwise they go to stdout. A second call is a no-op.
pub fn init_tracing(log_dir: Option<&Path>, prefix: &str) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(dir) = log_dir else {
        let _ = fmt().with_env_filter(filter).try_init();
        return Ok(None);
    };

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = log_file_path(dir, prefix);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let _ = fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(Some(path))
}
