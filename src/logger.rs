use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Keeps the background writer alive; set once the subscriber is installed.
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Explicit log file location, bypassing XDG discovery.
const LOG_FILE_ENV: &str = "SANDCHECK_LOG_FILE";
/// Filter directives. `RUST_LOG` is consulted when unset.
const LOG_FILTER_ENV: &str = "SANDCHECK_LOG";
const DEFAULT_FILTER: &str = "info";

/// Send tracing output to the log file. Terminal output is not affected.
pub fn init() -> Result<()> {
    if GUARD.get().is_some() {
        return Ok(());
    }

    let (writer, guard) = open_log_writer(&determine_log_path()?)?;
    tracing_subscriber::registry()
        .with(log_filter())
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false),
        )
        .try_init()
        .context("Failed to initialize tracing subscriber")?;
    let _ = GUARD.set(guard);
    Ok(())
}

fn open_log_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let (dir, file_name) = split_path(path)?;
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory at {}", dir.display()))?;
    Ok(tracing_appender::non_blocking(rolling::never(dir, file_name)))
}

fn log_filter() -> EnvFilter {
    let directives = std::env::var(LOG_FILTER_ENV)
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok());
    filter_from(directives)
}

/// Unset, empty or unparsable directives fall back to `info`.
fn filter_from(directives: Option<String>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

fn determine_log_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(LOG_FILE_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }

    let state_home = std::env::var_os("XDG_STATE_HOME").filter(|p| !p.is_empty());
    Ok(log_path_in(
        state_home.map(PathBuf::from),
        home::home_dir(),
        std::env::current_dir()?,
    ))
}

/// `$XDG_STATE_HOME/sandcheck`, else `~/.local/state/sandcheck`, else the cwd.
fn log_path_in(state_home: Option<PathBuf>, home: Option<PathBuf>, cwd: PathBuf) -> PathBuf {
    let dir = match (state_home, home) {
        (Some(state), _) => state.join("sandcheck"),
        (None, Some(home)) => home.join(".local").join("state").join("sandcheck"),
        (None, None) => cwd,
    };
    dir.join("sandcheck.log")
}

fn split_path(path: &Path) -> Result<(PathBuf, &str)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid log file name: {}", path.display()))?;

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok((dir, file_name))
}
