//! Packs the included part of a project tree into a tar archive.
//!
//! Every directory is descended into; exclusion is decided per file, so an
//! ignored directory is still walked even though none of its files are kept.

pub mod matcher;

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tar::{Builder, HeaderMode};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;

pub use self::matcher::IgnoreMatcher;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Failed to read {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How the walk treats symlinks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotOptions {
    /// Follow symlinks and archive their targets. Skipped entirely when false.
    pub follow_symlinks: bool,
}

/// A packed snapshot staged in a temporary file.
///
/// The staging file is deleted when the archive is dropped.
#[derive(Debug)]
pub struct Archive {
    file: NamedTempFile,
    entries: Vec<PathBuf>,
}

impl Archive {
    /// Relative paths of the archived files, sorted.
    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    /// Path of the staging file on the local filesystem.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// A fresh reader positioned at the start of the archive.
    pub fn reader(&self) -> Result<File> {
        let mut file = self
            .file
            .reopen()
            .context("Failed to reopen staged archive")?;
        file.seek(SeekFrom::Start(0))?;
        Ok(file)
    }
}

/// Collect the relative paths of all files under `root` that `matcher` keeps.
///
/// Sorted by file name within each directory, so the order is stable across runs.
pub fn collect_files(
    root: &Path,
    matcher: &IgnoreMatcher,
    options: SnapshotOptions,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(options.follow_symlinks)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| SnapshotError::ReadFailed {
            path: e.path().unwrap_or(root).to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", entry.path().display(), root.display()))?;
        if matcher.matches(relative) {
            debug!(path = %relative.display(), "snapshot:excluded");
            continue;
        }
        files.push(relative.to_path_buf());
    }
    Ok(files)
}

/// Build the snapshot archive for `root`.
///
/// Any file that cannot be read aborts the build; no partial archive is returned.
pub fn build(root: &Path, matcher: &IgnoreMatcher, options: SnapshotOptions) -> Result<Archive> {
    let entries = collect_files(root, matcher, options)?;
    info!(root = %root.display(), files = entries.len(), "snapshot:files selected");
    pack(root, entries)
}

/// Pack `entries` (relative to `root`) into a staged tar archive.
pub fn pack(root: &Path, entries: Vec<PathBuf>) -> Result<Archive> {
    let staging = tempfile::Builder::new()
        .prefix("sandcheck-snapshot-")
        .suffix(".tar")
        .tempfile()
        .context("Failed to create staging file for snapshot")?;

    let mut builder = Builder::new(staging.as_file());
    builder.mode(HeaderMode::Deterministic);

    for relative in &entries {
        let source = root.join(relative);
        let read_failed = |e: std::io::Error| SnapshotError::ReadFailed {
            path: source.clone(),
            source: e,
        };
        let mut file = File::open(&source).map_err(read_failed)?;
        builder
            .append_file(relative, &mut file)
            .map_err(read_failed)?;
        debug!(path = %relative.display(), "snapshot:entry added");
    }
    builder.finish().context("Failed to finalize snapshot archive")?;
    drop(builder);

    Ok(Archive {
        file: staging,
        entries,
    })
}
