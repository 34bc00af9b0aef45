//! Exclusion rules for snapshots.
//!
//! Patterns follow gitignore syntax and are compiled with the `ignore` crate.
//! The version-control metadata directory is always excluded on top of them.

use std::path::Path;

use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};

/// Version-control metadata directory, never part of a snapshot.
pub const VCS_DIR: &str = ".git";

/// Compiled exclusion rules for one run.
#[derive(Debug)]
pub struct IgnoreMatcher {
    gitignore: Gitignore,
    literals: Vec<String>,
}

impl IgnoreMatcher {
    /// Compile raw ignore-file lines.
    ///
    /// The lines go to the pattern compiler untouched, comments included.
    /// A separate plain-string list (no comments, no blank lines, slashes
    /// trimmed, plus [`VCS_DIR`]) is kept for reporting only.
    pub fn compile<S: AsRef<str>>(root: &Path, lines: &[S]) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        for line in lines {
            builder
                .add_line(None, line.as_ref())
                .with_context(|| format!("Invalid ignore pattern: {}", line.as_ref()))?;
        }
        let gitignore = builder.build().context("Failed to compile ignore patterns")?;

        let mut literals: Vec<String> = lines
            .iter()
            .map(|l| l.as_ref().trim())
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| l.trim_matches('/').to_string())
            .collect();
        literals.push(VCS_DIR.to_string());

        Ok(Self {
            gitignore,
            literals,
        })
    }

    /// A matcher with no patterns; only [`VCS_DIR`] is excluded.
    #[cfg(test)]
    pub fn empty(root: &Path) -> Self {
        Self::compile::<&str>(root, &[]).expect("empty pattern set always compiles")
    }

    /// Whether the file at `relative` (relative to the snapshot root) is excluded.
    ///
    /// A file is excluded when its path begins with [`VCS_DIR`], or when it or any of
    /// its parent directories matches the patterns (last match wins, so `!`
    /// negations re-include).
    pub fn matches(&self, relative: &Path) -> bool {
        if is_vcs_path(relative) {
            return true;
        }
        self.gitignore
            .matched_path_or_any_parents(relative, false)
            .is_ignore()
    }

    /// Plain exclusion strings, for display.
    pub fn literals(&self) -> &[String] {
        &self.literals
    }
}

/// True when `relative` begins with the metadata directory name.
///
/// This is a plain prefix test, so `.gitignore`, `.gitattributes` and
/// `.github/` are excluded along with `.git/`.
pub fn is_vcs_path(relative: &Path) -> bool {
    relative.to_string_lossy().starts_with(VCS_DIR)
}
