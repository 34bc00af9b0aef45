use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Project config file names, checked in order inside the snapshot root.
const CONFIG_NAMES: [&str; 3] = [".sandcheck.yaml", ".sandcheck.yml", "sweep.yaml"];

/// Ignore file read from the snapshot root.
pub const IGNORE_FILE: &str = ".gitignore";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to parse config at {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Container runtime for the sandbox
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SandboxRuntime {
    /// Docker (default)
    #[default]
    Docker,
    /// Podman
    Podman,
}

impl SandboxRuntime {
    /// Name of the runtime CLI binary.
    pub fn binary(&self) -> &'static str {
        match self {
            SandboxRuntime::Docker => "docker",
            SandboxRuntime::Podman => "podman",
        }
    }
}

/// The `sandbox` section of the project config.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct SandboxConfig {
    /// Commands that prepare the environment (e.g. `pip install -e .`).
    /// May reference `{file_path}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<Vec<String>>,

    /// Lint/check commands run after every install command succeeded.
    /// May reference `{file_path}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<Vec<String>>,

    /// Container image. Default: "python:3.12-bookworm"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Container runtime. Default: docker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<SandboxRuntime>,

    /// Directory inside the container that receives the snapshot and is used
    /// as the working directory for every command. Default: "/repo"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,

    /// Archive symlink targets instead of skipping symlinks. Default: false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_symlinks: Option<bool>,
}

impl SandboxConfig {
    pub fn install(&self) -> &[String] {
        self.install.as_deref().unwrap_or_default()
    }

    pub fn check(&self) -> &[String] {
        self.check.as_deref().unwrap_or_default()
    }

    pub fn resolved_image(&self) -> &str {
        self.image.as_deref().unwrap_or("python:3.12-bookworm")
    }

    pub fn runtime(&self) -> SandboxRuntime {
        self.runtime.unwrap_or_default()
    }

    pub fn workdir(&self) -> &str {
        self.workdir.as_deref().unwrap_or("/repo")
    }

    pub fn follow_symlinks(&self) -> bool {
        self.follow_symlinks.unwrap_or(false)
    }
}

/// Configuration read from `.sandcheck.yaml`
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Container sandbox configuration
    #[serde(default)]
    pub sandbox: Option<SandboxConfig>,
}

impl Config {
    /// Load the project config from `root`.
    ///
    /// A missing file, an empty file, or a missing `sandbox` section all
    /// produce the defaults: no install and no check commands.
    pub fn load(root: &Path) -> anyhow::Result<SandboxConfig> {
        for name in CONFIG_NAMES {
            let path = root.join(name);
            if let Some(config) = Self::load_from_path(&path)? {
                debug!(path = %path.display(), "config:loaded");
                return Ok(config.sandbox.unwrap_or_default());
            }
        }
        debug!(root = %root.display(), "config:no project config, using defaults");
        Ok(SandboxConfig::default())
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }
        debug!(path = %path.display(), "config:reading file");
        let contents = fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Some(Self::default()));
        }
        let config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Some(config))
    }
}

/// Read the ignore file from `root` as raw lines.
///
/// A missing file yields no lines. Comments and blank lines are kept; the
/// pattern compiler decides what they mean.
pub fn read_ignore_lines(root: &Path) -> anyhow::Result<Vec<String>> {
    let path = root.join(IGNORE_FILE);
    match fs::read_to_string(&path) {
        Ok(contents) => Ok(contents.lines().map(str::to_string).collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config:no ignore file");
            Ok(Vec::new())
        }
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("Failed to read ignore file {}", path.display()))),
    }
}
