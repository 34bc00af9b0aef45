//! Top-level run: load config, start a sandbox, copy the snapshot in, and
//! run the install and check stages.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use console::style;
use tracing::{error, info};

use crate::config::{Config, SandboxConfig, SandboxRuntime, read_ignore_lines};
use crate::pipeline::{self, Stage};
use crate::sandbox::{Sandbox, SandboxProvider};
use crate::snapshot::{self, IgnoreMatcher, SnapshotOptions};
use crate::spinner;

/// Where a run is. `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    ConfigLoaded,
    SandboxAcquired,
    SnapshotLoaded,
    InstallRunning,
    CheckRunning,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::ConfigLoaded => "config-loaded",
            RunState::SandboxAcquired => "sandbox-acquired",
            RunState::SnapshotLoaded => "snapshot-loaded",
            RunState::InstallRunning => "install-running",
            RunState::CheckRunning => "check-running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What to run, as given on the command line.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Directory that is snapshotted and holds the config and ignore files
    pub root: PathBuf,
    /// Substituted for `{file_path}` in command templates
    pub file_path: String,
    pub image: Option<String>,
    pub runtime: Option<SandboxRuntime>,
}

impl RunRequest {
    fn apply_overrides(&self, config: &mut SandboxConfig) {
        if let Some(image) = &self.image {
            config.image = Some(image.clone());
        }
        if let Some(runtime) = self.runtime {
            config.runtime = Some(runtime);
        }
    }
}

/// Drives one run through its states.
pub struct Orchestrator {
    request: RunRequest,
    state: RunState,
}

impl Orchestrator {
    pub fn new(request: RunRequest) -> Self {
        Self {
            request,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        info!(from = %self.state, to = %next, "workflow:state");
        self.state = next;
    }

    /// Run to completion.
    ///
    /// `make_provider` receives the loaded config and supplies the sandbox
    /// provider. The sandbox is released before this returns, on success and
    /// on every error. Errors are reported to `out` and then returned.
    pub fn run<P, F>(&mut self, make_provider: F, out: &mut dyn Write) -> Result<()>
    where
        P: SandboxProvider,
        F: FnOnce(&SandboxConfig) -> P,
    {
        match self.run_inner(make_provider, out) {
            Ok(()) => {
                self.transition(RunState::Succeeded);
                writeln!(out, "{}", style("Success!").bold().green())?;
                Ok(())
            }
            Err(err) => {
                error!(state = %self.state, error = ?err, "workflow:failed");
                self.transition(RunState::Failed);
                let _ = writeln!(out, "{}", style(format!("Error: {:#}", err)).bold().red());
                Err(err)
            }
        }
    }

    fn run_inner<P, F>(&mut self, make_provider: F, out: &mut dyn Write) -> Result<()>
    where
        P: SandboxProvider,
        F: FnOnce(&SandboxConfig) -> P,
    {
        let root = self.request.root.clone();
        let file_path = self.request.file_path.clone();

        writeln!(out, "\n{}\n", style("Getting sandbox config...").bold().white().on_cyan())?;
        let mut config = Config::load(&root)?;
        self.request.apply_overrides(&mut config);
        let ignore_lines = read_ignore_lines(&root)?;
        let matcher = IgnoreMatcher::compile(&root, &ignore_lines)?;
        self.transition(RunState::ConfigLoaded);

        writeln!(out, "Running sandbox with the following settings:\n")?;
        let settings = serde_yaml::to_string(&config).context("Failed to render settings")?;
        writeln!(out, "{}", settings.trim_end())?;
        writeln!(out, "exclude: {}", matcher.literals().join(", "))?;

        let provider = make_provider(&config);
        writeln!(out, "\n{}\n", style("Spinning up sandbox container").bold().white().on_cyan())?;
        let mut sandbox = spinner::with_spinner("Starting sandbox", || provider.acquire())?;
        self.transition(RunState::SandboxAcquired);

        self.load_snapshot(&mut sandbox, &root, &matcher, &config, out)?;
        self.transition(RunState::SnapshotLoaded);

        pipeline::run_stages(&mut sandbox, &config, &file_path, out, |stage| {
            self.transition(match stage {
                Stage::Install => RunState::InstallRunning,
                Stage::Check => RunState::CheckRunning,
            })
        })?;

        drop(sandbox);
        Ok(())
    }

    fn load_snapshot<S: Sandbox>(
        &self,
        sandbox: &mut S,
        root: &std::path::Path,
        matcher: &IgnoreMatcher,
        config: &SandboxConfig,
        out: &mut dyn Write,
    ) -> Result<()> {
        writeln!(out, "{}", style("Copying files into sandbox").bold())?;
        let options = SnapshotOptions {
            follow_symlinks: config.follow_symlinks(),
        };
        let archive = spinner::with_spinner("Packing files", || {
            snapshot::build(root, matcher, options)
        })?;
        spinner::with_spinner(
            &format!("Copying {} files into sandbox", archive.entries().len()),
            || sandbox.load_archive(&archive),
        )?;
        info!(files = archive.entries().len(), "workflow:snapshot loaded");
        writeln!(out, "Done copying files into container")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandFailed;
    use crate::sandbox::testing::FakeProvider;
    use crate::snapshot::SnapshotError;
    use std::fs;
    use tempfile::TempDir;

    fn request(root: &std::path::Path, file_path: &str) -> RunRequest {
        RunRequest {
            root: root.to_path_buf(),
            file_path: file_path.to_string(),
            image: None,
            runtime: None,
        }
    }

    fn write(root: &std::path::Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn empty_config_succeeds_without_exec() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.py", "a\n");
        let provider = FakeProvider::new();
        let mut orchestrator = Orchestrator::new(request(temp.path(), "a.py"));
        let mut out = Vec::new();

        orchestrator.run(|_| provider.clone(), &mut out).unwrap();

        assert_eq!(orchestrator.state(), RunState::Succeeded);
        let journal = provider.journal.borrow();
        assert!(journal.executed.is_empty());
        assert_eq!(journal.acquired, 1);
        assert_eq!(journal.released, 1);
        assert!(String::from_utf8(out.clone()).unwrap().contains("Success!"));
    }

    #[test]
    fn loads_filtered_snapshot() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "a.py", "print('a')\n");
        write(root, "b.py", "print('b')\n");
        write(root, ".git/config", "[core]\n");
        fs::write(root.join(".gitignore"), "b.py\n").unwrap();
        let provider = FakeProvider::new();
        let mut out = Vec::new();

        Orchestrator::new(request(root, "a.py"))
            .run(|_| provider.clone(), &mut out)
            .unwrap();

        let journal = provider.journal.borrow();
        let loaded: Vec<_> = journal.loaded.keys().map(String::as_str).collect();
        assert_eq!(loaded, ["a.py"]);
        assert_eq!(journal.loaded["a.py"], b"print('a')\n");
    }

    #[test]
    fn install_failure_halts_and_releases() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "src/mod.py", "x = 1\n");
        fs::write(
            root.join(".sandcheck.yaml"),
            "sandbox:\n  install:\n    - pip install -e .\n    - echo done\n  check:\n    - flake8 {file_path}\n",
        )
        .unwrap();
        let provider = FakeProvider::with_results(&[(1, "ERROR: no setup.py\n")]);
        let mut orchestrator = Orchestrator::new(request(root, "src/mod.py"));
        let mut out = Vec::new();

        let err = orchestrator.run(|_| provider.clone(), &mut out).unwrap_err();

        assert_eq!(orchestrator.state(), RunState::Failed);
        assert!(err.downcast_ref::<CommandFailed>().is_some());
        assert_eq!(provider.executed(), ["bash -c 'pip install -e .'"]);
        let journal = provider.journal.borrow();
        assert_eq!(journal.acquired, 1);
        assert_eq!(journal.released, 1);
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("Error: "));
        assert!(shown.contains("ERROR: no setup.py"));
    }

    #[test]
    fn check_commands_receive_file_path() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "src/mod.py", "x = 1\n");
        fs::write(
            root.join(".sandcheck.yaml"),
            "sandbox:\n  check:\n    - flake8 {file_path}\n",
        )
        .unwrap();
        let provider = FakeProvider::new();

        Orchestrator::new(request(root, "src/mod.py"))
            .run(|_| provider.clone(), &mut Vec::new())
            .unwrap();

        assert_eq!(provider.executed(), ["bash -c 'flake8 src/mod.py'"]);
    }

    #[test]
    fn acquire_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        let provider = FakeProvider::failing_acquire();
        let mut orchestrator = Orchestrator::new(request(temp.path(), "x"));
        let mut out = Vec::new();

        let result = orchestrator.run(|_| provider.clone(), &mut out);

        assert!(result.is_err());
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert_eq!(provider.journal.borrow().released, 0);
    }

    #[test]
    fn load_failure_releases_without_running_commands() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "a.py", "a\n");
        fs::write(
            temp.path().join(".sandcheck.yaml"),
            "sandbox:\n  install: [make]\n",
        )
        .unwrap();
        let provider = FakeProvider::failing_load();
        let mut orchestrator = Orchestrator::new(request(temp.path(), "a.py"));

        let result = orchestrator.run(|_| provider.clone(), &mut Vec::new());

        assert!(result.is_err());
        let journal = provider.journal.borrow();
        assert!(journal.executed.is_empty());
        assert_eq!(journal.acquired, 1);
        assert_eq!(journal.released, 1);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_snapshot_aborts_before_commands() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "a.py", "a\n");
        std::os::unix::fs::symlink(root.join("missing.py"), root.join("b.py")).unwrap();
        fs::write(
            root.join(".sandcheck.yaml"),
            "sandbox:\n  follow_symlinks: true\n  install: [make]\n  check:\n    - flake8 {file_path}\n",
        )
        .unwrap();
        let provider = FakeProvider::new();
        let mut orchestrator = Orchestrator::new(request(root, "a.py"));

        let err = orchestrator.run(|_| provider.clone(), &mut Vec::new()).unwrap_err();

        assert!(err.downcast_ref::<SnapshotError>().is_some());
        assert_eq!(orchestrator.state(), RunState::Failed);
        let journal = provider.journal.borrow();
        assert!(journal.loaded.is_empty());
        assert!(journal.executed.is_empty());
        assert_eq!(journal.acquired, 1);
        assert_eq!(journal.released, 1);
    }

    #[test]
    fn overrides_reach_provider_config() {
        let temp = TempDir::new().unwrap();
        let provider = FakeProvider::new();
        let mut seen = None;
        let mut req = request(temp.path(), "x");
        req.image = Some("node:20".to_string());
        req.runtime = Some(SandboxRuntime::Podman);

        Orchestrator::new(req)
            .run(
                |config| {
                    seen = Some(config.clone());
                    provider.clone()
                },
                &mut Vec::new(),
            )
            .unwrap();

        let seen = seen.unwrap();
        assert_eq!(seen.resolved_image(), "node:20");
        assert_eq!(seen.runtime(), SandboxRuntime::Podman);
    }

    #[test]
    fn terminal_states() {
        assert!(RunState::Succeeded.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(!RunState::CheckRunning.is_terminal());
        assert_eq!(RunState::SnapshotLoaded.to_string(), "snapshot-loaded");
    }
}
