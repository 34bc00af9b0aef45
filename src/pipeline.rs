//! The install and check stages, run strictly in order.

use std::fmt;
use std::io::Write;

use anyhow::Result;
use console::style;
use tracing::info;

use crate::config::SandboxConfig;
use crate::runner;
use crate::sandbox::Sandbox;

/// A named group of commands from the `sandbox` config section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Install,
    Check,
}

impl Stage {
    /// Stages in execution order.
    pub const ALL: [Stage; 2] = [Stage::Install, Stage::Check];

    pub fn commands(self, config: &SandboxConfig) -> &[String] {
        match self {
            Stage::Install => config.install(),
            Stage::Check => config.check(),
        }
    }

    fn banner(self) -> &'static str {
        match self {
            Stage::Install => "Running installation scripts...",
            Stage::Check => "Running linter scripts...",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Install => write!(f, "install"),
            Stage::Check => write!(f, "check"),
        }
    }
}

/// Run every install command, then every check command.
///
/// `on_stage` is called as each stage begins. The first failing command
/// stops the pipeline: nothing after it runs, in that stage or the next.
pub fn run_stages<S: Sandbox + ?Sized>(
    sandbox: &mut S,
    config: &SandboxConfig,
    file_path: &str,
    out: &mut dyn Write,
    mut on_stage: impl FnMut(Stage),
) -> Result<()> {
    for stage in Stage::ALL {
        on_stage(stage);
        let commands = stage.commands(config);
        writeln!(out, "\n{}", style(stage.banner()).bold().white().on_cyan())?;
        for (idx, command) in commands.iter().enumerate() {
            info!(%stage, step = idx + 1, total = commands.len(), command = %command, "pipeline:command start");
            runner::run_command(&mut *sandbox, command, file_path, out)?;
        }
        info!(%stage, total = commands.len(), "pipeline:stage complete");
    }
    Ok(())
}
