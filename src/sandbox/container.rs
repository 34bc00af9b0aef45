//! Docker/Podman container sandbox implementation.
//!
//! The container is started detached with a long sleep as its main process,
//! fed the snapshot with `cp -` and driven with `exec`. Dropping the handle
//! force-removes it.

use std::fs::File;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use super::{ExecOutput, Sandbox, SandboxProvider};
use crate::config::{SandboxConfig, SandboxRuntime};
use crate::snapshot::Archive;

/// Starts one throwaway container per `acquire`.
#[derive(Debug, Clone)]
pub struct ContainerProvider {
    runtime: SandboxRuntime,
    image: String,
    workdir: String,
}

impl ContainerProvider {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            runtime: config.runtime(),
            image: config.resolved_image().to_string(),
            workdir: config.workdir().to_string(),
        }
    }
}

impl SandboxProvider for ContainerProvider {
    type Sandbox = ContainerSandbox;

    fn acquire(&self) -> Result<ContainerSandbox> {
        let runtime = self.runtime.binary();
        which::which(runtime).with_context(|| {
            format!("Container runtime '{}' not found in PATH", runtime)
        })?;

        let args = build_run_args(&self.image, &self.workdir);
        debug!(runtime, args = ?args, "container:run");
        let output = Command::new(runtime)
            .args(&args)
            .output()
            .with_context(|| format!("Failed to run {}", runtime))?;
        if !output.status.success() {
            return Err(anyhow!(
                "Failed to start sandbox container from image '{}':\n{}",
                self.image,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let id = String::from_utf8(output.stdout)
            .context("Container id is not valid UTF-8")?
            .trim()
            .to_string();
        if id.is_empty() {
            return Err(anyhow!("{} run did not print a container id", runtime));
        }
        info!(runtime, image = %self.image, container = %id, "container:started");

        Ok(ContainerSandbox {
            runtime: self.runtime,
            id,
            workdir: self.workdir.clone(),
        })
    }
}

/// A running container. Removed on drop.
#[derive(Debug)]
pub struct ContainerSandbox {
    runtime: SandboxRuntime,
    id: String,
    workdir: String,
}

impl Sandbox for ContainerSandbox {
    fn load_archive(&mut self, archive: &Archive) -> Result<()> {
        let runtime = self.runtime.binary();
        let args = build_copy_args(&self.id, &self.workdir);
        debug!(runtime, args = ?args, archive = %archive.path().display(), "container:copy");

        let tar: File = archive.reader()?;
        let output = Command::new(runtime)
            .args(&args)
            .stdin(Stdio::from(tar))
            .output()
            .with_context(|| format!("Failed to run {} cp", runtime))?;
        if !output.status.success() {
            return Err(anyhow!(
                "Failed to copy snapshot into container {}:\n{}",
                self.id,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }

    fn exec(&mut self, command: &str) -> Result<ExecOutput> {
        let runtime = self.runtime.binary();
        let args = build_exec_args(&self.id, &self.workdir, command);
        debug!(runtime, args = ?args, "container:exec");

        let output = Command::new(runtime)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {} exec", runtime))?;

        // Killed by a signal: no exit code to report.
        let exit_code = output.status.code().unwrap_or(-1);
        if !output.stderr.is_empty() {
            debug!(
                container = %self.id,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "container:exec runtime stderr"
            );
        }
        Ok(ExecOutput {
            exit_code,
            output: reported_output(output.stdout, output.stderr),
        })
    }
}

/// The command's merged output, or the runtime's own stderr when the command
/// printed nothing (e.g. `No such container`, exit 125).
fn reported_output(stdout: Vec<u8>, stderr: Vec<u8>) -> Vec<u8> {
    if stdout.is_empty() { stderr } else { stdout }
}

impl Drop for ContainerSandbox {
    fn drop(&mut self) {
        let runtime = self.runtime.binary();
        match Command::new(runtime)
            .args(build_remove_args(&self.id))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
        {
            Ok(output) if output.status.success() => {
                info!(container = %self.id, "container:removed");
            }
            Ok(output) => warn!(
                container = %self.id,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "container:remove failed"
            ),
            Err(e) => warn!(container = %self.id, error = %e, "container:remove failed"),
        }
    }
}

/// Arguments for starting the idle container.
pub(crate) fn build_run_args(image: &str, workdir: &str) -> Vec<String> {
    vec![
        "run".to_string(),
        "--detach".to_string(),
        "--rm".to_string(),
        "--workdir".to_string(),
        workdir.to_string(),
        image.to_string(),
        "sleep".to_string(),
        "infinity".to_string(),
    ]
}

/// Arguments for streaming a tar archive from stdin into `workdir`.
pub(crate) fn build_copy_args(id: &str, workdir: &str) -> Vec<String> {
    vec!["cp".to_string(), "-".to_string(), format!("{}:{}", id, workdir)]
}

/// Arguments for running `command` through the container's `sh`, with
/// stderr folded into stdout.
pub(crate) fn build_exec_args(id: &str, workdir: &str, command: &str) -> Vec<String> {
    vec![
        "exec".to_string(),
        "--workdir".to_string(),
        workdir.to_string(),
        id.to_string(),
        "sh".to_string(),
        "-c".to_string(),
        format!("{} 2>&1", command),
    ]
}

fn build_remove_args(id: &str) -> Vec<String> {
    vec!["rm".to_string(), "--force".to_string(), id.to_string()]
}
