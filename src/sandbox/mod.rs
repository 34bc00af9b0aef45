//! Isolated execution contexts that receive a snapshot and run commands.
//!
//! A sandbox is released when its handle is dropped, so every exit path of
//! a run (success, error, or unwinding) tears it down exactly once.

mod container;

use anyhow::Result;

use crate::snapshot::Archive;

pub use container::ContainerProvider;

/// Exit status and merged stdout/stderr of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub output: Vec<u8>,
}

/// An acquired execution context.
pub trait Sandbox {
    /// Unpack `archive` under the sandbox working directory, all or nothing.
    fn load_archive(&mut self, archive: &Archive) -> Result<()>;

    /// Run a command line through the sandbox's own shell.
    fn exec(&mut self, command: &str) -> Result<ExecOutput>;
}

/// Creates sandboxes. The returned handle owns the context until dropped.
pub trait SandboxProvider {
    type Sandbox: Sandbox;

    fn acquire(&self) -> Result<Self::Sandbox>;
}
