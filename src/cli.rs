use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::config::SandboxRuntime;
use crate::sandbox::ContainerProvider;
use crate::workflow::{Orchestrator, RunRequest};

#[derive(Parser, Debug)]
#[command(author, version, long_about = None)]
#[command(name = "sandcheck")]
#[command(about = "Copy a project into a throwaway container and run its install and lint commands")]
#[command(after_help = "Commands come from the `sandbox` section of .sandcheck.yaml in the project root.")]
struct Cli {
    /// Path substituted for {file_path} in the configured commands
    file_path: PathBuf,

    /// Project directory to snapshot
    #[arg(short = 'C', long, default_value = ".")]
    root: PathBuf,

    /// Container image (overrides sandbox.image)
    #[arg(long)]
    image: Option<String>,

    /// Container runtime (overrides sandbox.runtime)
    #[arg(long, value_enum)]
    runtime: Option<SandboxRuntime>,
}

impl Cli {
    fn into_request(self) -> RunRequest {
        RunRequest {
            root: self.root,
            file_path: self.file_path.display().to_string(),
            image: self.image,
            runtime: self.runtime,
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut orchestrator = Orchestrator::new(cli.into_request());
    let mut stdout = std::io::stdout().lock();
    let result = orchestrator.run(ContainerProvider::new, &mut stdout);
    debug_assert!(orchestrator.state().is_terminal());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn file_path_is_required() {
        assert!(Cli::try_parse_from(["sandcheck"]).is_err());
    }

    #[test]
    fn parses_defaults() {
        let cli = Cli::try_parse_from(["sandcheck", "src/mod.py"]).unwrap();
        let request = cli.into_request();
        assert_eq!(request.file_path, "src/mod.py");
        assert_eq!(request.root, PathBuf::from("."));
        assert!(request.image.is_none());
        assert!(request.runtime.is_none());
    }

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from([
            "sandcheck",
            "-C",
            "/work/project",
            "--image",
            "node:20",
            "--runtime",
            "podman",
            "index.ts",
        ])
        .unwrap();
        let request = cli.into_request();
        assert_eq!(request.root, PathBuf::from("/work/project"));
        assert_eq!(request.image.as_deref(), Some("node:20"));
        assert_eq!(request.runtime, Some(SandboxRuntime::Podman));
    }
}
