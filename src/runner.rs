//! Runs a single configured command inside a sandbox.

use std::io::Write;

use anyhow::{Context, Result};
use console::style;
use tracing::{debug, info};

use crate::sandbox::Sandbox;
use crate::shell::wrap_in_bash;

/// Placeholder substituted with the CLI's path argument.
pub const FILE_PATH_PLACEHOLDER: &str = "{file_path}";

/// Output longer than this many lines is summarized for display.
const MAX_DISPLAY_LINES: usize = 10;
/// Lines kept from each end of a summarized output.
const SUMMARY_EDGE_LINES: usize = 5;

/// A command exited with a status that is not accepted as success.
#[derive(Debug, thiserror::Error)]
#[error("Command `{command}` failed with exit code {exit_code}:\n{output}")]
pub struct CommandFailed {
    pub command: String,
    pub exit_code: i32,
    /// Full, untruncated output.
    pub output: String,
}

/// Substitute `file_path` into a command template.
///
/// `{file_path}` is replaced, `{{` and `}}` collapse to single braces, and any
/// other brace text is kept as written.
pub fn render_command(template: &str, file_path: &str) -> String {
    let mut rendered = String::with_capacity(template.len() + file_path.len());
    let mut rest = template;
    while let Some(idx) = rest.find(['{', '}']) {
        rendered.push_str(&rest[..idx]);
        let tail = &rest[idx..];
        if let Some(after) = tail.strip_prefix(FILE_PATH_PLACEHOLDER) {
            rendered.push_str(file_path);
            rest = after;
        } else if tail.starts_with("{{") || tail.starts_with("}}") {
            rendered.push_str(&tail[..1]);
            rest = &tail[2..];
        } else {
            rendered.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }
    rendered.push_str(rest);
    rendered
}

/// Shorten long output to its first and last few lines around a `...` marker.
///
/// Output of ten lines or fewer is returned unchanged.
pub fn summarize_logs(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    if lines.len() <= MAX_DISPLAY_LINES {
        return output.to_string();
    }
    let head = lines[..SUMMARY_EDGE_LINES].join("\n");
    let tail = lines[lines.len() - SUMMARY_EDGE_LINES..].join("\n");
    format!("{}\n...\n{}", head, tail)
}

/// Whether a command finishing with `exit_code` counts as success.
///
/// Prettier exits with 2 after rewriting files; that is tolerated for any
/// command template that mentions it.
pub fn is_success(command: &str, exit_code: i32) -> bool {
    exit_code == 0 || (exit_code == 2 && command.contains("prettier"))
}

/// Render, run and classify one command template.
///
/// Returns the full decoded output on success and [`CommandFailed`] otherwise.
pub fn run_command<S: Sandbox + ?Sized>(
    sandbox: &mut S,
    template: &str,
    file_path: &str,
    out: &mut dyn Write,
) -> Result<String> {
    let command = render_command(template, file_path);
    writeln!(out, "\n{}\n", style(format!("Running `{}`", command)).bold())?;

    let wrapped = wrap_in_bash(&command);
    debug!(command = %command, wrapped = %wrapped, "runner:exec");
    let result = sandbox
        .exec(&wrapped)
        .with_context(|| format!("Failed to execute `{}` in sandbox", command))?;

    let output = String::from_utf8_lossy(&result.output).into_owned();
    if !output.is_empty() {
        writeln!(out, "{}", summarize_logs(&output))?;
    }

    if !is_success(template, result.exit_code) {
        info!(command = %command, exit_code = result.exit_code, "runner:command failed");
        return Err(CommandFailed {
            command,
            exit_code: result.exit_code,
            output,
        }
        .into());
    }
    info!(command = %command, exit_code = result.exit_code, "runner:command succeeded");
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::testing::FakeProvider;

    fn numbered(n: usize) -> String {
        (1..=n).map(|i| format!("line {}\n", i)).collect()
    }

    #[test]
    fn render_substitutes_file_path() {
        assert_eq!(render_command("flake8 {file_path}", "src/mod.py"), "flake8 src/mod.py");
        assert_eq!(
            render_command("cp {file_path} /tmp/{file_path}.bak", "a.py"),
            "cp a.py /tmp/a.py.bak"
        );
        assert_eq!(render_command("pip install -e .", "a.py"), "pip install -e .");
    }

    #[test]
    fn render_unescapes_double_braces() {
        assert_eq!(
            render_command("awk '{{print $1}}' {file_path}", "x"),
            "awk '{print $1}' x"
        );
    }

    #[test]
    fn render_keeps_unknown_braces() {
        assert_eq!(
            render_command("find . -name '*.py' -exec black {} +", "x"),
            "find . -name '*.py' -exec black {} +"
        );
        assert_eq!(render_command("echo ${HOME}", "x"), "echo ${HOME}");
    }

    #[test]
    fn short_output_is_unmodified() {
        let output = numbered(3);
        assert_eq!(summarize_logs(&output), output);
        let ten = numbered(10);
        assert_eq!(summarize_logs(&ten), ten);
    }

    #[test]
    fn long_output_keeps_head_and_tail() {
        let summary = summarize_logs(&numbered(20));
        let expected = "line 1\nline 2\nline 3\nline 4\nline 5\n...\n\
                        line 16\nline 17\nline 18\nline 19\nline 20";
        assert_eq!(summary, expected);
    }

    #[test]
    fn prettier_exit_two_is_tolerated() {
        assert!(is_success("npx prettier --write {file_path}", 2));
        assert!(!is_success("npx prettier --write .", 1));
        assert!(!is_success("npx prettier --write .", 3));
        assert!(!is_success("eslint .", 2));
        assert!(is_success("eslint .", 0));
    }

    #[test]
    fn run_wraps_command_in_bash() {
        let provider = FakeProvider::with_results(&[(0, "ok\n")]);
        let mut sandbox = provider.sandbox();
        let mut out = Vec::new();

        let output = run_command(&mut sandbox, "flake8 {file_path} | head", "src/mod.py", &mut out)
            .unwrap();

        assert_eq!(output, "ok\n");
        assert_eq!(provider.executed(), ["bash -c 'flake8 src/mod.py | head'"]);
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("Running `flake8 src/mod.py | head`"));
        assert!(shown.contains("ok"));
    }

    #[test]
    fn failure_carries_full_output() {
        let long = numbered(20);
        let provider = FakeProvider::with_results(&[(1, long.as_str())]);
        let mut sandbox = provider.sandbox();
        let mut out = Vec::new();

        let err = run_command(&mut sandbox, "pytest", "x", &mut out).unwrap_err();

        let failed = err.downcast_ref::<CommandFailed>().unwrap();
        assert_eq!(failed.exit_code, 1);
        assert_eq!(failed.command, "pytest");
        assert_eq!(failed.output, long);
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("..."));
        assert!(!shown.contains("line 10\n"));
    }

    #[test]
    fn prettier_exit_two_passes_through_run() {
        let provider = FakeProvider::with_results(&[(2, "reformatted\n")]);
        let mut sandbox = provider.sandbox();
        let mut out = Vec::new();

        let output =
            run_command(&mut sandbox, "prettier --write {file_path}", "a.ts", &mut out).unwrap();
        assert_eq!(output, "reformatted\n");
    }

    #[test]
    fn empty_output_prints_only_banner() {
        let provider = FakeProvider::new();
        let mut sandbox = provider.sandbox();
        let mut out = Vec::new();

        run_command(&mut sandbox, "true", "x", &mut out).unwrap();

        let shown = String::from_utf8(out).unwrap();
        assert_eq!(console::strip_ansi_codes(&shown).trim(), "Running `true`");
    }
}
