//! Shell quoting utilities.

/// Escape single quotes within a string for use inside a single-quoted shell argument.
///
/// The caller is responsible for wrapping the result in single quotes.
/// Example: `format!("'{}'", shell_escape(s))`
pub fn shell_escape(s: &str) -> String {
    s.replace('\'', "'\"'\"'")
}

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c)
}

/// Quote a string so a POSIX shell reads it back as exactly one word.
///
/// Strings made only of safe characters are returned unchanged. Anything else
/// is wrapped in single quotes, with embedded single quotes closed, emitted in
/// double quotes and reopened. Empty strings return `''`.
pub fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(is_safe) {
        s.to_string()
    } else {
        format!("'{}'", shell_escape(s))
    }
}

/// Wrap a command so it runs under `bash -c` as one opaque argument.
///
/// Pipes, redirects and quotes in `command` are preserved for the inner bash
/// instead of being interpreted by whatever shell splits the outer line.
pub fn wrap_in_bash(command: &str) -> String {
    format!("bash -c {}", shell_quote(command))
}
