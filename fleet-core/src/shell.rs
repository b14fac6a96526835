//! Quoting for strings that end up inside a remote `sh -c` command line.

/// Escape a string for POSIX shell execution.
///
/// Plain words are returned unchanged; anything else is wrapped in single
/// quotes with embedded single quotes closed, escaped and reopened.
pub fn shell_escape(arg: &str) -> String {
    if !arg.is_empty()
        && arg.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '=' | ':' | '@')
        })
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\"'\"'"))
    }
}
