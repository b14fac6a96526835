//! Captured result of a finished command, local or remote.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: i32,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_status: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_status,
        }
    }

    /// The exit status is the only success signal. Output on stderr is
    /// diagnostic text and does not make a command fail.
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    /// Best diagnostic for a failed command: stderr if it said anything,
    /// otherwise the tail of stdout.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }

        let tail: Vec<&str> = self.stdout.lines().rev().take(20).collect();
        tail.into_iter().rev().collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_ignores_stderr() {
        let output = CommandOutput::new("", "Number of key(s) added: 1", 0);
        assert!(output.success());

        let silent = CommandOutput::new("", "", 0);
        assert!(silent.success());

        let failed = CommandOutput::new("partial output", "", 2);
        assert!(!failed.success());
    }

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let output = CommandOutput::new("line one\nline two", "boom\n", 1);
        assert_eq!(output.diagnostic(), "boom");

        let no_stderr = CommandOutput::new("line one\nline two", "  ", 1);
        assert_eq!(no_stderr.diagnostic(), "line one\nline two");
    }
}
