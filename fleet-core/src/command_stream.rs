// Standard library
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, ErrorKind};

// External crates
use crate::error::{FleetError, Result};
use crate::output::CommandOutput;
use duct::cmd;
use tracing::{debug, info};
use which::which;

fn render_command<A: AsRef<OsStr>>(command: &str, args: &[A]) -> String {
    let mut rendered = command.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.as_ref().to_string_lossy());
    }
    rendered
}

fn spawn_error(command: &str, full_command: &str, err: std::io::Error) -> FleetError {
    if err.kind() == ErrorKind::NotFound {
        FleetError::Dependency(format!("'{command}' is not installed or not in PATH"))
    } else {
        FleetError::Command(format!("{full_command}: {err}"))
    }
}

/// Run a command, forwarding each output line to the log.
///
/// A non-zero exit status is reported as [`FleetError::Command`] naming the
/// full command line.
pub fn stream_command<A: AsRef<OsStr>>(command: &str, args: &[A]) -> Result<()> {
    let full_command = render_command(command, args);
    debug!("Running: {}", full_command);

    let reader = cmd(command, args)
        .stderr_to_stdout()
        .reader()
        .map_err(|e| spawn_error(command, &full_command, e))?;

    for line in BufReader::new(reader).lines() {
        match line {
            Ok(line) => info!("{}", line),
            Err(e) => {
                return Err(FleetError::Command(format!("{full_command}: {e}")));
            }
        }
    }

    Ok(())
}

/// Run a command to completion and capture stdout, stderr and exit status.
///
/// Only a failure to spawn is an error here; the caller decides what a
/// non-zero exit status means.
pub fn capture_command<A: AsRef<OsStr>>(command: &str, args: &[A]) -> Result<CommandOutput> {
    let full_command = render_command(command, args);
    debug!("Capturing: {}", full_command);

    let output = cmd(command, args)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .map_err(|e| spawn_error(command, &full_command, e))?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        // Killed by a signal: no code, report it as a generic failure.
        exit_status: output.status.code().unwrap_or(-1),
    })
}

/// Checks if a command-line tool is available in the system's PATH.
pub fn is_tool_installed(tool_name: &str) -> bool {
    which(tool_name).is_ok()
}
