//! Helpers shared by the control-node operations.

use crate::error::{OrchestratorError, Result};
use crate::store::VmRecord;
use fleet_config::FleetConfig;
use fleet_core::CommandOutput;
use fleet_provider::{RemoteConnector, RemoteSession, RemoteTarget};
use tracing::{debug, info, warn};

/// Address of the control node, or `NoControlNodeAddress` if it has none.
pub fn control_node_address<'r>(records: &'r [VmRecord], name: &str) -> Result<&'r str> {
    records
        .iter()
        .find(|record| record.name == name)
        .and_then(|record| record.ip.as_deref())
        .filter(|ip| !ip.trim().is_empty())
        .ok_or_else(|| OrchestratorError::NoControlNodeAddress {
            name: name.to_string(),
        })
}

pub(crate) fn control_target(config: &FleetConfig, address: &str) -> RemoteTarget {
    RemoteTarget::new(
        address,
        config.settings.ssh_port,
        config.credentials.clone(),
    )
}

/// Run `work` over one session to `target`. The session is closed whether
/// `work` succeeds or not; a failed close is logged and does not replace
/// the result of `work`.
pub(crate) fn with_session<T, F>(
    connector: &dyn RemoteConnector,
    target: &RemoteTarget,
    work: F,
) -> Result<T>
where
    F: FnOnce(&mut dyn RemoteSession) -> Result<T>,
{
    info!("Connecting to control node at {}...", target.host);
    let mut session = connector.connect(target)?;

    let result = work(session.as_mut());
    if let Err(close_err) = session.close() {
        warn!("Failed to close session to {}: {}", target.host, close_err);
    }
    result
}

/// Run a command that must succeed. Only the exit status decides; stderr
/// is carried in the error as diagnostic text.
pub(crate) fn run_step(
    session: &mut dyn RemoteSession,
    step: &str,
    command: &str,
) -> Result<CommandOutput> {
    info!("{}...", step);
    debug!("Running on {}: {}", session.host(), command);
    check(step, session.exec(command)?)
}

/// Like [`run_step`] for commands that embed the credential: only the step
/// label is logged.
pub(crate) fn run_sensitive_step(
    session: &mut dyn RemoteSession,
    step: &str,
    command: &str,
) -> Result<CommandOutput> {
    info!("{}...", step);
    check(step, session.exec(command)?)
}

fn check(step: &str, output: CommandOutput) -> Result<CommandOutput> {
    if output.success() {
        if !output.stderr.trim().is_empty() {
            debug!("{} wrote to stderr: {}", step, output.stderr.trim());
        }
        Ok(output)
    } else {
        Err(OrchestratorError::RemoteCommand {
            step: step.to_string(),
            exit_status: output.exit_status,
            detail: output.diagnostic(),
        })
    }
}
