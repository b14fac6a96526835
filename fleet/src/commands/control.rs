//! Commands that work through the control node.

use anyhow::{Context, Result};
use fleet_config::{FleetConfig, PlaybookManifest};
use fleet_orchestrator::{Bootstrapper, FleetStore, PlaybookRunner};
use fleet_provider::SshConnector;
use std::path::Path;
use tracing::{error, info, warn};

pub fn handle_bootstrap(config: &FleetConfig, store: &FleetStore) -> Result<()> {
    let records = store.load()?;
    let connector = SshConnector::default();

    let hosts = Bootstrapper::new(config, &connector)
        .bootstrap_control_node(&records)
        .context("Control node bootstrap failed")?;

    info!(
        "{} now manages {} hosts",
        config.settings.control_node,
        hosts.len()
    );
    Ok(())
}

/// Load the manifest and check it against the local playbook directory.
pub fn load_manifest(
    config: &FleetConfig,
    manifest_path: Option<&Path>,
) -> Result<PlaybookManifest> {
    let manifest_path = manifest_path.unwrap_or(config.settings.manifest_file.as_path());
    let manifest = PlaybookManifest::load(manifest_path)?;
    manifest.validate(&config.settings.playbooks_dir)?;
    Ok(manifest)
}

pub fn handle_playbooks(
    config: &FleetConfig,
    store: &FleetStore,
    manifest: &PlaybookManifest,
) -> Result<()> {
    let records = store.load()?;
    let connector = SshConnector::default();

    let report = PlaybookRunner::new(config, &connector).run_playbooks(&records, manifest)?;

    for run in &report.failed {
        error!(
            "{} {} ({}) exited with status {}",
            run.entry, run.action, run.artifact, run.exit_status
        );
    }
    if !report.is_success() {
        warn!(
            "{} of {} playbook runs failed",
            report.failed.len(),
            report.total()
        );
    }
    Ok(())
}
