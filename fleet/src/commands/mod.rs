// Command handlers for fleet operations

use crate::cli::{Args, Command};
use anyhow::{Context, Result};
use fleet_config::FleetConfig;
use fleet_orchestrator::FleetStore;
use tracing::{debug, info};

pub mod control;
pub mod power;
pub mod provision;
pub mod status;

/// Main command dispatcher
#[must_use = "command execution results should be handled"]
pub fn execute_command(args: Args) -> Result<()> {
    let config =
        FleetConfig::load(args.config.clone()).context("Failed to load fleet configuration")?;
    let store = FleetStore::new(config.settings.state_file.clone());

    match args.command {
        Command::Provision => {
            debug!("Handling provision command");
            provision::handle_provision(&config, &store).map(|_| ())
        }
        Command::Bootstrap => {
            debug!("Handling bootstrap command");
            control::handle_bootstrap(&config, &store)
        }
        Command::Playbooks { manifest } => {
            debug!("Handling playbooks command");
            let manifest = control::load_manifest(&config, manifest.as_deref())?;
            control::handle_playbooks(&config, &store, &manifest)
        }
        Command::Boot => {
            debug!("Handling boot command");
            power::handle_boot(&config, &store)
        }
        Command::Stop { skip_stopped } => {
            debug!("Handling stop command with skip_stopped={}", skip_stopped);
            power::handle_stop(&config, &store, skip_stopped)
        }
        Command::Status => {
            debug!("Handling status command");
            status::handle_status(&config, &store)
        }
        Command::Up => {
            debug!("Handling up command");
            // A bad manifest must fail before any VM or the control node is touched
            let manifest = control::load_manifest(&config, None)?;
            provision::handle_provision(&config, &store)?;
            control::handle_bootstrap(&config, &store)?;
            control::handle_playbooks(&config, &store, &manifest)?;
            info!("Fleet is up.");
            Ok(())
        }
    }
}
