use anyhow::Result;
use fleet_config::{FleetConfig, StopPolicy};
use fleet_orchestrator::{FleetStore, LifecycleController};
use fleet_provider::VmrunHypervisor;
use tracing::info;

pub fn handle_boot(config: &FleetConfig, store: &FleetStore) -> Result<()> {
    let hypervisor = VmrunHypervisor::new(&config.settings)?;
    let records = store.load()?;

    let booted = LifecycleController::new(&hypervisor, config.settings.stop_policy)
        .boot_all(&records)?;
    info!("Booted {} VMs", booted);
    Ok(())
}

pub fn handle_stop(config: &FleetConfig, store: &FleetStore, skip_stopped: bool) -> Result<()> {
    let hypervisor = VmrunHypervisor::new(&config.settings)?;
    let records = store.load()?;
    let policy = if skip_stopped {
        StopPolicy::SkipStopped
    } else {
        config.settings.stop_policy
    };

    let stopped = LifecycleController::new(&hypervisor, policy).stop_all(&records)?;
    info!("Stopped {} VMs", stopped);
    Ok(())
}
