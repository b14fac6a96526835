use anyhow::{Context, Result};
use fleet_config::FleetConfig;
use fleet_orchestrator::{FleetStore, Provisioner, ThreadSleeper, VmRecord};
use fleet_provider::{Hypervisor, VmrunHypervisor};
use tracing::info;

pub fn handle_provision(config: &FleetConfig, store: &FleetStore) -> Result<Vec<VmRecord>> {
    let hypervisor = VmrunHypervisor::new(&config.settings)?;
    let records = store.load()?;
    info!(
        "Provisioning {} VMs from {} with {}",
        records.len(),
        config.base_vm_path.display(),
        hypervisor.name()
    );

    let sleeper = ThreadSleeper;
    let records = Provisioner::new(config, &hypervisor, store, &sleeper)
        .ensure_provisioned(records)
        .context("Provisioning aborted; progress so far is saved in the state file")?;

    info!("All {} VMs are provisioned.", records.len());
    Ok(records)
}
