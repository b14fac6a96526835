use crate::error::{OrchestratorError, Result};
use crate::store::VmRecord;
use fleet_config::StopPolicy;
use fleet_provider::Hypervisor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bulk start and stop of provisioned VMs.
pub struct LifecycleController<'a> {
    hypervisor: &'a dyn Hypervisor,
    stop_policy: StopPolicy,
}

impl<'a> LifecycleController<'a> {
    pub fn new(hypervisor: &'a dyn Hypervisor, stop_policy: StopPolicy) -> Self {
        Self {
            hypervisor,
            stop_policy,
        }
    }

    /// Boot every record that should be running and has a path. Returns the
    /// number of VMs booted.
    pub fn boot_all(&self, records: &[VmRecord]) -> Result<usize> {
        let mut booted = 0;
        for record in records.iter().filter(|r| r.wants_running()) {
            let Some(path) = &record.path else {
                debug!("Skipping {}: never provisioned", record.name);
                continue;
            };

            info!("Booting VM {}...", record.name);
            self.hypervisor
                .start(path)
                .map_err(|e| OrchestratorError::Lifecycle {
                    action: "boot",
                    vm: record.name.clone(),
                    detail: e.to_string(),
                })?;
            booted += 1;
        }
        Ok(booted)
    }

    /// Stop every record with a path. Under [`StopPolicy::SkipStopped`] VMs
    /// the hypervisor does not list as running are left alone. Returns the
    /// number of stop commands issued.
    pub fn stop_all(&self, records: &[VmRecord]) -> Result<usize> {
        let running: Option<Vec<PathBuf>> = match self.stop_policy {
            StopPolicy::Always => None,
            StopPolicy::SkipStopped => Some(self.hypervisor.running_vms().map_err(|e| {
                OrchestratorError::Lifecycle {
                    action: "list",
                    vm: "running VMs".to_string(),
                    detail: e.to_string(),
                }
            })?),
        };

        let mut stopped = 0;
        for record in records {
            let Some(path) = &record.path else {
                continue;
            };

            if let Some(running) = &running {
                if !is_listed(path, running) {
                    debug!("Skipping {}: not running", record.name);
                    continue;
                }
            }

            info!("Stopping VM {}...", record.name);
            self.hypervisor
                .stop(path)
                .map_err(|e| OrchestratorError::Lifecycle {
                    action: "stop",
                    vm: record.name.clone(),
                    detail: e.to_string(),
                })?;
            stopped += 1;
        }
        Ok(stopped)
    }
}

/// `vmrun list` prints absolute paths; a state file may hold relative ones.
fn is_listed(vm: &Path, running: &[PathBuf]) -> bool {
    let vm = std::path::absolute(vm).unwrap_or_else(|_| vm.to_path_buf());
    running
        .iter()
        .any(|listed| std::path::absolute(listed).is_ok_and(|listed| listed == vm))
}
