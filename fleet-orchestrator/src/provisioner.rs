//! Clone, boot and address discovery for every fleet member.

use crate::error::{OrchestratorError, Result};
use crate::retry::{RetryPolicy, Sleeper};
use crate::store::{FleetStore, VmRecord};
use fleet_config::FleetConfig;
use fleet_provider::Hypervisor;
use std::path::Path;
use tracing::{debug, info, warn};

pub struct Provisioner<'a> {
    config: &'a FleetConfig,
    hypervisor: &'a dyn Hypervisor,
    store: &'a FleetStore,
    sleeper: &'a dyn Sleeper,
    policy: RetryPolicy,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        config: &'a FleetConfig,
        hypervisor: &'a dyn Hypervisor,
        store: &'a FleetStore,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            config,
            hypervisor,
            store,
            sleeper,
            policy: RetryPolicy::from(&config.settings.poll),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Make every record provisioned.
    ///
    /// Records whose path vanished from disk are reset first. Each record
    /// that then lacks a path or address is cloned (unless a previous run
    /// already left the clone in place), booted and polled for its address.
    /// The store is saved after every VM that comes up, so an aborted run
    /// keeps the progress made so far. Healthy records cause no hypervisor
    /// calls and no save.
    pub fn ensure_provisioned(&self, mut records: Vec<VmRecord>) -> Result<Vec<VmRecord>> {
        for index in 0..records.len() {
            let record = &mut records[index];

            if let Some(path) = &record.path {
                if !path.exists() {
                    warn!(
                        "VM {} is recorded at {} which no longer exists; re-provisioning",
                        record.name,
                        path.display()
                    );
                    record.reset();
                }
            }

            if record.is_provisioned() {
                debug!("VM {} is already provisioned", record.name);
                continue;
            }

            let name = record.name.clone();
            let dest = self.config.vm_descriptor_path(&name);
            let ip = self.provision_one(&name, &dest)?;

            let record = &mut records[index];
            record.path = Some(dest);
            record.ip = Some(ip.clone());
            self.store.save(&records)?;

            info!("VM {} is ready at IP {}", name, ip);
        }

        Ok(records)
    }

    fn provision_one(&self, name: &str, dest: &Path) -> Result<String> {
        let provisioning_error = |detail: String| OrchestratorError::Provisioning {
            vm: name.to_string(),
            detail,
        };

        if dest.exists() {
            info!(
                "Found an existing clone of {} at {}, skipping clone",
                name,
                dest.display()
            );
        } else {
            self.hypervisor
                .clone_vm(&self.config.base_vm_path, dest, name)
                .map_err(|e| provisioning_error(e.to_string()))?;
        }

        info!("Starting VM {}...", name);
        self.hypervisor
            .start(dest)
            .map_err(|e| provisioning_error(e.to_string()))?;

        info!("Waiting for VM {} to get IP...", name);
        self.wait_for_address(name, dest)
    }

    fn wait_for_address(&self, name: &str, vm: &Path) -> Result<String> {
        let address = self.policy.poll(self.sleeper, |attempt| {
            match self.hypervisor.guest_address(vm) {
                Ok(Some(address)) if !address.trim().is_empty() => {
                    Ok(Some(address.trim().to_string()))
                }
                Ok(_) => {
                    debug!("No address for {} yet (attempt {})", name, attempt);
                    Ok(None)
                }
                Err(e) if e.is_transient() => {
                    debug!("Address query for {} failed (attempt {}): {}", name, attempt, e);
                    Ok(None)
                }
                Err(e) => Err(OrchestratorError::Provisioning {
                    vm: name.to_string(),
                    detail: e.to_string(),
                }),
            }
        })?;

        address.ok_or_else(|| OrchestratorError::Provisioning {
            vm: name.to_string(),
            detail: format!(
                "no guest address after {} attempts",
                self.policy.max_attempts.unwrap_or_default()
            ),
        })
    }
}
