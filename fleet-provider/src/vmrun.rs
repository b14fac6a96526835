//! VMware `vmrun` backend.

use crate::error::{ProviderError, Result};
use crate::hypervisor::Hypervisor;
use fleet_config::{CloneMode, DisplayMode, FleetSettings, StopMode};
use fleet_core::command_stream::{capture_command, is_tool_installed, stream_command};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct VmrunHypervisor {
    binary: String,
    clone_mode: CloneMode,
    display_mode: DisplayMode,
    stop_mode: StopMode,
}

impl VmrunHypervisor {
    pub fn new(settings: &FleetSettings) -> Result<Self> {
        if !is_tool_installed(&settings.hypervisor_binary) {
            return Err(ProviderError::DependencyNotFound(format!(
                "{} (VMware Workstation/Fusion command line)",
                settings.hypervisor_binary
            )));
        }

        Ok(Self {
            binary: settings.hypervisor_binary.clone(),
            clone_mode: settings.clone_mode,
            display_mode: settings.display_mode,
            stop_mode: settings.stop_mode,
        })
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        stream_command(&self.binary, args).map_err(|e| ProviderError::CommandFailed {
            command: format!("{} {}", self.binary, args.join(" ")),
            detail: e.to_string(),
        })
    }
}

/// Parse `vmrun list` output: a "Total running VMs: N" header followed by
/// one descriptor path per line.
pub fn parse_running_list(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Total running VMs"))
        .map(PathBuf::from)
        .collect()
}

impl Hypervisor for VmrunHypervisor {
    fn name(&self) -> &'static str {
        "vmrun"
    }

    fn clone_vm(&self, base: &Path, dest: &Path, name: &str) -> Result<()> {
        info!("Cloning VM {}...", name);
        let base = base.to_string_lossy().into_owned();
        let dest = dest.to_string_lossy().into_owned();
        let clone_name = format!("-cloneName={name}");
        self.run(&[
            "clone",
            base.as_str(),
            dest.as_str(),
            self.clone_mode.as_str(),
            clone_name.as_str(),
        ])
    }

    fn start(&self, vm: &Path) -> Result<()> {
        let vm = vm.to_string_lossy().into_owned();
        self.run(&["start", vm.as_str(), self.display_mode.as_str()])
    }

    fn stop(&self, vm: &Path) -> Result<()> {
        let vm = vm.to_string_lossy().into_owned();
        self.run(&["stop", vm.as_str(), self.stop_mode.as_str()])
    }

    fn guest_address(&self, vm: &Path) -> Result<Option<String>> {
        let vm = vm.to_string_lossy().into_owned();
        let output = capture_command(&self.binary, &["getGuestIPAddress", vm.as_str(), "-wait"])?;

        if !output.success() {
            // vmrun reports "Error: ..." on stdout while VMware Tools is not up yet.
            return Err(ProviderError::TransientQuery(output.diagnostic()));
        }

        let address = output.stdout.trim();
        if address.is_empty() {
            debug!("No guest address for {} yet", vm);
            Ok(None)
        } else {
            Ok(Some(address.to_string()))
        }
    }

    fn running_vms(&self) -> Result<Vec<PathBuf>> {
        let output = capture_command(&self.binary, &["list"])?;
        if !output.success() {
            return Err(ProviderError::CommandFailed {
                command: format!("{} list", self.binary),
                detail: output.diagnostic(),
            });
        }
        Ok(parse_running_list(&output.stdout))
    }
}
