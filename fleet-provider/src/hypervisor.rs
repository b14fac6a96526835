use crate::error::Result;
use std::path::{Path, PathBuf};

/// Boundary to the hypervisor that owns the fleet's VM images.
///
/// VMs are addressed by the path of their descriptor file.
pub trait Hypervisor {
    /// Get the name of the hypervisor backend (e.g., "vmrun").
    fn name(&self) -> &'static str;

    /// Copy `base` into a new VM at `dest` named `name`.
    fn clone_vm(&self, base: &Path, dest: &Path, name: &str) -> Result<()>;

    fn start(&self, vm: &Path) -> Result<()>;

    fn stop(&self, vm: &Path) -> Result<()>;

    /// Ask for the guest's network address.
    ///
    /// `Ok(None)` means the guest has not reported one yet. A
    /// [`ProviderError::TransientQuery`](crate::ProviderError::TransientQuery)
    /// means the query itself failed in a way worth retrying; any other
    /// error is fatal.
    fn guest_address(&self, vm: &Path) -> Result<Option<String>>;

    /// Descriptor paths of the VMs currently running.
    fn running_vms(&self) -> Result<Vec<PathBuf>>;
}
