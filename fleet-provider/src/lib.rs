//! Hypervisor and remote shell boundaries.
//!
//! The orchestrator only talks to the outside world through the
//! [`Hypervisor`] and [`RemoteConnector`] traits. Production code uses
//! [`VmrunHypervisor`] and [`SshConnector`]; tests use the mocks behind the
//! `test-helpers` feature.

pub mod error;
pub mod hypervisor;
pub mod remote;
pub mod ssh;
pub mod vmrun;

#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

pub use error::{ProviderError, Result};
pub use hypervisor::Hypervisor;
pub use remote::{FileChannel, RemoteConnector, RemoteSession, RemoteTarget};
pub use ssh::SshConnector;
pub use vmrun::VmrunHypervisor;
