//! Fleet orchestration logic
//!
//! This crate holds the business logic of the provisioner: the fleet state
//! store, VM provisioning, control-node bootstrap, playbook distribution and
//! bulk lifecycle control. It talks to the outside world only through the
//! `fleet-provider` boundaries, so every operation can run against mocks.

pub mod bootstrap;
pub mod error;
pub mod lifecycle;
pub mod playbooks;
pub mod provisioner;
pub mod retry;
pub mod session;
pub mod store;

pub use bootstrap::{Bootstrapper, ManagedHost};
pub use error::{OrchestratorError, Result};
pub use lifecycle::LifecycleController;
pub use playbooks::{PlaybookReport, PlaybookRun, PlaybookRunner};
pub use provisioner::Provisioner;
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use session::control_node_address;
pub use store::{DesiredState, FleetStore, StoreError, VmRecord};

#[cfg(any(test, feature = "test-helpers"))]
pub use retry::RecordingSleeper;
