use crate::store::StoreError;
use fleet_core::FleetError;
use fleet_provider::ProviderError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    State(#[from] StoreError),

    #[error("Provisioning of {vm} failed: {detail}")]
    Provisioning { vm: String, detail: String },

    #[error("Could not {action} {vm}: {detail}")]
    Lifecycle {
        action: &'static str,
        vm: String,
        detail: String,
    },

    #[error("Control node '{name}' has no address; provision it first")]
    NoControlNodeAddress { name: String },

    #[error("{step} failed with exit status {exit_status}: {detail}")]
    RemoteCommand {
        step: String,
        exit_status: i32,
        detail: String,
    },

    #[error("Remote error: {0}")]
    Remote(#[from] ProviderError),

    #[error(transparent)]
    Core(FleetError),
}

impl From<FleetError> for OrchestratorError {
    fn from(err: FleetError) -> Self {
        match err {
            FleetError::Config(message) => OrchestratorError::Config(message),
            other => OrchestratorError::Core(other),
        }
    }
}
