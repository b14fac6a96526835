//! Error types for hypervisor and remote shell operations.

use fleet_core::FleetError;
use thiserror::Error;

/// Errors raised at the hypervisor and remote shell boundaries.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Command failed: {command}: {detail}")]
    CommandFailed { command: String, detail: String },

    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),

    /// The hypervisor answered an address query with a failure. Guest
    /// networking often lags behind boot, so callers retry these.
    #[error("Guest address not available yet: {0}")]
    TransientQuery(String),

    #[error("Authentication failed for {user}@{host}: {detail}")]
    Auth {
        host: String,
        user: String,
        detail: String,
    },

    #[error("Could not connect to {host}: {detail}")]
    Connect { host: String, detail: String },

    #[error("Remote session error on {host}: {detail}")]
    Session { host: String, detail: String },

    #[error("File transfer failed for {path}: {detail}")]
    FileTransfer { path: String, detail: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::TransientQuery(_))
    }
}

impl From<FleetError> for ProviderError {
    fn from(err: FleetError) -> Self {
        match err {
            FleetError::Dependency(dep) => ProviderError::DependencyNotFound(dep),
            FleetError::Io(e) => ProviderError::IoError(e),
            FleetError::Command(detail) => ProviderError::CommandFailed {
                command: "local command".to_string(),
                detail,
            },
            other => ProviderError::CommandFailed {
                command: "local command".to_string(),
                detail: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
