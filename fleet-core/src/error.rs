use thiserror::Error;

/// Base error type shared by every fleet crate.
///
/// Crates with richer failure modes define their own enums and convert
/// into or out of this one at their boundaries.
#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Dependency not found: {0}")]
    Dependency(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FleetError>;
