//! Fleet state file: the durable list of managed VMs.
//!
//! The whole file is read at the start of every operation and rewritten
//! after every mutation. Writes go to a temporary file in the same
//! directory which is then renamed over the original, so a failed save
//! leaves the previous state intact.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("State file {path} is corrupt: {reason}")]
    StateCorrupt { path: PathBuf, reason: String },

    #[error("Cannot access state file {path}: {source}")]
    StateIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Whether a VM should be running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    Start,
    #[default]
    Stop,
}

/// One managed VM. `path` and `ip` are set together once the VM has been
/// cloned, booted and has reported an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRecord {
    pub name: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub state: DesiredState,
}

impl VmRecord {
    pub fn new(name: impl Into<String>, state: DesiredState) -> Self {
        Self {
            name: name.into(),
            path: None,
            ip: None,
            state,
        }
    }

    pub fn is_provisioned(&self) -> bool {
        self.path.is_some() && self.ip.is_some()
    }

    pub fn wants_running(&self) -> bool {
        self.state == DesiredState::Start
    }

    /// Forget the clone so the next provisioning pass starts over.
    pub fn reset(&mut self) {
        self.path = None;
        self.ip = None;
    }
}

#[derive(Debug, Clone)]
pub struct FleetStore {
    path: PathBuf,
}

impl FleetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<VmRecord>, StoreError> {
        let content = fs::read_to_string(&self.path).map_err(|source| StoreError::StateIo {
            path: self.path.clone(),
            source,
        })?;

        let records: Vec<VmRecord> =
            serde_json::from_str(&content).map_err(|e| StoreError::StateCorrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;

        let mut seen = HashSet::new();
        for record in &records {
            if !seen.insert(record.name.as_str()) {
                return Err(StoreError::StateCorrupt {
                    path: self.path.clone(),
                    reason: format!("VM name '{}' appears more than once", record.name),
                });
            }
        }

        debug!(
            "Loaded {} VM records from {}",
            records.len(),
            self.path.display()
        );
        Ok(records)
    }

    pub fn save(&self, records: &[VmRecord]) -> Result<(), StoreError> {
        let io_error = |source: io::Error| StoreError::StateIo {
            path: self.path.clone(),
            source,
        };

        let content = to_json(records).map_err(|e| io_error(io::Error::other(e)))?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp_file = tempfile::Builder::new()
            .prefix(".fleet-state-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(io_error)?;

        temp_file
            .as_file_mut()
            .write_all(content.as_bytes())
            .map_err(io_error)?;

        temp_file
            .persist(&self.path)
            .map_err(|e| io_error(e.error))?;

        debug!("Saved {} VM records to {}", records.len(), self.path.display());
        Ok(())
    }
}

/// JSON with four-space indentation, the layout operators already edit by hand.
fn to_json(records: &[VmRecord]) -> serde_json::Result<String> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    records.serialize(&mut serializer)?;
    buffer.push(b'\n');
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
