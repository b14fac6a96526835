//! Shared fixture for the orchestrator integration tests.
#![allow(dead_code)]

use fleet_config::{FleetConfig, FleetSettings};
use fleet_orchestrator::{DesiredState, FleetStore, VmRecord};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct Fixture {
    pub temp: TempDir,
    pub config: FleetConfig,
    pub store: FleetStore,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let settings = FleetSettings {
            state_file: temp.path().join("vms.json"),
            playbooks_dir: temp.path().join("playbooks"),
            ..Default::default()
        };

        let env: HashMap<&str, String> = [
            ("BASE_VM_DIR", temp.path().join("vms").display().to_string()),
            ("BASE_VM_PATH", "/images/base/base.vmx".to_string()),
            ("BASE_VM_USERNAME", "root".to_string()),
            ("BASE_VM_PASSWORD", "s3cret".to_string()),
        ]
        .into_iter()
        .collect();
        let config = FleetConfig::from_parts(settings, |key| env.get(key).cloned())
            .expect("fixture config is valid");

        fs::create_dir_all(&config.settings.playbooks_dir).expect("create playbooks dir");
        let store = FleetStore::new(config.settings.state_file.clone());

        Self {
            temp,
            config,
            store,
        }
    }

    pub fn vm_path(&self, name: &str) -> PathBuf {
        self.config.vm_descriptor_path(name)
    }

    /// A record whose clone exists on disk.
    pub fn provisioned(&self, name: &str, ip: &str, state: DesiredState) -> VmRecord {
        let path = self.vm_path(name);
        fs::create_dir_all(path.parent().expect("descriptor has a parent"))
            .expect("create vm dir");
        fs::write(&path, "config.version = \"8\"\n").expect("write descriptor");

        VmRecord {
            name: name.to_string(),
            path: Some(path),
            ip: Some(ip.to_string()),
            state,
        }
    }

    pub fn write_playbook(&self, name: &str, content: &str) {
        fs::write(self.config.settings.playbooks_dir.join(name), content)
            .expect("write playbook");
    }

    pub fn state_file_content(&self) -> String {
        fs::read_to_string(self.store.path()).expect("read state file")
    }
}

/// A record with an address but no clone on disk, enough for the
/// control-node operations.
pub fn addressed(name: &str, ip: &str, state: DesiredState) -> VmRecord {
    VmRecord {
        name: name.to_string(),
        path: None,
        ip: Some(ip.to_string()),
        state,
    }
}
