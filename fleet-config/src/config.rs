use fleet_core::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_SETTINGS_FILE: &str = "fleet.yaml";

pub const ENV_BASE_VM_DIR: &str = "BASE_VM_DIR";
pub const ENV_BASE_VM_PATH: &str = "BASE_VM_PATH";
pub const ENV_USERNAME: &str = "BASE_VM_USERNAME";
pub const ENV_PASSWORD: &str = "BASE_VM_PASSWORD";

/// How the hypervisor copies the base image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloneMode {
    #[default]
    Full,
    Linked,
}

/// Whether a booted VM gets a console window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Gui,
    Nogui,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopMode {
    #[default]
    Hard,
    Soft,
}

/// What `stop_all` does with VMs that are not running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopPolicy {
    /// Issue a stop command for every VM with a known path.
    #[default]
    Always,
    /// Ask the hypervisor which VMs are running and skip the rest.
    SkipStopped,
}

impl CloneMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloneMode::Full => "full",
            CloneMode::Linked => "linked",
        }
    }
}

impl DisplayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayMode::Gui => "gui",
            DisplayMode::Nogui => "nogui",
        }
    }
}

impl StopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopMode::Hard => "hard",
            StopMode::Soft => "soft",
        }
    }
}

impl FromStr for StopPolicy {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(StopPolicy::Always),
            "skip-stopped" | "skip_stopped" => Ok(StopPolicy::SkipStopped),
            other => Err(FleetError::Config(format!(
                "Unknown stop policy '{other}' (expected 'always' or 'skip-stopped')"
            ))),
        }
    }
}

/// Address polling after boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_secs: u64,
    /// `None` polls until the guest answers.
    pub max_attempts: Option<u32>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 1,
            max_attempts: None,
        }
    }
}

/// Non-secret settings, optionally read from `fleet.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetSettings {
    /// Reserved name of the control-node record.
    pub control_node: String,
    pub state_file: PathBuf,
    pub manifest_file: PathBuf,
    /// Local directory holding the playbook artifacts.
    pub playbooks_dir: PathBuf,
    pub remote_home: String,
    pub remote_playbooks_dir: String,
    pub ansible_forks: u32,
    pub ssh_port: u16,
    pub hypervisor_binary: String,
    pub clone_mode: CloneMode,
    pub display_mode: DisplayMode,
    pub stop_mode: StopMode,
    pub stop_policy: StopPolicy,
    pub poll: PollSettings,
    pub packages: Vec<String>,
    pub collections: Vec<String>,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            control_node: "Control-Plane".to_string(),
            state_file: PathBuf::from("vms.json"),
            manifest_file: PathBuf::from("playbooks.json"),
            playbooks_dir: PathBuf::from("playbooks"),
            remote_home: "/root".to_string(),
            remote_playbooks_dir: "/root/playbooks".to_string(),
            ansible_forks: 10,
            ssh_port: 22,
            hypervisor_binary: "vmrun".to_string(),
            clone_mode: CloneMode::default(),
            display_mode: DisplayMode::default(),
            stop_mode: StopMode::default(),
            stop_policy: StopPolicy::default(),
            poll: PollSettings::default(),
            packages: [
                "ansible",
                "ansible-core",
                "python3-pip",
                "sshpass",
                "tree",
                "jq",
                "7zip",
                "nmap",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
            collections: ["ansible.posix", "community.general", "community.crypto"]
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl FleetSettings {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            FleetError::Config(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;

        serde_yaml_ng::from_str(&content).map_err(|e| {
            FleetError::Config(format!(
                "Invalid settings file {}: {}",
                path.display(),
                e
            ))
        })
    }
}

/// Provisioning login shared by every fleet member.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Directory receiving one sub-directory per cloned VM.
    pub base_vm_dir: PathBuf,
    /// Descriptor of the image every VM is cloned from.
    pub base_vm_path: PathBuf,
    pub credentials: Credentials,
    pub settings: FleetSettings,
}

impl FleetConfig {
    /// Load settings and environment for this process.
    pub fn load(settings_path: Option<PathBuf>) -> Result<Self> {
        Self::load_with(settings_path, |key| std::env::var(key).ok())
    }

    /// Resolve the settings file (explicit path, `FLEET_CONFIG`, or
    /// `fleet.yaml` if present) and apply the variables from `lookup`.
    pub fn load_with<F>(settings_path: Option<PathBuf>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let explicit = settings_path.or_else(|| lookup("FLEET_CONFIG").map(PathBuf::from));

        let settings = match explicit {
            Some(path) => {
                debug!("Loading settings from {}", path.display());
                FleetSettings::from_file(&path)?
            }
            None if Path::new(DEFAULT_SETTINGS_FILE).is_file() => {
                debug!("Loading settings from {}", DEFAULT_SETTINGS_FILE);
                FleetSettings::from_file(Path::new(DEFAULT_SETTINGS_FILE))?
            }
            None => FleetSettings::default(),
        };

        Self::from_parts(settings, lookup)
    }

    /// Combine already-loaded settings with the variables from `lookup`.
    ///
    /// Fails with a configuration error naming every missing required
    /// variable, or the first override that does not parse.
    pub fn from_parts<F>(mut settings: FleetSettings, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let required = [ENV_BASE_VM_DIR, ENV_BASE_VM_PATH, ENV_USERNAME, ENV_PASSWORD];
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(FleetError::Config(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        if let Some(name) = get("FLEET_CONTROL_NODE") {
            settings.control_node = name;
        }
        if let Some(path) = get("FLEET_STATE_FILE") {
            settings.state_file = PathBuf::from(path);
        }
        if let Some(path) = get("FLEET_MANIFEST_FILE") {
            settings.manifest_file = PathBuf::from(path);
        }
        if let Some(path) = get("FLEET_PLAYBOOKS_DIR") {
            settings.playbooks_dir = PathBuf::from(path);
        }
        if let Some(value) = get("FLEET_POLL_INTERVAL_SECS") {
            settings.poll.interval_secs = parse_number("FLEET_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = get("FLEET_POLL_MAX_ATTEMPTS") {
            settings.poll.max_attempts = Some(parse_number("FLEET_POLL_MAX_ATTEMPTS", &value)?);
        }
        if let Some(value) = get("FLEET_STOP_POLICY") {
            settings.stop_policy = value.parse()?;
        }

        if settings.control_node.trim().is_empty() {
            return Err(FleetError::Config(
                "Control node name cannot be empty".to_string(),
            ));
        }

        let base_vm_dir = absolute_path(ENV_BASE_VM_DIR, get(ENV_BASE_VM_DIR).unwrap_or_default())?;
        let base_vm_path =
            absolute_path(ENV_BASE_VM_PATH, get(ENV_BASE_VM_PATH).unwrap_or_default())?;

        Ok(Self {
            base_vm_dir,
            base_vm_path,
            credentials: Credentials {
                username: get(ENV_USERNAME).unwrap_or_default(),
                password: get(ENV_PASSWORD).unwrap_or_default(),
            },
            settings,
        })
    }

    /// Deterministic descriptor path for a fleet member:
    /// `<base_vm_dir>/<name>/<name>.vmx`.
    pub fn vm_descriptor_path(&self, name: &str) -> PathBuf {
        self.base_vm_dir.join(name).join(format!("{name}.vmx"))
    }
}

/// The hypervisor reports VMs by absolute path, so relative values are
/// resolved against the working directory once at load.
fn absolute_path(key: &str, value: String) -> Result<PathBuf> {
    std::path::absolute(&value)
        .map_err(|e| FleetError::Config(format!("Invalid path '{value}' for {key}: {e}")))
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| FleetError::Config(format!("Invalid value '{value}' for {key}: {e}")))
}
