//! Configuration for the fleet provisioner.
//!
//! [`FleetConfig`] is built once at startup from defaults, an optional YAML
//! settings file and the environment, then passed by reference to every
//! component. [`PlaybookManifest`] is the declarative list of configuration
//! units run against the control node.

pub mod config;
pub mod manifest;

pub use config::{
    CloneMode, Credentials, DisplayMode, FleetConfig, FleetSettings, PollSettings, StopMode,
    StopPolicy,
};
pub use manifest::{is_playbook_file, PlaybookAction, PlaybookEntry, PlaybookManifest};
