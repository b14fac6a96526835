//! Playbook manifest: which playbooks to delete and install, and in what order.

use fleet_core::{FleetError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Returns true for files uploaded to the control node (`*.yml`, `*.yaml`).
pub fn is_playbook_file(path: &Path) -> bool {
    path.is_file()
        && matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybookAction {
    Deletion,
    Installation,
}

impl fmt::Display for PlaybookAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybookAction::Deletion => write!(f, "deletion"),
            PlaybookAction::Installation => write!(f, "installation"),
        }
    }
}

/// A named unit of configuration work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybookEntry {
    pub name: String,
    #[serde(default)]
    pub deletion: Option<String>,
    #[serde(default)]
    pub installation: Option<String>,
    #[serde(default)]
    pub execute_deletion: bool,
    #[serde(default)]
    pub execute_installation: bool,
}

impl PlaybookEntry {
    fn artifact(&self, action: PlaybookAction) -> Option<&str> {
        let artifact = match action {
            PlaybookAction::Deletion => self.deletion.as_deref(),
            PlaybookAction::Installation => self.installation.as_deref(),
        };
        artifact.filter(|a| !a.trim().is_empty())
    }

    fn enabled(&self, action: PlaybookAction) -> bool {
        match action {
            PlaybookAction::Deletion => self.execute_deletion,
            PlaybookAction::Installation => self.execute_installation,
        }
    }

    /// Runs this entry asks for, deletion first. Each flag is evaluated on
    /// its own; an enabled action without an artifact is skipped here and
    /// rejected by [`PlaybookManifest::validate`].
    pub fn planned_runs(&self) -> Vec<(PlaybookAction, &str)> {
        [PlaybookAction::Deletion, PlaybookAction::Installation]
            .into_iter()
            .filter(|action| self.enabled(*action))
            .filter_map(|action| self.artifact(action).map(|artifact| (action, artifact)))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaybookManifest {
    entries: Vec<PlaybookEntry>,
}

impl PlaybookManifest {
    pub fn new(entries: Vec<PlaybookEntry>) -> Self {
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            FleetError::Config(format!(
                "Failed to read playbook manifest {}: {}",
                path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            FleetError::Config(format!(
                "Invalid playbook manifest {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn entries(&self) -> &[PlaybookEntry] {
        &self.entries
    }

    /// Check every enabled action against the local playbook directory.
    ///
    /// An enabled action must name an artifact, the name must be a plain
    /// file name, and the file must be one that gets uploaded.
    pub fn validate(&self, playbooks_dir: &Path) -> Result<()> {
        for entry in &self.entries {
            for action in [PlaybookAction::Deletion, PlaybookAction::Installation] {
                if !entry.enabled(action) {
                    continue;
                }

                let artifact = entry.artifact(action).ok_or_else(|| {
                    FleetError::Config(format!(
                        "Manifest entry '{}' enables {} but names no {} playbook",
                        entry.name, action, action
                    ))
                })?;

                let is_plain_name = Path::new(artifact)
                    .file_name()
                    .is_some_and(|name| name == artifact);
                if !is_plain_name {
                    return Err(FleetError::Config(format!(
                        "Manifest entry '{}' refers to '{}'; playbooks must be plain file names",
                        entry.name, artifact
                    )));
                }

                if !is_playbook_file(&playbooks_dir.join(artifact)) {
                    return Err(FleetError::Config(format!(
                        "Manifest entry '{}' refers to {} playbook '{}', which is not a .yml/.yaml file in {}",
                        entry.name,
                        action,
                        artifact,
                        playbooks_dir.display()
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(deletion: bool, installation: bool) -> PlaybookEntry {
        PlaybookEntry {
            name: "nginx".to_string(),
            deletion: Some("del_nginx.yml".to_string()),
            installation: Some("install_nginx.yml".to_string()),
            execute_deletion: deletion,
            execute_installation: installation,
        }
    }

    #[test]
    fn test_flags_are_independent() {
        assert!(entry(false, false).planned_runs().is_empty());
        assert_eq!(
            entry(true, false).planned_runs(),
            vec![(PlaybookAction::Deletion, "del_nginx.yml")]
        );
        assert_eq!(
            entry(false, true).planned_runs(),
            vec![(PlaybookAction::Installation, "install_nginx.yml")]
        );
        assert_eq!(
            entry(true, true).planned_runs(),
            vec![
                (PlaybookAction::Deletion, "del_nginx.yml"),
                (PlaybookAction::Installation, "install_nginx.yml"),
            ]
        );
    }

    #[test]
    fn test_missing_fields_default() {
        let manifest: PlaybookManifest =
            serde_json::from_str(r#"[{"name": "docker", "installation": "docker.yml"}]"#)
                .expect("valid manifest");
        let docker = &manifest.entries()[0];
        assert_eq!(docker.deletion, None);
        assert!(!docker.execute_deletion);
        assert!(!docker.execute_installation);
        assert!(docker.planned_runs().is_empty());
    }

    #[test]
    fn test_validate_rejects_enabled_action_without_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = PlaybookManifest::new(vec![PlaybookEntry {
            name: "k3s".to_string(),
            deletion: None,
            installation: None,
            execute_deletion: true,
            execute_installation: false,
        }]);

        let err = manifest.validate(dir.path()).expect_err("must fail");
        assert!(matches!(err, FleetError::Config(_)));
        assert!(err.to_string().contains("names no deletion playbook"));
    }

    #[test]
    fn test_validate_checks_files_only_for_enabled_actions() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("install_nginx.yml"), "- hosts: all\n").expect("write");

        // Deletion file is missing but deletion is disabled.
        assert!(PlaybookManifest::new(vec![entry(false, true)])
            .validate(dir.path())
            .is_ok());

        let err = PlaybookManifest::new(vec![entry(true, true)])
            .validate(dir.path())
            .expect_err("deletion playbook is missing");
        assert!(err.to_string().contains("del_nginx.yml"));
    }

    #[test]
    fn test_validate_rejects_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = PlaybookManifest::new(vec![PlaybookEntry {
            name: "escape".to_string(),
            deletion: None,
            installation: Some("../secrets.yml".to_string()),
            execute_deletion: false,
            execute_installation: true,
        }]);
        assert!(manifest.validate(dir.path()).is_err());
    }

    #[test]
    fn test_load_reports_path_on_bad_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("playbooks.json");
        fs::write(&path, "{ not json").expect("write");

        let err = PlaybookManifest::load(&path).expect_err("must fail");
        assert!(err.to_string().contains("playbooks.json"));
    }
}
