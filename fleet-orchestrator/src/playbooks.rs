//! Uploads playbooks to the control node and runs the manifest.

use crate::error::{OrchestratorError, Result};
use crate::session::{control_node_address, control_target, with_session};
use crate::store::VmRecord;
use fleet_config::{is_playbook_file, FleetConfig, PlaybookAction, PlaybookManifest};
use fleet_core::shell_escape;
use fleet_provider::{RemoteConnector, RemoteSession};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, error, info};

const PLAYBOOK_MODE: u32 = 0o644;
const PLAYBOOK_DIR_MODE: u32 = 0o755;

static PLACEHOLDER_PATTERN: OnceLock<Regex> = OnceLock::new();

fn placeholder_pattern() -> &'static Regex {
    PLACEHOLDER_PATTERN.get_or_init(|| {
        Regex::new(r"\$\{(?:vm:(?P<vm>[^}]+)|(?P<key>control_node|username))\}")
            .expect("Hardcoded placeholder regex pattern should always compile")
    })
}

/// Values substituted into playbooks before upload.
///
/// Recognised placeholders are `${vm:<name>}`, `${control_node}` and
/// `${username}`. Anything else, Ansible's `{{ }}` expressions included,
/// is left alone.
#[derive(Debug, Clone)]
pub struct TemplateContext {
    addresses: HashMap<String, Option<String>>,
    control_node: String,
    username: String,
}

impl TemplateContext {
    pub fn new(records: &[VmRecord], control_node_ip: &str, username: &str) -> Self {
        Self {
            addresses: records
                .iter()
                .map(|r| (r.name.clone(), r.ip.clone()))
                .collect(),
            control_node: control_node_ip.to_string(),
            username: username.to_string(),
        }
    }

    /// Render `source`, failing on a VM that is unknown or has no address.
    pub fn render(&self, artifact: &str, source: &str) -> Result<String> {
        let mut failure = None;
        let rendered = placeholder_pattern().replace_all(source, |caps: &Captures| {
            if let Some(key) = caps.name("key") {
                return match key.as_str() {
                    "control_node" => self.control_node.clone(),
                    _ => self.username.clone(),
                };
            }

            let name = caps.name("vm").map_or("", |m| m.as_str());
            match self.addresses.get(name) {
                Some(Some(ip)) => ip.clone(),
                Some(None) => {
                    failure.get_or_insert_with(|| format!("VM '{name}' has no address yet"));
                    String::new()
                }
                None => {
                    failure.get_or_insert_with(|| format!("no VM named '{name}' in the fleet"));
                    String::new()
                }
            }
        });

        match failure {
            Some(reason) => Err(OrchestratorError::Config(format!(
                "Playbook {artifact} cannot be rendered: {reason}"
            ))),
            None => Ok(rendered.into_owned()),
        }
    }
}

/// One automation-tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybookRun {
    pub entry: String,
    pub action: PlaybookAction,
    pub artifact: String,
    pub exit_status: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybookReport {
    pub succeeded: Vec<PlaybookRun>,
    pub failed: Vec<PlaybookRun>,
}

impl PlaybookReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

pub struct PlaybookRunner<'a> {
    config: &'a FleetConfig,
    connector: &'a dyn RemoteConnector,
}

impl<'a> PlaybookRunner<'a> {
    pub fn new(config: &'a FleetConfig, connector: &'a dyn RemoteConnector) -> Self {
        Self { config, connector }
    }

    /// Upload every local playbook and run the manifest in order.
    ///
    /// The control-node address, the manifest and every template are checked
    /// before connecting. A failing run is recorded in the report and the
    /// remaining entries still run.
    pub fn run_playbooks(
        &self,
        records: &[VmRecord],
        manifest: &PlaybookManifest,
    ) -> Result<PlaybookReport> {
        let settings = &self.config.settings;
        let address = control_node_address(records, &settings.control_node)?;
        manifest.validate(&settings.playbooks_dir)?;

        let context = TemplateContext::new(records, address, &self.config.credentials.username);
        let uploads = render_playbooks(&settings.playbooks_dir, &context)?;
        let target = control_target(self.config, address);

        let report = with_session(self.connector, &target, |session| {
            self.upload(session, &uploads)?;
            self.execute(session, manifest)
        })?;

        info!(
            "All playbooks executed: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    fn remote_playbook(&self, artifact: &str) -> String {
        format!(
            "{}/{}",
            self.config.settings.remote_playbooks_dir.trim_end_matches('/'),
            artifact
        )
    }

    fn upload(&self, session: &mut dyn RemoteSession, uploads: &[(String, String)]) -> Result<()> {
        let mut files = session.open_file_channel()?;
        files.create_dir(&self.config.settings.remote_playbooks_dir, PLAYBOOK_DIR_MODE)?;

        for (name, content) in uploads {
            info!("Uploading {} to control node...", name);
            files.write_file(&self.remote_playbook(name), content.as_bytes(), PLAYBOOK_MODE)?;
        }
        Ok(())
    }

    fn execute(
        &self,
        session: &mut dyn RemoteSession,
        manifest: &PlaybookManifest,
    ) -> Result<PlaybookReport> {
        let mut report = PlaybookReport::default();

        for entry in manifest.entries() {
            let runs = entry.planned_runs();
            if runs.is_empty() {
                debug!("Nothing to run for {}", entry.name);
            }

            for (action, artifact) in runs {
                info!("Executing {} for {}...", action, entry.name);
                let command = format!(
                    "ansible-playbook {}",
                    shell_escape(&self.remote_playbook(artifact))
                );
                let output = session.exec(&command)?;

                let run = PlaybookRun {
                    entry: entry.name.clone(),
                    action,
                    artifact: artifact.to_string(),
                    exit_status: output.exit_status,
                };
                if output.success() {
                    info!("{} playbook executed successfully for {}", action, entry.name);
                    report.succeeded.push(run);
                } else {
                    error!(
                        "{} playbook failed for {} (exit status {}): {}",
                        action,
                        entry.name,
                        output.exit_status,
                        output.diagnostic()
                    );
                    report.failed.push(run);
                }
            }
        }

        Ok(report)
    }
}

/// Render every `*.yml`/`*.yaml` file in `dir`, sorted by file name.
pub fn render_playbooks(dir: &Path, context: &TemplateContext) -> Result<Vec<(String, String)>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        OrchestratorError::Config(format!(
            "Cannot read playbook directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| OrchestratorError::Config(format!("{}: {}", dir.display(), e)))?
            .path();
        if is_playbook_file(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut rendered = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let source = fs::read_to_string(&path).map_err(|e| {
            OrchestratorError::Config(format!("Cannot read playbook {}: {}", path.display(), e))
        })?;
        let content = context.render(&name, &source)?;
        rendered.push((name, content));
    }
    Ok(rendered)
}
