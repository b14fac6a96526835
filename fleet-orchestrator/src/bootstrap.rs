//! Turns the control node into an Ansible controller for the rest of the
//! fleet.

use crate::error::Result;
use crate::session::{
    control_node_address, control_target, run_sensitive_step, run_step, with_session,
};
use crate::store::VmRecord;
use fleet_config::FleetConfig;
use fleet_core::shell_escape;
use fleet_provider::{FileChannel, RemoteConnector, RemoteSession};
use tracing::{info, warn};

const PYTHON_INTERPRETER: &str = "/usr/bin/python3";
const HOSTS_FILE: &str = "/etc/hosts";
const INVENTORY_GROUP: &str = "[all]";

/// A fleet member the control node manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedHost {
    pub name: String,
    pub ip: String,
}

impl ManagedHost {
    fn inventory_line(&self) -> String {
        format!(
            "{} ansible_host={} ansible_python_interpreter={}",
            self.name, self.ip, PYTHON_INTERPRETER
        )
    }

    fn hosts_line(&self) -> String {
        format!("{} {}", self.ip, self.name)
    }
}

/// Host names in the inventory cannot contain whitespace.
pub fn sanitize_host_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .collect()
}

/// Members other than the control node that should be running and have an
/// address.
pub fn target_hosts(records: &[VmRecord], control_node: &str) -> Vec<ManagedHost> {
    records
        .iter()
        .filter(|record| record.name != control_node && record.wants_running())
        .filter_map(|record| match record.ip.as_deref() {
            Some(ip) if !ip.trim().is_empty() => Some(ManagedHost {
                name: sanitize_host_name(&record.name),
                ip: ip.trim().to_string(),
            }),
            _ => {
                warn!("VM {} has no address yet and is left out", record.name);
                None
            }
        })
        .collect()
}

pub struct Bootstrapper<'a> {
    config: &'a FleetConfig,
    connector: &'a dyn RemoteConnector,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(config: &'a FleetConfig, connector: &'a dyn RemoteConnector) -> Self {
        Self { config, connector }
    }

    /// Configure the control node and return the hosts it now manages.
    ///
    /// Fails before connecting if the control node has no address. Any
    /// failing step aborts the bootstrap. Re-running is safe: configuration
    /// is overwritten, inventory and hosts lines are merged and an existing
    /// valid keypair is kept.
    pub fn bootstrap_control_node(&self, records: &[VmRecord]) -> Result<Vec<ManagedHost>> {
        let control_node = &self.config.settings.control_node;
        let address = control_node_address(records, control_node)?;
        let targets = target_hosts(records, control_node);
        let target = control_target(self.config, address);

        with_session(self.connector, &target, |session| {
            self.install_tooling(session)?;

            let mut files = session.open_file_channel()?;
            self.write_tool_config(files.as_mut())?;
            self.update_inventory(files.as_mut(), &targets)?;
            update_hosts_file(files.as_mut(), &targets)?;
            drop(files);

            self.ensure_keypair(session)?;
            self.distribute_key(session, &targets)
        })?;

        info!("Control node configuration complete.");
        Ok(targets)
    }

    fn install_tooling(&self, session: &mut dyn RemoteSession) -> Result<()> {
        let settings = &self.config.settings;
        if !settings.packages.is_empty() {
            let packages = escape_all(&settings.packages);
            run_step(
                session,
                "Installing packages",
                &format!("DEBIAN_FRONTEND=noninteractive apt-get install -y {packages}"),
            )?;
        }

        if !settings.collections.is_empty() {
            let collections = escape_all(&settings.collections);
            run_step(
                session,
                "Installing Ansible collections",
                &format!("ansible-galaxy collection install {collections}"),
            )?;
        }
        Ok(())
    }

    fn write_tool_config(&self, files: &mut dyn FileChannel) -> Result<()> {
        let settings = &self.config.settings;
        let path = self.remote_path("ansible.cfg");
        let content = format!(
            "[defaults]\ninventory = {}\nforks = {}\ndeprecation_warnings = False\n",
            self.remote_path("inventory"),
            settings.ansible_forks
        );

        info!("Writing {}", path);
        files.write_file(&path, content.as_bytes(), 0o644)?;
        Ok(())
    }

    fn update_inventory(&self, files: &mut dyn FileChannel, targets: &[ManagedHost]) -> Result<()> {
        let path = self.remote_path("inventory");
        let existing = read_text(files, &path)?;
        let lines: Vec<String> = targets.iter().map(ManagedHost::inventory_line).collect();
        let merged = merge_inventory(&existing, &lines);

        if merged == existing {
            info!("Inventory {} is up to date", path);
            return Ok(());
        }
        info!("Updating inventory {} ({} hosts)", path, targets.len());
        files.write_file(&path, merged.as_bytes(), 0o644)?;
        Ok(())
    }

    fn ensure_keypair(&self, session: &mut dyn RemoteSession) -> Result<()> {
        let ssh_dir = self.remote_path(".ssh");
        let key = format!("{ssh_dir}/id_rsa");

        // A valid private key is kept and its public half rewritten from it,
        // since ssh-copy-id reads the .pub file.
        let probe = session.exec(&format!(
            "ssh-keygen -y -f {key} > {key}.pub",
            key = shell_escape(&key)
        ))?;
        if probe.success() {
            info!("Keeping existing SSH keypair {}", key);
            return Ok(());
        }

        run_step(
            session,
            "Generating SSH keypair",
            &format!(
                "rm -f {key} {key}.pub && mkdir -p {dir} && chmod 700 {dir} && ssh-keygen -t rsa -b 2048 -f {key} -q -N ''",
                key = shell_escape(&key),
                dir = shell_escape(&ssh_dir),
            ),
        )?;
        Ok(())
    }

    fn distribute_key(&self, session: &mut dyn RemoteSession, targets: &[ManagedHost]) -> Result<()> {
        let credentials = &self.config.credentials;
        for host in targets {
            let destination = format!("{}@{}", credentials.username, host.ip);
            let command = format!(
                "sshpass -p {} ssh-copy-id -f -o StrictHostKeyChecking=no {}",
                shell_escape(&credentials.password),
                shell_escape(&destination)
            );
            run_sensitive_step(session, &format!("Copying SSH key to {}", host.name), &command)?;
        }
        Ok(())
    }

    fn remote_path(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.config.settings.remote_home.trim_end_matches('/'),
            name
        )
    }
}

fn escape_all(words: &[String]) -> String {
    words
        .iter()
        .map(|w| shell_escape(w))
        .collect::<Vec<_>>()
        .join(" ")
}

fn read_text(files: &mut dyn FileChannel, path: &str) -> Result<String> {
    Ok(files
        .read_file(path)?
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default())
}

fn update_hosts_file(files: &mut dyn FileChannel, targets: &[ManagedHost]) -> Result<()> {
    let existing = read_text(files, HOSTS_FILE)?;
    let lines: Vec<String> = targets.iter().map(ManagedHost::hosts_line).collect();
    let merged = merge_hosts(&existing, &lines);

    if merged != existing {
        info!("Updating {}", HOSTS_FILE);
        files.write_file(HOSTS_FILE, merged.as_bytes(), 0o644)?;
    }
    Ok(())
}

fn inventory_key(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('[') || line.starts_with('#') || line.starts_with(';') {
        return None;
    }
    line.split_whitespace().next()
}

/// Merge host lines into the `[all]` group. A host already listed with a
/// different address has its line replaced; listed hosts are not repeated.
pub fn merge_inventory(existing: &str, lines: &[String]) -> String {
    let mut out: Vec<String> = existing.lines().map(str::to_string).collect();

    let header = match out.iter().position(|l| l.trim() == INVENTORY_GROUP) {
        Some(index) => index,
        None => {
            out.insert(0, INVENTORY_GROUP.to_string());
            0
        }
    };

    for line in lines {
        let key = inventory_key(line);
        let section_end = out[header + 1..]
            .iter()
            .position(|l| l.trim_start().starts_with('['))
            .map_or(out.len(), |offset| header + 1 + offset);

        let existing_index = out[header + 1..section_end]
            .iter()
            .position(|l| key.is_some() && inventory_key(l) == key)
            .map(|offset| header + 1 + offset);

        match existing_index {
            Some(index) => out[index] = line.clone(),
            None => {
                let mut insert_at = section_end;
                while insert_at > header + 1 && out[insert_at - 1].trim().is_empty() {
                    insert_at -= 1;
                }
                out.insert(insert_at, line.clone());
            }
        }
    }

    join_lines(&out)
}

fn is_loopback(address: &str) -> bool {
    address.starts_with("127.") || address == "::1"
}

/// Merge `<ip> <name>` lines into a hosts file. Exact duplicates are
/// skipped; a non-loopback line mapping the same single name to another
/// address is replaced.
pub fn merge_hosts(existing: &str, lines: &[String]) -> String {
    let mut out: Vec<String> = existing.lines().map(str::to_string).collect();

    for line in lines {
        if out.iter().any(|l| l.split_whitespace().eq(line.split_whitespace())) {
            continue;
        }

        let name = line.split_whitespace().nth(1);
        let stale = out.iter().position(|l| {
            let fields: Vec<&str> = l.split_whitespace().collect();
            fields.len() == 2
                && !fields[0].starts_with('#')
                && !is_loopback(fields[0])
                && Some(fields[1]) == name
        });

        match stale {
            Some(index) => out[index] = line.clone(),
            None => out.push(line.clone()),
        }
    }

    join_lines(&out)
}

fn join_lines(lines: &[String]) -> String {
    let mut joined = lines.join("\n");
    joined.push('\n');
    joined
}
