// CLI argument parsing and definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "fleet")]
#[command(about = "Provision and configure a lab fleet of VMware virtual machines")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a fleet settings file (defaults to ./fleet.yaml if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Clone, boot and discover addresses for every VM in the state file
    Provision,
    /// Install Ansible on the control node and distribute SSH trust
    Bootstrap,
    /// Upload playbooks to the control node and run the manifest
    Playbooks {
        /// Manifest to run instead of the configured one
        #[arg(short, long)]
        manifest: Option<PathBuf>,
    },
    /// Boot every provisioned VM whose desired state is "start"
    Boot,
    /// Stop every provisioned VM
    Stop {
        /// Only stop VMs the hypervisor reports as running
        #[arg(long)]
        skip_stopped: bool,
    },
    /// Show the fleet state file
    Status,
    /// Provision, bootstrap and run playbooks in one go
    Up,
}
