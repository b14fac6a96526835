use anyhow::Result;
use fleet_config::FleetConfig;
use fleet_orchestrator::{DesiredState, FleetStore, VmRecord};

pub fn handle_status(config: &FleetConfig, store: &FleetStore) -> Result<()> {
    let records = store.load()?;
    print!("{}", render_status(&records, &config.settings.control_node));
    Ok(())
}

fn provisioning(record: &VmRecord) -> &'static str {
    match &record.path {
        Some(path) if !path.exists() => "stale",
        Some(_) if record.ip.is_some() => "ready",
        _ => "pending",
    }
}

pub fn render_status(records: &[VmRecord], control_node: &str) -> String {
    let mut out = format!(
        "{:<20} {:<7} {:<9} {:<16} {}\n",
        "NAME", "STATE", "STATUS", "IP ADDRESS", "PATH"
    );

    for record in records {
        let name = if record.name == control_node {
            format!("{} *", record.name)
        } else {
            record.name.clone()
        };
        let state = match record.state {
            DesiredState::Start => "start",
            DesiredState::Stop => "stop",
        };
        let path = record
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "N/A".to_string());

        out.push_str(&format!(
            "{:<20} {:<7} {:<9} {:<16} {}\n",
            name,
            state,
            provisioning(record),
            record.ip.as_deref().unwrap_or("N/A"),
            path
        ));
    }
    out
}
