//! Integration tests for control-node bootstrap against the mock remote shell.

mod common;

use common::{addressed, Fixture};
use fleet_core::CommandOutput;
use fleet_orchestrator::{Bootstrapper, DesiredState, OrchestratorError, VmRecord};
use fleet_provider::mock::MockConnector;
use fleet_provider::ProviderError;

const INVENTORY: &str = "/root/inventory";

fn fleet() -> Vec<VmRecord> {
    vec![
        addressed("Control-Plane", "10.0.0.2", DesiredState::Start),
        addressed("Worker1", "10.0.0.3", DesiredState::Start),
        addressed("Web Server", "10.0.0.4", DesiredState::Start),
        addressed("Spare", "10.0.0.5", DesiredState::Stop),
    ]
}

#[test]
fn test_missing_control_address_never_connects() {
    let fixture = Fixture::new();
    let connector = MockConnector::new();
    let records = vec![
        VmRecord::new("Control-Plane", DesiredState::Start),
        addressed("Worker1", "10.0.0.3", DesiredState::Start),
    ];

    let err = Bootstrapper::new(&fixture.config, &connector)
        .bootstrap_control_node(&records)
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::NoControlNodeAddress { ref name } if name == "Control-Plane"));
    assert!(connector.connects().is_empty());
}

#[test]
fn test_bootstrap_configures_control_node() {
    let fixture = Fixture::new();
    let connector = MockConnector::new();
    connector.put_file("/etc/hosts", "127.0.0.1 localhost\n", 0o644);

    let targets = Bootstrapper::new(&fixture.config, &connector)
        .bootstrap_control_node(&fleet())
        .unwrap();

    let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["Worker1", "Web-Server"]);
    assert_eq!(connector.connects(), vec!["10.0.0.2".to_string()]);

    let config = connector.file("/root/ansible.cfg").unwrap();
    assert_eq!(config.mode, 0o644);
    assert_eq!(
        config.text(),
        "[defaults]\ninventory = /root/inventory\nforks = 10\ndeprecation_warnings = False\n"
    );

    assert_eq!(
        connector.file(INVENTORY).unwrap().text(),
        "[all]\n\
         Worker1 ansible_host=10.0.0.3 ansible_python_interpreter=/usr/bin/python3\n\
         Web-Server ansible_host=10.0.0.4 ansible_python_interpreter=/usr/bin/python3\n"
    );
    assert_eq!(
        connector.file("/etc/hosts").unwrap().text(),
        "127.0.0.1 localhost\n10.0.0.3 Worker1\n10.0.0.4 Web-Server\n"
    );

    let commands = connector.commands();
    assert!(commands[0].starts_with("DEBIAN_FRONTEND=noninteractive apt-get install -y ansible ansible-core"));
    assert_eq!(
        commands[1],
        "ansible-galaxy collection install ansible.posix community.general community.crypto"
    );
    assert!(commands[2].starts_with("ssh-keygen -y -f /root/.ssh/id_rsa"));
    assert_eq!(
        commands[3],
        "sshpass -p s3cret ssh-copy-id -f -o StrictHostKeyChecking=no root@10.0.0.3"
    );
    assert_eq!(
        commands[4],
        "sshpass -p s3cret ssh-copy-id -f -o StrictHostKeyChecking=no root@10.0.0.4"
    );
    assert_eq!(commands.len(), 5);
    assert_eq!(connector.open_sessions(), 0);
}

#[test]
fn test_rerun_keeps_one_inventory_line_per_target() {
    let fixture = Fixture::new();
    let connector = MockConnector::new();
    let bootstrapper = Bootstrapper::new(&fixture.config, &connector);

    bootstrapper.bootstrap_control_node(&fleet()).unwrap();
    bootstrapper.bootstrap_control_node(&fleet()).unwrap();

    let inventory = connector.file(INVENTORY).unwrap().text();
    assert_eq!(inventory.matches("Worker1 ansible_host").count(), 1);
    assert_eq!(inventory.matches("Web-Server ansible_host").count(), 1);
    assert_eq!(inventory.matches("[all]").count(), 1);

    let hosts = connector.file("/etc/hosts").unwrap().text();
    assert_eq!(hosts.matches("10.0.0.3 Worker1").count(), 1);
    assert_eq!(connector.sessions_opened(), 2);
}

#[test]
fn test_valid_keypair_is_kept() {
    let fixture = Fixture::new();
    let connector = MockConnector::new();

    Bootstrapper::new(&fixture.config, &connector)
        .bootstrap_control_node(&fleet())
        .unwrap();

    let commands = connector.commands();
    assert!(!commands.iter().any(|c| c.contains("ssh-keygen -t rsa")));
    assert!(commands
        .iter()
        .any(|c| c == "ssh-keygen -y -f /root/.ssh/id_rsa > /root/.ssh/id_rsa.pub"));
}

#[test]
fn test_missing_keypair_is_generated() {
    let fixture = Fixture::new();
    let connector = MockConnector::new();
    connector.fail_command("ssh-keygen -y", 255, "Load key \"/root/.ssh/id_rsa\": No such file");

    Bootstrapper::new(&fixture.config, &connector)
        .bootstrap_control_node(&fleet())
        .unwrap();

    let commands = connector.commands();
    let generate = commands
        .iter()
        .find(|c| c.contains("ssh-keygen -t rsa -b 2048"))
        .expect("keypair generation command");
    assert!(generate.starts_with("rm -f /root/.ssh/id_rsa /root/.ssh/id_rsa.pub"));
    assert!(generate.contains("chmod 700 /root/.ssh"));
    assert!(generate.ends_with("-q -N ''"));

    let generate_index = commands.iter().position(|c| c == generate).unwrap();
    let first_copy = commands.iter().position(|c| c.contains("ssh-copy-id")).unwrap();
    assert!(generate_index < first_copy);
}

#[test]
fn test_failing_step_aborts_and_closes_session() {
    let fixture = Fixture::new();
    let connector = MockConnector::new();
    connector.fail_command("apt-get install", 100, "E: Unable to locate package 7zip");

    let err = Bootstrapper::new(&fixture.config, &connector)
        .bootstrap_control_node(&fleet())
        .unwrap_err();

    match err {
        OrchestratorError::RemoteCommand {
            exit_status,
            detail,
            ..
        } => {
            assert_eq!(exit_status, 100);
            assert!(detail.contains("Unable to locate package"));
        }
        other => panic!("Expected RemoteCommand, got {other:?}"),
    }
    assert_eq!(connector.commands().len(), 1);
    assert!(connector.file(INVENTORY).is_none());
    assert_eq!(connector.open_sessions(), 0);
}

#[test]
fn test_stderr_output_alone_is_not_a_failure() {
    let fixture = Fixture::new();
    let connector = MockConnector::new();
    connector.respond(
        "ansible-galaxy",
        CommandOutput::new("", "[WARNING]: Collection ansible.posix was already installed", 0),
    );

    let result = Bootstrapper::new(&fixture.config, &connector).bootstrap_control_node(&fleet());

    assert!(result.is_ok());
}

#[test]
fn test_failed_key_copy_aborts() {
    let fixture = Fixture::new();
    let connector = MockConnector::new();
    connector.fail_command("root@10.0.0.3", 1, "Permission denied");

    let err = Bootstrapper::new(&fixture.config, &connector)
        .bootstrap_control_node(&fleet())
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::RemoteCommand { ref step, .. } if step == "Copying SSH key to Worker1"));
    assert!(!connector.commands().iter().any(|c| c.contains("root@10.0.0.4")));
}

#[test]
fn test_credential_is_quoted_for_the_shell() {
    let mut fixture = Fixture::new();
    fixture.config.credentials.password = "it's secret".to_string();
    let connector = MockConnector::new();

    Bootstrapper::new(&fixture.config, &connector)
        .bootstrap_control_node(&fleet())
        .unwrap();

    assert!(connector
        .commands()
        .iter()
        .any(|c| c.starts_with("sshpass -p 'it'\"'\"'s secret' ssh-copy-id")));
}

#[test]
fn test_rejected_credential_is_auth_error() {
    let fixture = Fixture::new();
    let connector = MockConnector::new();
    connector.reject_credentials();

    let err = Bootstrapper::new(&fixture.config, &connector)
        .bootstrap_control_node(&fleet())
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Remote(ProviderError::Auth { .. })));
}

#[test]
fn test_configured_control_node_name_is_used() {
    let mut fixture = Fixture::new();
    fixture.config.settings.control_node = "Dragon".to_string();
    let connector = MockConnector::new();
    let records = vec![
        addressed("Dragon", "10.0.1.1", DesiredState::Start),
        addressed("Control-Plane", "10.0.1.2", DesiredState::Start),
    ];

    let targets = Bootstrapper::new(&fixture.config, &connector)
        .bootstrap_control_node(&records)
        .unwrap();

    assert_eq!(connector.connects(), vec!["10.0.1.1".to_string()]);
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].name, "Control-Plane");
}
