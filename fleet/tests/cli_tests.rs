use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const STATE: &str = r#"[
    {"name": "Control-Plane", "path": null, "ip": null, "state": "start"},
    {"name": "Worker1", "path": null, "ip": "10.0.0.3", "state": "stop"}
]"#;

/// `fleet` running in `dir` with the required environment and console-only
/// logging.
fn fleet(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin("fleet"));
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("FLEET_CONFIG")
        .env("LOG_OUTPUT", "console")
        .env("BASE_VM_DIR", dir.join("vms"))
        .env("BASE_VM_PATH", "/images/base/base.vmx")
        .env("BASE_VM_USERNAME", "root")
        .env("BASE_VM_PASSWORD", "s3cret");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = tempdir().unwrap();
    fleet(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("provision")
                .and(predicate::str::contains("bootstrap"))
                .and(predicate::str::contains("playbooks"))
                .and(predicate::str::contains("status")),
        );
}

#[test]
fn test_status_prints_state_table() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("vms.json"), STATE).unwrap();

    fleet(dir.path())
        .env("LOG_LEVEL", "warn")
        .arg("status")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Control-Plane *")
                .and(predicate::str::contains("10.0.0.3")),
        );
}

#[test]
fn test_missing_environment_is_fatal() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("vms.json"), STATE).unwrap();

    fleet(dir.path())
        .env_remove("BASE_VM_PASSWORD")
        .arg("status")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("BASE_VM_PASSWORD"));
}

#[test]
fn test_bootstrap_without_control_address_fails() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("vms.json"), STATE).unwrap();

    fleet(dir.path())
        .arg("bootstrap")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Control-Plane' has no address"));
}

#[test]
fn test_settings_file_renames_control_node() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("vms.json"), STATE).unwrap();
    fs::write(dir.path().join("lab.yaml"), "control_node: Worker1\n").unwrap();

    fleet(dir.path())
        .env("LOG_LEVEL", "warn")
        .args(["--config", "lab.yaml", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Worker1 *"));
}

#[test]
fn test_corrupt_state_file_is_fatal() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("vms.json"), "{not json").unwrap();

    fleet(dir.path())
        .arg("status")
        .assert()
        .failure()
        .stdout(predicate::str::contains("is corrupt"));
}

#[test]
fn test_dotenv_file_supplies_environment() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("vms.json"), STATE).unwrap();
    fs::write(
        dir.path().join(".env"),
        "BASE_VM_DIR=vms\nBASE_VM_PATH=/images/base/base.vmx\nBASE_VM_USERNAME=root\nBASE_VM_PASSWORD=s3cret\n",
    )
    .unwrap();

    fleet(dir.path())
        .env_remove("BASE_VM_DIR")
        .env_remove("BASE_VM_PATH")
        .env_remove("BASE_VM_USERNAME")
        .env_remove("BASE_VM_PASSWORD")
        .env("LOG_LEVEL", "warn")
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Control-Plane *"));
}

#[test]
fn test_up_with_missing_manifest_touches_nothing() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("vms.json"), STATE).unwrap();

    fleet(dir.path())
        .arg("up")
        .assert()
        .failure()
        .stdout(
            predicate::str::contains("Failed to read playbook manifest")
                .and(predicate::str::contains("Dependency not found").not())
                .and(predicate::str::contains("Connecting to control node").not()),
        );

    assert_eq!(fs::read_to_string(dir.path().join("vms.json")).unwrap(), STATE);
    assert!(!dir.path().join("vms").exists());
}

#[test]
fn test_up_with_missing_artifact_touches_nothing() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("vms.json"), STATE).unwrap();
    fs::create_dir(dir.path().join("playbooks")).unwrap();
    fs::write(
        dir.path().join("playbooks.json"),
        r#"[{"name": "nginx", "installation": "install_nginx.yml", "execute_installation": true}]"#,
    )
    .unwrap();

    fleet(dir.path())
        .arg("up")
        .assert()
        .failure()
        .stdout(
            predicate::str::contains("install_nginx.yml")
                .and(predicate::str::contains("Dependency not found").not())
                .and(predicate::str::contains("Connecting to control node").not()),
        );

    assert_eq!(fs::read_to_string(dir.path().join("vms.json")).unwrap(), STATE);
}
