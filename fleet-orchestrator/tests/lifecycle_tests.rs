//! Integration tests for bulk boot and stop.

mod common;

use common::Fixture;
use fleet_config::StopPolicy;
use fleet_orchestrator::{DesiredState, LifecycleController, OrchestratorError, VmRecord};
use fleet_provider::mock::{HypervisorCall, MockHypervisor};
use std::path::PathBuf;

fn fleet(fixture: &Fixture) -> Vec<VmRecord> {
    vec![
        fixture.provisioned("Control-Plane", "10.0.0.2", DesiredState::Start),
        fixture.provisioned("Worker1", "10.0.0.3", DesiredState::Start),
        fixture.provisioned("Idle", "10.0.0.4", DesiredState::Stop),
        VmRecord::new("Planned", DesiredState::Start),
    ]
}

#[test]
fn test_boot_all_starts_wanted_provisioned_vms() {
    let fixture = Fixture::new();
    let hypervisor = MockHypervisor::new();

    let booted = LifecycleController::new(&hypervisor, StopPolicy::Always)
        .boot_all(&fleet(&fixture))
        .unwrap();

    assert_eq!(booted, 2);
    assert_eq!(
        hypervisor.starts(),
        vec![fixture.vm_path("Control-Plane"), fixture.vm_path("Worker1")]
    );
}

#[test]
fn test_stop_all_always_stops_every_known_path() {
    let fixture = Fixture::new();
    let hypervisor = MockHypervisor::new().with_running(fixture.vm_path("Worker1"));

    let stopped = LifecycleController::new(&hypervisor, StopPolicy::Always)
        .stop_all(&fleet(&fixture))
        .unwrap();

    assert_eq!(stopped, 3);
    assert!(!hypervisor.calls().contains(&HypervisorCall::RunningVms));
    assert_eq!(
        hypervisor.stops(),
        vec![
            fixture.vm_path("Control-Plane"),
            fixture.vm_path("Worker1"),
            fixture.vm_path("Idle"),
        ]
    );
}

#[test]
fn test_stop_all_skip_stopped_only_stops_running_vms() {
    let fixture = Fixture::new();
    let hypervisor = MockHypervisor::new().with_running(fixture.vm_path("Worker1"));

    let stopped = LifecycleController::new(&hypervisor, StopPolicy::SkipStopped)
        .stop_all(&fleet(&fixture))
        .unwrap();

    assert_eq!(stopped, 1);
    assert_eq!(hypervisor.stops(), vec![fixture.vm_path("Worker1")]);
}

#[test]
fn test_skip_stopped_matches_relative_record_paths() {
    let relative = PathBuf::from("vms/Worker1/Worker1.vmx");
    let listed = std::env::current_dir().unwrap().join(&relative);
    let records = vec![VmRecord {
        name: "Worker1".to_string(),
        path: Some(relative.clone()),
        ip: Some("10.0.0.3".to_string()),
        state: DesiredState::Start,
    }];
    let hypervisor = MockHypervisor::new().with_running(listed);

    let stopped = LifecycleController::new(&hypervisor, StopPolicy::SkipStopped)
        .stop_all(&records)
        .unwrap();

    assert_eq!(stopped, 1);
    assert_eq!(hypervisor.stops(), vec![relative]);
}

#[test]
fn test_boot_failure_is_fatal() {
    let fixture = Fixture::new();
    let records = fleet(&fixture);
    let hypervisor = MockHypervisor::new().fail_start(fixture.vm_path("Control-Plane"));

    let err = LifecycleController::new(&hypervisor, StopPolicy::Always)
        .boot_all(&records)
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Lifecycle { action: "boot", ref vm, .. } if vm == "Control-Plane"
    ));
    assert_eq!(hypervisor.starts().len(), 1);
}

#[test]
fn test_stop_failure_is_fatal() {
    let fixture = Fixture::new();
    let records = fleet(&fixture);
    let hypervisor = MockHypervisor::new().fail_stop(fixture.vm_path("Worker1"));

    let err = LifecycleController::new(&hypervisor, StopPolicy::Always)
        .stop_all(&records)
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Lifecycle { action: "stop", .. }));
    assert_eq!(hypervisor.stops().len(), 2);
}
