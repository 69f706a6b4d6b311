//! Deployment FSM tests

use slotctl::deploy::fsm::{DeployEvent, DeployFsm, DeployPhase};

#[test]
fn test_fsm_initial_phase() {
    let fsm = DeployFsm::new();
    assert_eq!(fsm.phase(), DeployPhase::Pending);
    assert!(fsm.error().is_none());
    assert!(fsm.failed_in().is_none());
    assert!(!fsm.phase().is_terminal());
}

#[test]
fn test_fsm_skip_switch_flow() {
    let mut fsm = DeployFsm::new();

    for event in [
        DeployEvent::Begin,
        DeployEvent::Cleaned,
        DeployEvent::Validated,
        DeployEvent::Synced,
        DeployEvent::Built,
        DeployEvent::Healthy,
    ] {
        fsm.process(event).unwrap();
    }
    assert_eq!(fsm.phase(), DeployPhase::Switching);

    fsm.process(DeployEvent::SwitchSkipped).unwrap();
    assert_eq!(fsm.phase(), DeployPhase::Done);
}

#[test]
fn test_fsm_switch_failure_rolls_back() {
    let mut fsm = DeployFsm::new();

    for event in [
        DeployEvent::Begin,
        DeployEvent::Cleaned,
        DeployEvent::Validated,
        DeployEvent::Synced,
        DeployEvent::Built,
        DeployEvent::Healthy,
    ] {
        fsm.process(event).unwrap();
    }

    fsm.process(DeployEvent::Fail("directive not found".to_string()))
        .unwrap();
    assert_eq!(fsm.phase(), DeployPhase::RollingBack);
    assert_eq!(fsm.failed_in(), Some(DeployPhase::Switching));

    fsm.process(DeployEvent::RolledBack).unwrap();
    assert_eq!(fsm.phase(), DeployPhase::Failed);
    assert_eq!(fsm.error(), Some("directive not found"));
}

#[test]
fn test_fsm_terminal_phases_reject_events() {
    let mut fsm = DeployFsm::new();
    fsm.process(DeployEvent::Begin).unwrap();
    fsm.process(DeployEvent::Fail("disk full".to_string())).unwrap();
    assert_eq!(fsm.phase(), DeployPhase::Failed);

    assert!(fsm.process(DeployEvent::Begin).is_err());
    assert!(fsm.process(DeployEvent::Fail("again".to_string())).is_err());
    assert_eq!(fsm.error(), Some("disk full"));
}

#[test]
fn test_fsm_phase_names() {
    assert_eq!(DeployPhase::HealthGating.to_string(), "health_gating");
    assert_eq!(
        serde_json::to_string(&DeployPhase::RollingBack).unwrap(),
        "\"rolling_back\""
    );
}
