//! Traffic switcher tests

use tokio_test::assert_ok;

use slotctl::errors::SlotError;
use slotctl::models::health::HealthStatus;
use slotctl::models::slot::Slot;
use slotctl::proxy::reload::ReloadOutcome;

use crate::common::{nginx_config, FakeBuilder, FakeProbe, FakeSync, Harness};

#[tokio::test]
async fn test_switch_rewrites_reloads_and_promotes() {
    let harness = Harness::new();

    let report = assert_ok!(harness.switcher.switch_to(Slot::Green).await);
    assert_eq!(report.previous, Some(Slot::Blue));
    assert!(report.config_written);
    assert_eq!(report.reload, ReloadOutcome::Reloaded);

    assert_eq!(harness.config_text(), nginx_config("green"));
    assert_eq!(harness.proxy.reloads(), 1);

    let state = harness.store.load().await;
    assert_eq!(state.live_slot(), Slot::Green);
    assert_eq!(state.staged_slot(), Slot::Blue);
}

#[tokio::test]
async fn test_switch_twice_writes_once() {
    let harness = Harness::new();

    let first = assert_ok!(harness.switcher.switch_to(Slot::Green).await);
    let state_after_first = harness.store.load().await;
    let second = assert_ok!(harness.switcher.switch_to(Slot::Green).await);

    assert!(first.config_written);
    assert!(!second.config_written);
    assert_eq!(second.reload, ReloadOutcome::Skipped);
    assert_eq!(harness.proxy.reloads(), 1);
    assert_eq!(harness.config_text(), nginx_config("green"));
    assert!(harness.store.load().await.same_content(&state_after_first));
}

#[tokio::test]
async fn test_unhealthy_target_is_refused_before_touching_config() {
    let probe = FakeProbe::new(HealthStatus::Healthy, HealthStatus::Unreachable);
    let harness = Harness::with(probe, FakeBuilder::default(), FakeSync::default());

    let err = harness.switcher.switch_to(Slot::Green).await.unwrap_err();
    assert!(matches!(
        err,
        SlotError::TargetUnhealthy {
            slot: Slot::Green,
            status: HealthStatus::Unreachable
        }
    ));
    assert_eq!(harness.config_text(), nginx_config("blue"));
    assert_eq!(harness.proxy.reloads(), 0);
    assert!(harness.store.read_existing().await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_directive_is_fatal() {
    let harness = Harness::new();
    std::fs::write(harness.config.path(), "http { server { listen 80; } }\n").unwrap();

    let err = harness.switcher.switch_to(Slot::Green).await.unwrap_err();
    match err {
        SlotError::DirectiveNotFound { path, .. } => assert_eq!(path, harness.config.path()),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(harness.proxy.reloads(), 0);
    assert!(harness.store.read_existing().await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_reload_is_degraded_success() {
    let harness = Harness::new();
    harness.proxy.set_outcome(ReloadOutcome::ManualReloadRequired {
        reason: "nginx: [error] open() failed".to_string(),
    });

    let report = assert_ok!(harness.switcher.switch_to(Slot::Green).await);
    assert!(report.is_degraded());
    assert_eq!(harness.routed_slot(), Some(Slot::Green));
    assert_eq!(harness.store.load().await.live_slot(), Slot::Green);
}

#[tokio::test]
async fn test_routed_slot_reads_directive() {
    let harness = Harness::new();
    assert_eq!(harness.switcher.routed_slot().await, Some(Slot::Blue));

    std::fs::remove_file(harness.config.path()).unwrap();
    assert_eq!(harness.switcher.routed_slot().await, None);
}
