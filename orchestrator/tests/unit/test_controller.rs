//! Deployment controller tests

use std::time::Duration;

use tokio::time::Instant;

use slotctl::deploy::controller::DeployOptions;
use slotctl::models::deployment::RecordStatus;
use slotctl::models::health::HealthStatus;
use slotctl::models::slot::Slot;
use slotctl::stop::stop_channel;

use crate::common::{FakeBuilder, FakeProbe, FakeSync, Harness};

#[tokio::test(start_paused = true)]
async fn test_fresh_deploy_promotes_staged_slot() {
    let harness = Harness::new();
    let controller = harness.controller();

    assert!(
        controller
            .deploy(Slot::Green, "1.2.0", DeployOptions::default())
            .await
    );

    let state = harness.store.load().await;
    assert_eq!(state.live_slot(), Slot::Green);
    assert_eq!(state.staged_slot(), Slot::Blue);
    assert_eq!(state.history().len(), 1);
    let record = &state.history()[0];
    assert_eq!(record.slot, Slot::Green);
    assert_eq!(record.version, "1.2.0");
    assert_eq!(record.status, RecordStatus::Success);

    assert_eq!(harness.routed_slot(), Some(Slot::Green));
    assert_eq!(harness.supervisor.started(), vec![Slot::Green]);
    assert_eq!(harness.sync.calls(), vec![(Slot::Blue, Slot::Green)]);
    // one diagnostic probe of the live slot
    assert_eq!(harness.probe.calls(Slot::Blue), 1);
}

#[tokio::test(start_paused = true)]
async fn test_gate_timeout_fails_and_rolls_back() {
    let probe = FakeProbe::new(HealthStatus::Healthy, HealthStatus::Unhealthy);
    let harness = Harness::with(probe, FakeBuilder::default(), FakeSync::default());
    let controller = harness.controller();

    let started = Instant::now();
    assert!(
        !controller
            .deploy(Slot::Green, "1.3.0", DeployOptions::default())
            .await
    );

    // 30s at 5s intervals
    assert_eq!(harness.probe.calls(Slot::Green), 6);
    assert!(started.elapsed() >= Duration::from_secs(5 + 25));
    assert!(started.elapsed() < Duration::from_secs(5 + 30));

    let state = harness.store.load().await;
    assert_eq!(state.live_slot(), Slot::Blue);
    assert_eq!(state.history().len(), 1);
    assert_eq!(state.history()[0].status, RecordStatus::Failed);
    assert!(state.history()[0]
        .error_detail
        .as_deref()
        .unwrap()
        .contains("after 6 attempts"));

    // stop failures during rollback are swallowed
    assert_eq!(harness.supervisor.stopped(), vec![Slot::Green]);
    assert_eq!(harness.routed_slot(), Some(Slot::Blue));
}

#[tokio::test(start_paused = true)]
async fn test_healthy_on_final_attempt_succeeds() {
    let probe = FakeProbe::new(HealthStatus::Healthy, HealthStatus::Healthy);
    probe.script(Slot::Green, vec![HealthStatus::Unreachable; 5]);
    let harness = Harness::with(probe, FakeBuilder::default(), FakeSync::default());

    assert!(
        harness
            .controller()
            .deploy(Slot::Green, "1.4.0", DeployOptions::default())
            .await
    );
    // six gating probes plus the switcher's own check
    assert_eq!(harness.probe.calls(Slot::Green), 7);
    assert_eq!(harness.store.load().await.live_slot(), Slot::Green);
}

#[tokio::test(start_paused = true)]
async fn test_deploy_to_live_slot_is_rejected() {
    let harness = Harness::new();

    assert!(
        !harness
            .controller()
            .deploy(Slot::Blue, "2.0.0", DeployOptions::default())
            .await
    );

    assert!(harness.builder.builds().is_empty());
    let state = harness.store.load().await;
    assert_eq!(state.live_slot(), Slot::Blue);
    assert_eq!(state.last_deployment().unwrap().status, RecordStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_build_failure_rolls_back() {
    let harness = Harness::with(
        FakeProbe::healthy(),
        FakeBuilder::failing("npm ERR! code ELIFECYCLE"),
        FakeSync::default(),
    );

    assert!(
        !harness
            .controller()
            .deploy(Slot::Green, "1.5.0", DeployOptions::default())
            .await
    );

    assert_eq!(harness.supervisor.stopped(), vec![Slot::Green]);
    assert!(harness.supervisor.started().is_empty());
    let record = harness.store.load().await.last_deployment().cloned().unwrap();
    assert!(record.error_detail.unwrap().contains("ELIFECYCLE"));
}

#[tokio::test(start_paused = true)]
async fn test_missing_slot_dir_fails_without_rollback() {
    let harness = Harness::new();
    std::fs::remove_dir_all(harness.dir.path().join("backend/green")).unwrap();

    assert!(
        !harness
            .controller()
            .deploy(Slot::Green, "1.6.0", DeployOptions::default())
            .await
    );

    assert!(harness.builder.builds().is_empty());
    assert!(harness.supervisor.stopped().is_empty());
    assert!(harness.sync.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sync_failure_does_not_block_deploy() {
    let harness = Harness::with(FakeProbe::healthy(), FakeBuilder::default(), FakeSync::failing());

    assert!(
        harness
            .controller()
            .deploy(Slot::Green, "1.7.0", DeployOptions::default())
            .await
    );
    assert_eq!(harness.sync.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_skip_sync_and_switch() {
    let harness = Harness::new();
    let options = DeployOptions {
        skip_sync: true,
        skip_switch: true,
    };

    assert!(harness.controller().deploy(Slot::Green, "1.8.0", options).await);

    assert!(harness.sync.calls().is_empty());
    assert_eq!(harness.proxy.reloads(), 0);
    let state = harness.store.load().await;
    assert_eq!(state.live_slot(), Slot::Blue);
    assert_eq!(state.last_deployment().unwrap().status, RecordStatus::Success);
}

#[tokio::test(start_paused = true)]
async fn test_deploy_staged_targets_other_slot() {
    let harness = Harness::new();
    harness.store.promote(Slot::Green).await;
    std::fs::write(harness.config.path(), crate::common::nginx_config("green")).unwrap();

    assert!(
        harness
            .controller()
            .deploy_staged("3.0.0", DeployOptions::default())
            .await
    );
    assert_eq!(harness.store.load().await.live_slot(), Slot::Blue);
    assert_eq!(harness.routed_slot(), Some(Slot::Blue));
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_health_gating() {
    let probe = FakeProbe::new(HealthStatus::Healthy, HealthStatus::Unhealthy);
    let harness = Harness::with(probe, FakeBuilder::default(), FakeSync::default());
    let (stop, listener) = stop_channel();
    let controller = harness.controller().with_stop(listener);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        stop.stop();
    });

    assert!(
        !controller
            .deploy(Slot::Green, "1.9.0", DeployOptions::default())
            .await
    );
    assert!(harness.probe.calls(Slot::Green) < 6);
    let record = harness.store.load().await.last_deployment().cloned().unwrap();
    assert!(record.error_detail.unwrap().contains("cancelled"));
}
