//! Rollback monitor tests

use std::sync::Arc;
use std::time::Duration;

use slotctl::models::health::HealthStatus;
use slotctl::models::slot::Slot;
use slotctl::monitor::notify::{AUTOMATED_ROLLBACK, HIGH_ERROR_RATE};
use slotctl::monitor::rollback::{CycleOutcome, MonitorExit, MonitorOptions, RollbackMonitor};

use crate::common::{FakeBuilder, FakeEstimator, FakeProbe, FakeSync, Harness, RecordingNotifier};

fn monitor(
    harness: &Harness,
    estimator: FakeEstimator,
) -> (Arc<RollbackMonitor>, Arc<FakeEstimator>, Arc<RecordingNotifier>) {
    let estimator = Arc::new(estimator);
    let notifier = Arc::new(RecordingNotifier::default());
    let monitor = Arc::new(RollbackMonitor::new(
        harness.store.clone(),
        harness.switcher.clone(),
        estimator.clone(),
        notifier.clone(),
        MonitorOptions::default(),
    ));
    (monitor, estimator, notifier)
}

#[tokio::test]
async fn test_threshold_is_exclusive() {
    let harness = Harness::new();
    let (monitor, _, _) = monitor(&harness, FakeEstimator::new(vec![0.05, 0.051], 0.0));

    assert!(matches!(monitor.run_cycle().await, CycleOutcome::Nominal { .. }));
    assert_eq!(monitor.consecutive_failures(), 0);

    match monitor.run_cycle().await {
        CycleOutcome::Degraded {
            consecutive_failures,
            ..
        } => assert_eq!(consecutive_failures, 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(monitor.last_cycle().is_some());
}

#[tokio::test]
async fn test_interleaved_recoveries_never_fail_back() {
    let harness = Harness::new();
    let rates = vec![0.3, 0.3, 0.0, 0.3, 0.3, 0.01, 0.3, 0.3];
    let (monitor, _, notifier) = monitor(&harness, FakeEstimator::new(rates.clone(), 0.0));

    for _ in &rates {
        assert!(!matches!(
            monitor.run_cycle().await,
            CycleOutcome::RolledBack { .. } | CycleOutcome::Emergency { .. }
        ));
    }
    assert_eq!(monitor.consecutive_failures(), 2);
    assert!(notifier.sent().is_empty());
    assert_eq!(harness.proxy.reloads(), 0);
}

#[tokio::test]
async fn test_sustained_errors_fail_back() {
    let harness = Harness::new();
    harness.store.promote(Slot::Blue).await;
    let (monitor, estimator, notifier) = monitor(&harness, FakeEstimator::new(vec![], 1.0));

    assert!(matches!(monitor.run_cycle().await, CycleOutcome::Degraded { .. }));
    assert!(matches!(monitor.run_cycle().await, CycleOutcome::Degraded { .. }));
    let notification = match monitor.run_cycle().await {
        CycleOutcome::RolledBack { notification } => notification,
        other => panic!("unexpected outcome: {other:?}"),
    };

    assert_eq!(notification.event, AUTOMATED_ROLLBACK);
    assert_eq!(notification.reason, HIGH_ERROR_RATE);
    assert_eq!(notification.from_slot, Slot::Blue);
    assert_eq!(notification.to_slot, Slot::Green);
    assert_eq!(notification.error_rate, 1.0);
    assert_eq!(notification.threshold, 0.05);
    assert_eq!(notifier.sent(), vec![notification]);

    assert_eq!(monitor.consecutive_failures(), 0);
    assert_eq!(harness.store.load().await.live_slot(), Slot::Green);
    assert_eq!(harness.routed_slot(), Some(Slot::Green));
    assert_eq!(estimator.slots(), vec![Slot::Blue; 3]);

    // the next cycle watches the new live slot
    monitor.run_cycle().await;
    assert_eq!(estimator.slots().last(), Some(&Slot::Green));
}

#[tokio::test]
async fn test_live_slot_falls_back_to_directive() {
    let harness = Harness::new();
    std::fs::write(harness.config.path(), crate::common::nginx_config("green")).unwrap();
    let (monitor, estimator, _) = monitor(&harness, FakeEstimator::new(vec![], 0.0));

    monitor.run_cycle().await;
    assert_eq!(estimator.slots(), vec![Slot::Green]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_failback_halts_loop() {
    let probe = FakeProbe::new(HealthStatus::Healthy, HealthStatus::Unreachable);
    let harness = Harness::with(probe, FakeBuilder::default(), FakeSync::default());
    let (monitor, _, notifier) = monitor(&harness, FakeEstimator::new(vec![], 1.0));

    assert!(monitor.start());
    let exit = tokio::time::timeout(Duration::from_secs(300), monitor.exited())
        .await
        .unwrap();

    match exit {
        MonitorExit::Emergency(error) => assert!(error.contains("Cannot switch traffic to green")),
        other => panic!("unexpected exit: {other:?}"),
    }
    assert!(notifier.sent().is_empty());
    assert_eq!(harness.routed_slot(), Some(Slot::Blue));
    assert!(matches!(
        monitor.last_cycle().unwrap().outcome,
        CycleOutcome::Emergency {
            from_slot: Slot::Blue,
            to_slot: Slot::Green,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_start_and_stop_are_idempotent() {
    let harness = Harness::new();
    let (monitor, estimator, _) = monitor(&harness, FakeEstimator::new(vec![], 0.0));

    assert!(monitor.start());
    assert!(!monitor.start());
    assert!(monitor.is_running());

    tokio::time::sleep(Duration::from_secs(65)).await;
    // immediate first cycle, then every 30s
    assert_eq!(estimator.slots().len(), 3);

    assert_eq!(monitor.stop().await, Some(MonitorExit::Stopped));
    assert_eq!(monitor.stop().await, None);
    assert!(!monitor.is_running());
    assert_eq!(monitor.exited().await, MonitorExit::Stopped);
}
