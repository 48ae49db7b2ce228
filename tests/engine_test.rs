//! Audit Engine Integration Tests
//!
//! Timing tests run on tokio's paused clock.

use async_trait::async_trait;
use guest_dashboard_guard::{
    ActionMode, AuditEngine, DashboardRecord, DashboardSource, GuardConfig, GuardError,
    HostHandles, InMemoryHost, ShutdownOutcome, User,
};
use std::sync::Arc;
use std::time::Duration;

/// Strategy that answers from the in-memory host after a delay
struct SlowSource {
    inner: Arc<InMemoryHost>,
    delay: Duration,
}

#[async_trait]
impl DashboardSource for SlowSource {
    fn name(&self) -> &str {
        "slow"
    }

    async fn list_dashboards(&self) -> Result<Vec<DashboardRecord>, GuardError> {
        tokio::time::sleep(self.delay).await;
        self.inner.list_dashboards().await
    }
}

fn create_host() -> Arc<InMemoryHost> {
    let host = InMemoryHost::new();
    host.set_users(vec![User::admin("owner"), User::regular("guest")]);
    host.set_dashboards(vec![DashboardRecord::new("hall")
        .with_mode("storage")
        .with_visibility(true)]);
    host
}

fn slow_handles(host: &Arc<InMemoryHost>, delay: Duration) -> HostHandles {
    let source: Arc<dyn DashboardSource> = Arc::new(SlowSource {
        inner: host.clone(),
        delay,
    });
    HostHandles {
        sources: vec![source],
        ..host.handles()
    }
}

#[tokio::test(start_paused = true)]
async fn test_manual_trigger_runs_extra_cycle() {
    let host = create_host();
    let engine = AuditEngine::start(
        host.handles(),
        GuardConfig::default().with_interval_secs(3600),
    )
    .unwrap();
    let scheduler = engine.scheduler().clone();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.stats().cycles_run, 1);

    engine.trigger();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.stats().cycles_run, 2);

    assert_eq!(engine.shutdown().await, ShutdownOutcome::Graceful);
}

#[tokio::test(start_paused = true)]
async fn test_interval_change_applies_to_next_tick() {
    let host = create_host();
    let engine = AuditEngine::start(host.handles(), GuardConfig::default()).unwrap();
    let scheduler = engine.scheduler().clone();

    tokio::time::sleep(Duration::from_secs(1)).await;
    engine
        .reconfigure(GuardConfig::default().with_interval_secs(10))
        .unwrap();

    // ticks at t=11 and t=21
    tokio::time::sleep(Duration::from_secs(24)).await;
    assert_eq!(scheduler.stats().cycles_run, 3);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_reconfigure_waits_for_next_cycle() {
    let host = create_host();
    let engine = AuditEngine::start(
        slow_handles(&host, Duration::from_secs(5)),
        GuardConfig::default().with_interval_secs(3600),
    )
    .unwrap();
    let scheduler = engine.scheduler().clone();

    // first cycle is in flight until t=5
    tokio::time::sleep(Duration::from_secs(1)).await;
    engine
        .reconfigure(GuardConfig::default().with_interval_secs(3600).with_action_mode(ActionMode::AutoRevoke))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(scheduler.stats().cycles_run, 1);
    assert!(host.acl_updates().is_empty());

    engine.trigger();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(scheduler.stats().cycles_run, 2);
    assert_eq!(host.acl_updates().len(), 1);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_overrunning_cycle_does_not_overlap() {
    let host = create_host();
    let engine = AuditEngine::start(
        slow_handles(&host, Duration::from_secs(25)),
        GuardConfig::default().with_interval_secs(10),
    )
    .unwrap();
    let scheduler = engine.scheduler().clone();

    // cycles: 0..25, 25..50 (late tick fires on completion), 50..75
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(scheduler.stats().cycles_run, 2);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_lets_cycle_finish() {
    let host = create_host();
    let engine = AuditEngine::start(
        slow_handles(&host, Duration::from_secs(3)),
        GuardConfig::default(),
    )
    .unwrap();
    let scheduler = engine.scheduler().clone();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.shutdown().await, ShutdownOutcome::Graceful);
    assert_eq!(scheduler.stats().cycles_run, 1);
    assert_eq!(scheduler.snapshot().await.counters.violations, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_times_out_on_stuck_cycle() {
    let host = create_host();
    let mut config = GuardConfig::default();
    config.shutdown_timeout_secs = 2;
    let engine = AuditEngine::start(slow_handles(&host, Duration::from_secs(600)), config).unwrap();
    let scheduler = engine.scheduler().clone();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.shutdown().await, ShutdownOutcome::TimedOut);
    assert_eq!(scheduler.stats().cycles_run, 0);
}
