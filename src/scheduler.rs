//! Audit Scheduler
//!
//! `AuditScheduler` runs one audit cycle at a time and exclusively owns the
//! `AuditState`. `AuditEngine` drives it on a fixed-rate interval in a
//! background task and handles reconfiguration and teardown.
//!
//! ```text
//! tick ──► SnapshotReader ──► classify ──► detect ──► remediate ──► diff ──► Exporter
//!               │                 │
//!               └── failure ──────┴──► cycle skipped, state kept
//! ```

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::classifier::classify;
use crate::config::GuardConfig;
use crate::detector::detect;
use crate::error::GuardError;
use crate::exporter::Exporter;
use crate::host::{Dashboard, HostHandles};
use crate::lifecycle::{AuditStats, AuditStatsSnapshot, CycleGuard, CycleState, CycleTracker};
use crate::remediation::RemediationPolicy;
use crate::snapshot::SnapshotReader;
use crate::state::{self, AuditCounters, AuditState};

/// How a cycle ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed,
    /// Nothing was changed; state from the previous cycle is kept
    Skipped(GuardError),
}

/// Summary of one cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub outcome: CycleOutcome,
    pub newly_detected: Vec<String>,
    pub resolved: Vec<String>,
    pub carried: Vec<String>,
    pub new_dashboards: Vec<String>,
    /// Previously violating dashboards that are now ignored; not resolved
    pub unmonitored: Vec<String>,
    pub counters: AuditCounters,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            started_at,
            duration: Duration::ZERO,
            outcome: CycleOutcome::Completed,
            newly_detected: Vec::new(),
            resolved: Vec::new(),
            carried: Vec::new(),
            new_dashboards: Vec::new(),
            unmonitored: Vec::new(),
            counters: AuditCounters::default(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == CycleOutcome::Completed
    }
}

/// Runs audit cycles against one host
pub struct AuditScheduler {
    host: HostHandles,
    config: RwLock<GuardConfig>,
    /// Held for the whole cycle; serializes cycles
    state: Mutex<AuditState>,
    tracker: CycleTracker,
    stats: AuditStats,
    exporter: Exporter,
    remediation: RemediationPolicy,
    config_error_reported: AtomicBool,
}

impl AuditScheduler {
    pub fn new(host: HostHandles, config: GuardConfig) -> Self {
        let exporter = Exporter::new(host.notifier.clone(), host.sensors.clone());
        let remediation = RemediationPolicy::new(host.writer.clone());
        Self {
            host,
            config: RwLock::new(config),
            state: Mutex::new(AuditState::default()),
            tracker: CycleTracker::default(),
            stats: AuditStats::default(),
            exporter,
            remediation,
            config_error_reported: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> GuardConfig {
        self.config.read().clone()
    }

    /// Replace the configuration; a running cycle keeps the one it started with
    pub fn set_config(&self, config: GuardConfig) {
        *self.config.write() = config;
        self.config_error_reported.store(false, Ordering::SeqCst);
    }

    pub fn cycle_state(&self) -> CycleState {
        self.tracker.current()
    }

    pub fn stats(&self) -> AuditStatsSnapshot {
        self.stats.snapshot()
    }

    /// Copy of the state as of the last completed cycle
    ///
    /// Waits for an in-flight cycle to finish.
    pub async fn snapshot(&self) -> AuditState {
        self.state.lock().await.clone()
    }

    /// Run one full audit cycle
    pub async fn run_cycle(&self) -> CycleReport {
        let mut audit = self.state.lock().await;
        let config = self.config();
        let started = Instant::now();
        let mut report = CycleReport::new(Utc::now());
        let guard = CycleGuard::enter(&self.tracker);

        debug!("Audit cycle {} started", report.cycle_id);

        match self.audit(&config, &mut audit, &mut report).await {
            Ok(()) => {
                AuditStats::add(&self.stats.cycles_run, 1);
                guard.complete();
                info!(
                    "Audit cycle complete: {} dashboard(s), {} guest(s), {} violation(s) ({} new, {} resolved)",
                    report.counters.monitored,
                    report.counters.guests,
                    report.counters.violations,
                    report.newly_detected.len(),
                    report.resolved.len()
                );
            }
            Err(e) => {
                debug!("Audit cycle {} skipped: {}", report.cycle_id, e.kind());
                AuditStats::add(&self.stats.cycles_skipped, 1);
                report.counters = audit.counters;
                report.outcome = CycleOutcome::Skipped(e);
                drop(guard);
            }
        }

        report.duration = started.elapsed();
        report
    }

    async fn audit(
        &self,
        config: &GuardConfig,
        audit: &mut AuditState,
        report: &mut CycleReport,
    ) -> Result<(), GuardError> {
        let reader = SnapshotReader::new(self.host.sources.clone())
            .with_ignored(config.ignored_dashboards.clone());

        let snapshot = reader.fetch_snapshot().await.map_err(|e| {
            warn!("Skipping audit cycle ({}), keeping previous results: {}", e.kind(), e);
            e
        })?;
        let dashboards = snapshot.dashboards;

        let users = self.host.users.list_users().await.map_err(|e| {
            warn!("Skipping audit cycle ({}), user list unavailable: {}", e.kind(), e);
            e
        })?;

        let guests = match classify(&users, config) {
            Ok(guests) => guests,
            Err(e) => {
                if !self.config_error_reported.swap(true, Ordering::SeqCst) {
                    error!("{}", e);
                    self.exporter.notify_config_error(&e, &self.stats).await;
                }
                return Err(e);
            }
        };

        let checked_at = report.started_at;
        let mut violations = detect(&dashboards, &guests, checked_at);

        let by_id: HashMap<&str, &Dashboard> =
            dashboards.iter().map(|d| (d.id.as_str(), d)).collect();
        for violation in violations.iter_mut() {
            let Some(dashboard) = by_id.get(violation.dashboard_id.as_str()) else {
                continue;
            };
            let result = self
                .remediation
                .remediate(violation, dashboard, &guests, config.action_mode)
                .await;
            if result.attempted {
                AuditStats::add(&self.stats.remediations_attempted, 1);
            }
            if result.remediated {
                AuditStats::add(&self.stats.remediations_succeeded, 1);
            }
            result.apply_to(violation);
        }

        let mut changes = state::diff(&audit.current_violations, &violations);
        let (unmonitored, resolved): (Vec<_>, Vec<_>) = changes
            .resolved
            .into_iter()
            .partition(|v| snapshot.ignored.contains(&v.dashboard_id));
        changes.resolved = resolved;

        for id in &changes.newly_detected {
            if let Some(violation) = violations.iter().find(|v| &v.dashboard_id == id) {
                warn!(
                    "Dashboard guest access violation detected: {} ({}, {} guest(s))",
                    violation.dashboard_id, violation.reason, violation.affected_guest_count
                );
                self.exporter
                    .notify_violation(violation, config.action_mode, &self.stats)
                    .await;
            }
        }
        for violation in &changes.resolved {
            info!("Dashboard guest access resolved: {}", violation.dashboard_id);
            self.exporter.notify_resolved(violation, &self.stats).await;
        }
        for violation in &unmonitored {
            warn!(
                "Dashboard {} is now ignored while still exposed to guests",
                violation.dashboard_id
            );
            self.exporter.notify_unmonitored(violation, &self.stats).await;
        }

        AuditStats::add(&self.stats.violations_detected, changes.newly_detected.len());
        AuditStats::add(&self.stats.violations_resolved, changes.resolved.len());

        let new_dashboards = audit.apply(&dashboards, guests.len(), violations, checked_at);
        if !new_dashboards.is_empty() {
            info!("New dashboard(s) detected: {:?}", new_dashboards);
        }

        self.exporter.publish(audit, &self.stats).await;

        report.counters = audit.counters;
        report.newly_detected = changes.newly_detected;
        report.resolved = changes
            .resolved
            .into_iter()
            .map(|v| v.dashboard_id)
            .collect();
        report.carried = changes.carried;
        report.new_dashboards = new_dashboards;
        report.unmonitored = unmonitored.into_iter().map(|v| v.dashboard_id).collect();
        Ok(())
    }
}

/// How teardown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Loop exited, any in-flight cycle finished
    Graceful,
    /// In-flight cycle exceeded the timeout and was aborted
    TimedOut,
}

/// Background audit loop
pub struct AuditEngine {
    scheduler: Arc<AuditScheduler>,
    config_tx: watch::Sender<GuardConfig>,
    shutdown_tx: watch::Sender<bool>,
    trigger: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl AuditEngine {
    /// Validate the configuration and start the loop; the first cycle runs immediately
    pub fn start(host: HostHandles, config: GuardConfig) -> Result<Self, GuardError> {
        config.validate().map_err(|e| {
            error!("Refusing to start: {}", e);
            e
        })?;

        info!(
            "Starting dashboard audit every {}s ({}, {}, strategies: {:?})",
            config.interval_seconds,
            config.action_mode.as_str(),
            config.guest_detection.as_str(),
            host.source_names()
        );

        let scheduler = Arc::new(AuditScheduler::new(host, config.clone()));
        let (config_tx, config_rx) = watch::channel(config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let trigger = Arc::new(Notify::new());

        let handle = tokio::spawn(run_loop(
            scheduler.clone(),
            config_rx,
            shutdown_rx,
            trigger.clone(),
        ));

        Ok(Self {
            scheduler,
            config_tx,
            shutdown_tx,
            trigger,
            handle,
        })
    }

    pub fn scheduler(&self) -> &Arc<AuditScheduler> {
        &self.scheduler
    }

    /// Apply a new configuration from the next cycle on
    ///
    /// Invalid configurations are rejected and the current one stays active.
    pub fn reconfigure(&self, config: GuardConfig) -> Result<(), GuardError> {
        config.validate()?;
        info!(
            "Reconfigured: interval {}s, {}, {}",
            config.interval_seconds,
            config.action_mode.as_str(),
            config.guest_detection.as_str()
        );
        self.scheduler.set_config(config.clone());
        self.config_tx.send_replace(config);
        Ok(())
    }

    /// Request a cycle now instead of waiting for the next tick
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stop the loop, letting an in-flight cycle finish within the configured timeout
    pub async fn shutdown(self) -> ShutdownOutcome {
        let timeout = self.scheduler.config().shutdown_timeout();
        if self.scheduler.tracker.is_running() {
            info!("Waiting up to {:?} for the running audit cycle", timeout);
        }
        self.shutdown_tx.send_replace(true);

        let mut handle = self.handle;
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(_) => {
                info!("Dashboard audit stopped");
                ShutdownOutcome::Graceful
            }
            Err(_) => {
                warn!(
                    "Audit cycle still running after {:?}, aborting",
                    timeout
                );
                handle.abort();
                ShutdownOutcome::TimedOut
            }
        }
    }
}

fn ticker(period: Duration, immediate: bool) -> tokio::time::Interval {
    let mut ticker = if immediate {
        interval(period)
    } else {
        interval_at(tokio::time::Instant::now() + period, period)
    };
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn run_loop(
    scheduler: Arc<AuditScheduler>,
    mut config_rx: watch::Receiver<GuardConfig>,
    mut shutdown_rx: watch::Receiver<bool>,
    trigger: Arc<Notify>,
) {
    let mut period = config_rx.borrow_and_update().interval();
    let mut ticks = ticker(period, true);

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Dashboard audit loop shutting down");
                    break;
                }
            }
            changed = config_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = config_rx.borrow_and_update().interval();
                if next != period {
                    debug!("Audit interval changed: {:?} -> {:?}", period, next);
                    period = next;
                    ticks = ticker(period, false);
                }
            }
            _ = trigger.notified() => {
                debug!("Audit cycle triggered manually");
                scheduler.run_cycle().await;
            }
            _ = ticks.tick() => {
                scheduler.run_cycle().await;
            }
        }
    }
}
