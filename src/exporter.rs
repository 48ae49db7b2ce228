//! Notification & Sensor Exporter
//!
//! Best-effort sink for cycle results. Every failure is logged and counted,
//! never returned to the cycle.

use futures_util::future::join_all;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ActionMode;
use crate::detector::Violation;
use crate::error::GuardError;
use crate::host::{Notification, Notifier, SensorSink, Severity};
use crate::lifecycle::AuditStats;
use crate::state::AuditState;

pub const NOTIFICATION_PREFIX: &str = "guest_dashboard_guard";
pub const ALERT_TITLE: &str = "Guest Dashboard Guard Alert";
pub const RESOLVED_TITLE: &str = "Guest Dashboard Guard: Resolved";
pub const UNMONITORED_TITLE: &str = "Guest Dashboard Guard: No Longer Monitored";
pub const CONFIG_ERROR_TITLE: &str = "Guest Dashboard Guard: Configuration Error";

pub const SENSOR_MONITORED: &str = "monitored";
pub const SENSOR_GUESTS: &str = "guests";
pub const SENSOR_VIOLATIONS: &str = "violations";

/// Notification id for a dashboard; resolution replaces the alert
pub fn notification_id(dashboard_id: &str) -> String {
    format!("{}_{}", NOTIFICATION_PREFIX, dashboard_id)
}

/// Build the alert for a newly detected violation
pub fn violation_notification(violation: &Violation, mode: ActionMode) -> Notification {
    let mut message = format!(
        "Dashboard '{}' ({}) has a guest access issue:\n\n{}\n\nGuest users affected: {}",
        violation.title,
        violation.dashboard_id,
        violation.issue(),
        violation.affected_guest_count
    );

    match mode {
        ActionMode::AutoRevoke if violation.remediated => {
            message.push_str("\n\nGuest access has been revoked successfully.");
        }
        ActionMode::AutoRevoke => {
            message.push_str("\n\nFailed to automatically revoke access");
            if let Some(err) = &violation.remediation_error {
                message.push_str(&format!(" ({})", err));
            }
            message.push_str(". Please review dashboard permissions manually.");
        }
        ActionMode::NotifyOnly => {
            message.push_str("\n\nPlease review the dashboard permissions in Settings > Dashboards.");
        }
    }

    let severity = if violation.remediated {
        Severity::Warning
    } else {
        Severity::Critical
    };

    Notification {
        id: notification_id(&violation.dashboard_id),
        title: ALERT_TITLE.to_string(),
        message,
        severity,
    }
}

/// Build the notice for a violation that disappeared
pub fn resolved_notification(violation: &Violation) -> Notification {
    Notification {
        id: notification_id(&violation.dashboard_id),
        title: RESOLVED_TITLE.to_string(),
        message: format!(
            "Dashboard '{}' ({}) is no longer visible to guest users.",
            violation.title, violation.dashboard_id
        ),
        severity: Severity::Info,
    }
}

/// Build the notice for a violating dashboard that was excluded from the audit
///
/// The exposure itself is unchanged, so this must not read as a resolution.
pub fn unmonitored_notification(violation: &Violation) -> Notification {
    Notification {
        id: notification_id(&violation.dashboard_id),
        title: UNMONITORED_TITLE.to_string(),
        message: format!(
            "Dashboard '{}' ({}) is now ignored and no longer audited. \
             It was still exposed to guests when last checked ({}); \
             its permissions were not changed.",
            violation.title,
            violation.dashboard_id,
            violation.issue()
        ),
        severity: Severity::Warning,
    }
}

/// Pushes notifications and sensor states to the host
#[derive(Clone)]
pub struct Exporter {
    notifier: Arc<dyn Notifier>,
    sensors: Arc<dyn SensorSink>,
}

impl Exporter {
    pub fn new(notifier: Arc<dyn Notifier>, sensors: Arc<dyn SensorSink>) -> Self {
        Self { notifier, sensors }
    }

    /// Fire-and-forget; returns whether the host accepted it
    pub async fn notify(&self, notification: &Notification, stats: &AuditStats) -> bool {
        match self.notifier.emit_notification(notification).await {
            Ok(()) => {
                debug!("Notification sent: {}", notification.id);
                AuditStats::add(&stats.notifications_sent, 1);
                true
            }
            Err(e) => {
                warn!("Dropping notification {}: {}", notification.id, e);
                AuditStats::add(&stats.notifications_failed, 1);
                false
            }
        }
    }

    pub async fn notify_violation(&self, violation: &Violation, mode: ActionMode, stats: &AuditStats) -> bool {
        self.notify(&violation_notification(violation, mode), stats).await
    }

    pub async fn notify_resolved(&self, violation: &Violation, stats: &AuditStats) -> bool {
        self.notify(&resolved_notification(violation), stats).await
    }

    pub async fn notify_unmonitored(&self, violation: &Violation, stats: &AuditStats) -> bool {
        self.notify(&unmonitored_notification(violation), stats).await
    }

    pub async fn notify_config_error(&self, error: &GuardError, stats: &AuditStats) -> bool {
        let notification = Notification {
            id: format!("{}_{}", NOTIFICATION_PREFIX, error.kind()),
            title: CONFIG_ERROR_TITLE.to_string(),
            message: format!("The audit is paused until the configuration is fixed: {}", error),
            severity: Severity::Critical,
        };
        self.notify(&notification, stats).await
    }

    /// Publish the three counters; returns how many were accepted
    pub async fn publish(&self, state: &AuditState, stats: &AuditStats) -> usize {
        let counters = state.counters;
        let violations = serde_json::to_value(state.violations()).unwrap_or_else(|e| {
            warn!("Cannot serialize violations: {}", e);
            json!([])
        });

        let updates = [
            (
                SENSOR_MONITORED,
                counters.monitored,
                json!({ "dashboards": state.monitored_dashboard_ids }),
            ),
            (SENSOR_GUESTS, counters.guests, json!({})),
            (
                SENSOR_VIOLATIONS,
                counters.violations,
                json!({ "violations": violations, "last_check": state.last_check }),
            ),
        ];

        let results = join_all(updates.into_iter().map(|(name, value, attributes)| async move {
            let result = self
                .sensors
                .publish_sensor_state(name, value as u64, attributes)
                .await;
            (name, result)
        }))
        .await;

        let mut accepted = 0;
        for (name, result) in results {
            match result {
                Ok(()) => accepted += 1,
                Err(e) => {
                    warn!("Failed to publish sensor {}: {}", name, e);
                    AuditStats::add(&stats.notifications_failed, 1);
                }
            }
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::ViolationReason;
    use crate::host::InMemoryHost;
    use chrono::Utc;

    fn violation(remediated: bool, error: Option<&str>) -> Violation {
        Violation {
            dashboard_id: "kitchen".to_string(),
            title: "Kitchen".to_string(),
            reason: ViolationReason::ExplicitGuestAccess,
            affected_guest_count: 2,
            affected_guests: vec!["a".to_string(), "b".to_string()],
            detected_at: Utc::now(),
            remediated,
            remediation_error: error.map(str::to_string),
        }
    }

    fn exporter(host: &Arc<InMemoryHost>) -> Exporter {
        Exporter::new(host.clone(), host.clone())
    }

    #[test]
    fn test_violation_message() {
        let note = violation_notification(&violation(false, None), ActionMode::NotifyOnly);
        assert_eq!(note.id, "guest_dashboard_guard_kitchen");
        assert!(note.message.contains("'Kitchen' (kitchen)"));
        assert!(note.message.contains("Guest users affected: 2"));
        assert!(note.message.contains("Settings > Dashboards"));
        assert_eq!(note.severity, Severity::Critical);
    }

    #[test]
    fn test_revoke_messages() {
        let ok = violation_notification(&violation(true, None), ActionMode::AutoRevoke);
        assert!(ok.message.contains("revoked successfully"));
        assert_eq!(ok.severity, Severity::Warning);

        let failed = violation_notification(
            &violation(false, Some("manual configuration required")),
            ActionMode::AutoRevoke,
        );
        assert!(failed.message.contains("manual configuration required"));
        assert!(failed.message.contains("review dashboard permissions manually"));
    }

    #[test]
    fn test_unmonitored_does_not_claim_resolution() {
        let v = violation(false, None);
        let note = unmonitored_notification(&v);
        assert_eq!(note.id, resolved_notification(&v).id);
        assert_eq!(note.severity, Severity::Warning);
        assert!(note.message.contains("no longer audited"));
        assert!(!note.message.contains("no longer visible"));
    }

    #[tokio::test]
    async fn test_config_error_notice_id() {
        let host = InMemoryHost::new();
        let stats = AuditStats::default();
        exporter(&host)
            .notify_config_error(&GuardError::config("empty guest list"), &stats)
            .await;
        assert_eq!(host.notifications()[0].id, "guest_dashboard_guard_config_error");
    }

    #[test]
    fn test_resolved_replaces_alert() {
        let v = violation(false, None);
        assert_eq!(resolved_notification(&v).id, violation_notification(&v, ActionMode::NotifyOnly).id);
    }

    #[tokio::test]
    async fn test_notifier_failure_is_swallowed() {
        let host = InMemoryHost::new();
        host.set_fail_notifications(true);
        let stats = AuditStats::default();

        let sent = exporter(&host)
            .notify_violation(&violation(false, None), ActionMode::NotifyOnly, &stats)
            .await;
        assert!(!sent);
        assert_eq!(stats.snapshot().notifications_failed, 1);
    }

    #[tokio::test]
    async fn test_publish_counters() {
        let host = InMemoryHost::new();
        let stats = AuditStats::default();
        let now = Utc::now();

        let mut state = AuditState::default();
        let dashboards = vec![crate::host::Dashboard::new("kitchen", false)];
        state.apply(&dashboards, 3, vec![violation(false, None)], now);

        assert_eq!(exporter(&host).publish(&state, &stats).await, 3);
        let monitored = host.sensor(SENSOR_MONITORED).unwrap();
        assert_eq!(monitored.value, 1);
        assert_eq!(monitored.attributes["dashboards"][0], "kitchen");
        assert_eq!(host.sensor(SENSOR_GUESTS).unwrap().value, 3);

        let violations = host.sensor(SENSOR_VIOLATIONS).unwrap();
        assert_eq!(violations.value, 1);
        assert_eq!(violations.attributes["violations"][0]["dashboard_id"], "kitchen");
        assert_eq!(
            violations.attributes["violations"][0]["reason"],
            "explicit_guest_access"
        );
        assert!(violations.attributes["last_check"].is_string());
    }
}
