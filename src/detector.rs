//! Violation Detector
//!
//! Pure comparison of dashboard visibility against the guest set. Each
//! dashboard is evaluated on its own; default visibility takes precedence
//! over explicit grants so a dashboard is reported at most once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::classifier::GuestSet;
use crate::host::Dashboard;

/// Why a dashboard is exposed to guests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationReason {
    DefaultVisibleToAll,
    ExplicitGuestAccess,
}

impl ViolationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DefaultVisibleToAll => "default_visible_to_all",
            Self::ExplicitGuestAccess => "explicit_guest_access",
        }
    }
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dashboard currently visible to at least one guest
///
/// Records are immutable per cycle: a violation still present next cycle is
/// superseded by a fresh record, not updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub dashboard_id: String,
    pub title: String,
    pub reason: ViolationReason,
    pub affected_guest_count: usize,
    /// Sorted ids of the implicated guests
    pub affected_guests: Vec<String>,
    pub detected_at: DateTime<Utc>,
    pub remediated: bool,
    pub remediation_error: Option<String>,
}

impl Violation {
    /// Human-readable description of the exposure
    pub fn issue(&self) -> String {
        match self.reason {
            ViolationReason::DefaultVisibleToAll => {
                "Dashboard is visible to all users by default".to_string()
            }
            ViolationReason::ExplicitGuestAccess => format!(
                "Guest users have explicit access: {} user(s)",
                self.affected_guest_count
            ),
        }
    }
}

/// Evaluate one dashboard
pub fn check_dashboard(
    dashboard: &Dashboard,
    guest_ids: &GuestSet,
    detected_at: DateTime<Utc>,
) -> Option<Violation> {
    let (reason, affected_guests): (ViolationReason, Vec<String>) = if dashboard.visible_to_all {
        (
            ViolationReason::DefaultVisibleToAll,
            guest_ids.iter().cloned().collect(),
        )
    } else {
        let exposed: Vec<String> = dashboard
            .explicit_access
            .intersection(guest_ids)
            .cloned()
            .collect();
        if exposed.is_empty() {
            return None;
        }
        (ViolationReason::ExplicitGuestAccess, exposed)
    };

    Some(Violation {
        dashboard_id: dashboard.id.clone(),
        title: dashboard.title.clone(),
        reason,
        affected_guest_count: affected_guests.len(),
        affected_guests,
        detected_at,
        remediated: false,
        remediation_error: None,
    })
}

/// Evaluate every dashboard; output keeps dashboard order
pub fn detect(
    dashboards: &[Dashboard],
    guest_ids: &GuestSet,
    detected_at: DateTime<Utc>,
) -> Vec<Violation> {
    dashboards
        .iter()
        .filter_map(|d| check_dashboard(d, guest_ids, detected_at))
        .collect()
}
