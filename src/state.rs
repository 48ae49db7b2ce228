//! Audit State
//!
//! Owned by the scheduler. Rebuilt from scratch on restart: every violation
//! still present after a restart is reported as newly detected.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::detector::Violation;
use crate::host::Dashboard;

/// Exported counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditCounters {
    pub monitored: usize,
    pub guests: usize,
    pub violations: usize,
}

/// Result of diffing two successive violation sets
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViolationDiff {
    /// Violating now, not violating last cycle
    pub newly_detected: Vec<String>,
    /// Violating last cycle, not now; carries the last known record
    pub resolved: Vec<Violation>,
    /// Violating in both cycles
    pub carried: Vec<String>,
}

impl ViolationDiff {
    pub fn is_empty(&self) -> bool {
        self.newly_detected.is_empty() && self.resolved.is_empty()
    }
}

/// Diff the previous cycle's violations against the new set
pub fn diff(previous: &BTreeMap<String, Violation>, next: &[Violation]) -> ViolationDiff {
    let mut result = ViolationDiff::default();
    let next_ids: BTreeSet<&str> = next.iter().map(|v| v.dashboard_id.as_str()).collect();

    for violation in next {
        if previous.contains_key(&violation.dashboard_id) {
            result.carried.push(violation.dashboard_id.clone());
        } else {
            result.newly_detected.push(violation.dashboard_id.clone());
        }
    }

    result.resolved = previous
        .values()
        .filter(|v| !next_ids.contains(v.dashboard_id.as_str()))
        .cloned()
        .collect();

    result
}

/// Engine-owned audit state
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditState {
    /// Every dashboard id seen since start
    pub known_dashboard_ids: BTreeSet<String>,
    /// Dashboard ids audited in the last completed cycle
    pub monitored_dashboard_ids: BTreeSet<String>,
    pub current_violations: BTreeMap<String, Violation>,
    pub counters: AuditCounters,
    pub last_check: Option<DateTime<Utc>>,
}

impl AuditState {
    /// Replace state with the outcome of a completed cycle
    ///
    /// Returns the dashboard ids never seen before. Known ids only grow, so a
    /// dashboard that disappears and comes back is not new again.
    pub fn apply(
        &mut self,
        dashboards: &[Dashboard],
        guest_count: usize,
        violations: Vec<Violation>,
        checked_at: DateTime<Utc>,
    ) -> Vec<String> {
        let seen: BTreeSet<String> = dashboards.iter().map(|d| d.id.clone()).collect();
        let new_dashboards = seen
            .difference(&self.known_dashboard_ids)
            .cloned()
            .collect();

        self.known_dashboard_ids.extend(seen.iter().cloned());
        self.monitored_dashboard_ids = seen;
        self.current_violations = violations
            .into_iter()
            .map(|v| (v.dashboard_id.clone(), v))
            .collect();
        self.counters = AuditCounters {
            monitored: dashboards.len(),
            guests: guest_count,
            violations: self.current_violations.len(),
        };
        self.last_check = Some(checked_at);

        new_dashboards
    }

    /// Current violations in dashboard id order
    pub fn violations(&self) -> Vec<Violation> {
        self.current_violations.values().cloned().collect()
    }

    pub fn is_violating(&self, dashboard_id: &str) -> bool {
        self.current_violations.contains_key(dashboard_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::detect;

    fn guests() -> crate::classifier::GuestSet {
        ["g".to_string()].into_iter().collect()
    }

    #[test]
    fn test_diff_new_carried_resolved() {
        let now = Utc::now();
        let before = vec![Dashboard::new("a", true), Dashboard::new("b", true)];
        let after = vec![Dashboard::new("b", true), Dashboard::new("c", true)];

        let mut state = AuditState::default();
        state.apply(&before, 1, detect(&before, &guests(), now), now);

        let next = detect(&after, &guests(), now);
        let d = diff(&state.current_violations, &next);
        assert_eq!(d.newly_detected, vec!["c".to_string()]);
        assert_eq!(d.carried, vec!["b".to_string()]);
        assert_eq!(d.resolved.len(), 1);
        assert_eq!(d.resolved[0].dashboard_id, "a");
    }

    #[test]
    fn test_diff_unchanged_is_empty() {
        let now = Utc::now();
        let dashboards = vec![Dashboard::new("a", true)];
        let mut state = AuditState::default();
        state.apply(&dashboards, 1, detect(&dashboards, &guests(), now), now);

        let d = diff(&state.current_violations, &detect(&dashboards, &guests(), now));
        assert!(d.is_empty());
        assert_eq!(d.carried.len(), 1);
    }

    #[test]
    fn test_apply_replaces_violations_and_tracks_new_dashboards() {
        let now = Utc::now();
        let mut state = AuditState::default();

        let first = vec![Dashboard::new("a", true), Dashboard::new("b", false)];
        let new = state.apply(&first, 1, detect(&first, &guests(), now), now);
        assert_eq!(new, vec!["a".to_string(), "b".to_string()]);
        assert!(state.is_violating("a"));

        let second = vec![Dashboard::new("a", false), Dashboard::new("c", false)];
        let new = state.apply(&second, 1, detect(&second, &guests(), now), now);
        assert_eq!(new, vec!["c".to_string()]);
        assert!(state.current_violations.is_empty());
        assert_eq!(
            state.counters,
            AuditCounters {
                monitored: 2,
                guests: 1,
                violations: 0
            }
        );
        assert_eq!(state.last_check, Some(now));
        assert_eq!(state.known_dashboard_ids.len(), 3);
    }

    #[test]
    fn test_returning_dashboard_is_not_new() {
        let now = Utc::now();
        let mut state = AuditState::default();
        let both = vec![Dashboard::new("a", false), Dashboard::new("b", false)];
        let only_a = vec![Dashboard::new("a", false)];

        assert_eq!(state.apply(&both, 0, vec![], now).len(), 2);
        assert!(state.apply(&only_a, 0, vec![], now).is_empty());
        assert!(state.known_dashboard_ids.contains("b"));
        assert!(!state.monitored_dashboard_ids.contains("b"));
        assert!(state.apply(&both, 0, vec![], now).is_empty());
        assert_eq!(state.counters.monitored, 2);
    }
}
