//! Remediation Policy
//!
//! `notify_only` never touches the host. `auto_revoke` rewrites the ACL of
//! storage-mode dashboards only; yaml/unknown dashboards need a human.
//! Write failures are recorded on the result, never propagated.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classifier::GuestSet;
use crate::config::ActionMode;
use crate::detector::Violation;
use crate::host::{Dashboard, DashboardWriter};

pub const MANUAL_CONFIGURATION_REQUIRED: &str = "manual configuration required";
pub const WRITE_UNSUPPORTED: &str = "host does not support dashboard updates";

/// Outcome of one remediation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationResult {
    pub remediated: bool,
    pub remediation_error: Option<String>,
    /// Whether a host write was attempted
    pub attempted: bool,
}

impl RemediationResult {
    fn skipped() -> Self {
        Self {
            remediated: false,
            remediation_error: None,
            attempted: false,
        }
    }

    fn refused(reason: &str) -> Self {
        Self {
            remediated: false,
            remediation_error: Some(reason.to_string()),
            attempted: false,
        }
    }

    /// Copy the outcome onto a violation record
    pub fn apply_to(&self, violation: &mut Violation) {
        violation.remediated = self.remediated;
        violation.remediation_error = self.remediation_error.clone();
    }
}

/// Applies the configured action to violations
#[derive(Clone)]
pub struct RemediationPolicy {
    writer: Option<Arc<dyn DashboardWriter>>,
}

impl RemediationPolicy {
    pub fn new(writer: Option<Arc<dyn DashboardWriter>>) -> Self {
        Self { writer }
    }

    pub async fn remediate(
        &self,
        violation: &Violation,
        dashboard: &Dashboard,
        guest_ids: &GuestSet,
        mode: ActionMode,
    ) -> RemediationResult {
        if mode == ActionMode::NotifyOnly {
            return RemediationResult::skipped();
        }

        if !dashboard.mode.is_remediable() {
            debug!(
                "Dashboard {} is in {} mode, guest access must be removed manually",
                dashboard.id, dashboard.mode
            );
            return RemediationResult::refused(MANUAL_CONFIGURATION_REQUIRED);
        }

        let writer = match &self.writer {
            Some(writer) => writer,
            None => {
                info!(
                    "Would revoke guest access from dashboard {} but the host cannot write ACLs",
                    dashboard.id
                );
                return RemediationResult::refused(WRITE_UNSUPPORTED);
            }
        };

        let access = revoked_access(dashboard, guest_ids);
        match writer
            .update_dashboard_acl(&dashboard.id, false, &access)
            .await
        {
            Ok(()) => {
                info!(
                    "Revoked guest access from dashboard {} ({}, {} guest(s))",
                    dashboard.id, violation.reason, violation.affected_guest_count
                );
                RemediationResult {
                    remediated: true,
                    remediation_error: None,
                    attempted: true,
                }
            }
            Err(e) => {
                warn!("Failed to revoke guest access from {}: {}", dashboard.id, e);
                RemediationResult {
                    remediated: false,
                    remediation_error: Some(e.to_string()),
                    attempted: true,
                }
            }
        }
    }
}

/// Explicit access list with every guest removed
pub fn revoked_access(dashboard: &Dashboard, guest_ids: &GuestSet) -> BTreeSet<String> {
    dashboard
        .explicit_access
        .difference(guest_ids)
        .cloned()
        .collect()
}
