//! Dashboard Snapshot Reader
//!
//! Tries each retrieval strategy in preference order and takes the first
//! one that answers. Results from different strategies are never merged.
//! Records are normalized into `Dashboard`:
//! - root dashboard gets the id `default`
//! - duplicate ids keep their first occurrence
//! - unreadable visibility means visible to all (host default)
//! - admin-only dashboards are not visible to all
//! - ignored dashboard ids are dropped

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::GuardError;
use crate::host::{Dashboard, DashboardMode, DashboardRecord, DashboardSource};

/// One successful read
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardSnapshot {
    pub dashboards: Vec<Dashboard>,
    /// Ids the host reported but the configuration excludes
    pub ignored: BTreeSet<String>,
}

/// Ordered set of retrieval strategies
#[derive(Clone)]
pub struct SnapshotReader {
    sources: Vec<Arc<dyn DashboardSource>>,
    ignored: BTreeSet<String>,
}

impl SnapshotReader {
    pub fn new(sources: Vec<Arc<dyn DashboardSource>>) -> Self {
        Self {
            sources,
            ignored: BTreeSet::new(),
        }
    }

    /// Exclude these dashboard ids from every snapshot
    pub fn with_ignored(mut self, ignored: BTreeSet<String>) -> Self {
        self.ignored = ignored;
        self
    }

    /// Fetch the current dashboard set from the first working strategy
    pub async fn fetch_dashboards(&self) -> Result<Vec<Dashboard>, GuardError> {
        Ok(self.fetch_snapshot().await?.dashboards)
    }

    /// Like `fetch_dashboards`, also naming the ignored ids that were dropped
    pub async fn fetch_snapshot(&self) -> Result<DashboardSnapshot, GuardError> {
        let mut attempts = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            match source.list_dashboards().await {
                Ok(records) => {
                    debug!(
                        "Strategy '{}' returned {} dashboard record(s)",
                        source.name(),
                        records.len()
                    );
                    return Ok(self.normalize_all(&records));
                }
                Err(e) => {
                    debug!("Strategy '{}' failed: {}", source.name(), e);
                    attempts.push((source.name().to_string(), e.to_string()));
                }
            }
        }

        let err = GuardError::SnapshotUnavailable { attempts };
        warn!("{}", err);
        Err(err)
    }

    fn normalize_all(&self, records: &[DashboardRecord]) -> DashboardSnapshot {
        let mut seen = HashSet::new();
        let mut snapshot = DashboardSnapshot::default();

        for record in records {
            let dashboard = normalize(record);

            if !seen.insert(dashboard.id.clone()) {
                debug!("Skipping duplicate dashboard: {} ({})", dashboard.id, dashboard.title);
                continue;
            }
            if self.ignored.contains(&dashboard.id) {
                debug!("Ignoring dashboard: {} ({})", dashboard.id, dashboard.title);
                snapshot.ignored.insert(dashboard.id);
                continue;
            }

            snapshot.dashboards.push(dashboard);
        }

        snapshot
    }
}

/// Normalize one strategy record
pub fn normalize(record: &DashboardRecord) -> Dashboard {
    let id = record.dashboard_id();

    let title = record
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| id.clone());

    let mode = record
        .mode
        .as_deref()
        .map(DashboardMode::from_host_str)
        .unwrap_or_default();

    let visible_to_all = !record.require_admin && record.visible_to_all.unwrap_or(true);

    let explicit_access = record
        .visible_users
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect();

    Dashboard {
        id,
        title,
        visible_to_all,
        explicit_access,
        mode,
        require_admin: record.require_admin,
    }
}
