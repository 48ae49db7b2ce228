//! Host Collaborator Interfaces
//!
//! The guard never owns users, dashboards or notification delivery. It reaches
//! the host through narrow capability traits:
//! - `UserDirectory`: read-only user listing
//! - `DashboardSource`: one dashboard retrieval strategy (hosts may expose several)
//! - `DashboardWriter`: ACL updates, only used by auto-revoke
//! - `Notifier`: fire-and-forget notifications
//! - `SensorSink`: counter/attribute publishing
//!
//! Two hosts ship with the crate: `memory::InMemoryHost` for embedding and
//! tests, and `file::FileHost` backed by a JSON state document.

pub mod file;
pub mod memory;

pub use file::FileHost;
pub use memory::InMemoryHost;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::GuardError;

/// Id given to the host's root dashboard
pub const DEFAULT_DASHBOARD_ID: &str = "default";

/// URL path some hosts report for the root dashboard
const ROOT_URL_PATH: &str = "lovelace";

/// Host user snapshot (read-only to the guard)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub is_admin: bool,
    /// Internal accounts created by the host itself
    #[serde(default)]
    pub system_generated: bool,
}

impl User {
    /// Regular host account
    pub fn new(id: &str, name: &str, is_admin: bool) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            is_admin,
            system_generated: false,
        }
    }

    /// Administrator named after its id
    pub fn admin(id: &str) -> Self {
        Self::new(id, id, true)
    }

    /// Non-admin user named after its id
    pub fn regular(id: &str) -> Self {
        Self::new(id, id, false)
    }

    /// Mark as created by the host itself
    pub fn system(mut self) -> Self {
        self.system_generated = true;
        self
    }
}

/// How a dashboard is stored by the host; gates whether it can be rewritten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DashboardMode {
    Storage,
    Yaml,
    #[default]
    Unknown,
}

impl DashboardMode {
    /// Label as the host writes it
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Yaml => "yaml",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the host's free-form mode label
    pub fn from_host_str(mode: &str) -> Self {
        match mode.trim().to_ascii_lowercase().as_str() {
            "storage" => Self::Storage,
            "yaml" => Self::Yaml,
            _ => Self::Unknown,
        }
    }

    /// Only storage-mode dashboards can have their ACL rewritten
    pub fn is_remediable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}

impl fmt::Display for DashboardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw dashboard entry as a retrieval strategy reports it
///
/// Strategies differ in fidelity: some know the visibility flags, some only
/// know that a dashboard exists. `SnapshotReader` normalizes these into
/// `Dashboard`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DashboardRecord {
    /// URL path; `None` is the host's root dashboard
    #[serde(default)]
    pub url_path: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub require_admin: bool,
    /// `None` when the strategy cannot read visibility
    #[serde(default)]
    pub visible_to_all: Option<bool>,
    #[serde(default)]
    pub visible_users: Vec<String>,
}

impl DashboardRecord {
    /// Record for the dashboard at `url_path`
    pub fn new(url_path: &str) -> Self {
        Self {
            url_path: Some(url_path.to_string()),
            ..Default::default()
        }
    }

    /// Record for the root dashboard
    pub fn root() -> Self {
        Self::default()
    }

    /// Normalized dashboard id; the root dashboard is always `default`
    pub fn dashboard_id(&self) -> String {
        match self.url_path.as_deref().map(str::trim) {
            None | Some("") | Some(ROOT_URL_PATH) => DEFAULT_DASHBOARD_ID.to_string(),
            Some(path) => path.to_string(),
        }
    }

    /// Set the display title
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Set the raw host mode label
    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = Some(mode.to_string());
        self
    }

    /// Set the default-visibility flag
    pub fn with_visibility(mut self, visible_to_all: bool) -> Self {
        self.visible_to_all = Some(visible_to_all);
        self
    }

    /// Grant explicit access to these user ids
    pub fn with_users(mut self, users: &[&str]) -> Self {
        self.visible_users = users.iter().map(|u| u.to_string()).collect();
        self
    }

    /// Restrict to administrators
    pub fn admin_only(mut self) -> Self {
        self.require_admin = true;
        self
    }
}

/// Normalized dashboard visibility state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: String,
    pub title: String,
    pub visible_to_all: bool,
    pub explicit_access: BTreeSet<String>,
    pub mode: DashboardMode,
    #[serde(default)]
    pub require_admin: bool,
}

impl Dashboard {
    /// Storage-mode dashboard titled after its id
    pub fn new(id: &str, visible_to_all: bool) -> Self {
        Self {
            id: id.to_string(),
            title: id.to_string(),
            visible_to_all,
            explicit_access: BTreeSet::new(),
            mode: DashboardMode::Storage,
            require_admin: false,
        }
    }

    /// Replace the explicit access list
    pub fn with_access(mut self, users: &[&str]) -> Self {
        self.explicit_access = users.iter().map(|u| u.to_string()).collect();
        self
    }

    /// Set the storage mode
    pub fn with_mode(mut self, mode: DashboardMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// A notification handed to the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Stable id; a later notification with the same id replaces the earlier one
    pub id: String,
    pub title: String,
    pub message: String,
    pub severity: Severity,
}

/// Read-only access to host users
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>, GuardError>;
}

/// One dashboard retrieval strategy
#[async_trait]
pub trait DashboardSource: Send + Sync {
    /// Strategy name, used in logs and `SnapshotUnavailable`
    fn name(&self) -> &str;

    async fn list_dashboards(&self) -> Result<Vec<DashboardRecord>, GuardError>;
}

/// Dashboard ACL mutation
#[async_trait]
pub trait DashboardWriter: Send + Sync {
    async fn update_dashboard_acl(
        &self,
        dashboard_id: &str,
        visible_to_all: bool,
        explicit_access: &BTreeSet<String>,
    ) -> Result<(), GuardError>;
}

/// Notification delivery
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn emit_notification(&self, notification: &Notification) -> Result<(), GuardError>;
}

/// Sensor state publishing
#[async_trait]
pub trait SensorSink: Send + Sync {
    async fn publish_sensor_state(
        &self,
        name: &str,
        value: u64,
        attributes: serde_json::Value,
    ) -> Result<(), GuardError>;
}

/// The set of capabilities a host exposes to the guard
#[derive(Clone)]
pub struct HostHandles {
    pub users: Arc<dyn UserDirectory>,
    /// Retrieval strategies in preference order
    pub sources: Vec<Arc<dyn DashboardSource>>,
    /// `None` when the host cannot write dashboard ACLs
    pub writer: Option<Arc<dyn DashboardWriter>>,
    pub notifier: Arc<dyn Notifier>,
    pub sensors: Arc<dyn SensorSink>,
}

impl HostHandles {
    /// Strategy names in preference order
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }
}

impl fmt::Debug for HostHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostHandles")
            .field("sources", &self.source_names())
            .field("writer", &self.writer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!(DashboardMode::from_host_str("storage"), DashboardMode::Storage);
        assert_eq!(DashboardMode::from_host_str(" YAML "), DashboardMode::Yaml);
        assert_eq!(DashboardMode::from_host_str("panel"), DashboardMode::Unknown);
        assert!(DashboardMode::Storage.is_remediable());
        assert!(!DashboardMode::Yaml.is_remediable());
        assert!(!DashboardMode::Unknown.is_remediable());
    }

    #[test]
    fn test_user_deserialize_defaults() {
        let user: User =
            serde_json::from_str(r#"{"id":"u1","name":"Max","is_admin":false}"#).unwrap();
        assert!(!user.system_generated);
    }

    #[test]
    fn test_record_builder() {
        let record = DashboardRecord::new("kitchen")
            .with_title("Kitchen")
            .with_visibility(false)
            .with_users(&["a", "b"]);
        assert_eq!(record.url_path.as_deref(), Some("kitchen"));
        assert_eq!(record.visible_to_all, Some(false));
        assert_eq!(record.visible_users.len(), 2);
    }

    #[test]
    fn test_root_dashboard_id() {
        assert_eq!(DashboardRecord::root().dashboard_id(), DEFAULT_DASHBOARD_ID);
        assert_eq!(DashboardRecord::new("lovelace").dashboard_id(), DEFAULT_DASHBOARD_ID);
        assert_eq!(DashboardRecord::new("").dashboard_id(), DEFAULT_DASHBOARD_ID);
        assert_eq!(DashboardRecord::new("energy").dashboard_id(), "energy");
    }
}
