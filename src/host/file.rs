//! JSON State-File Host
//!
//! Reads users and dashboards from one JSON document:
//!
//! ```json
//! {
//!   "users": [{ "id": "u1", "name": "Max", "is_admin": false }],
//!   "dashboards": [{ "url_path": "kitchen", "mode": "storage", "visible_to_all": true }],
//!   "panels": { "energy": { "title": "Energy", "require_admin": false } }
//! }
//! ```
//!
//! Two retrieval strategies, tried in order:
//! - `registry`: the `dashboards` array, with full visibility information
//! - `panels`: the `panels` map, existence and admin flag only
//!
//! ACL writes rewrite the `dashboards` entry in place. Notifications go to
//! the log and, optionally, to a JSON-lines file; sensor states can be
//! mirrored to a JSON file.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use super::{
    DashboardRecord, DashboardSource, DashboardWriter, HostHandles, Notification, Notifier,
    SensorSink, Severity, User, UserDirectory,
};
use crate::error::GuardError;

/// Frontend panel entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelEntry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub require_admin: bool,
}

/// On-disk host document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostDocument {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboards: Option<Vec<DashboardRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panels: Option<BTreeMap<String, PanelEntry>>,
    /// Anything else in the file is preserved on write
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Host backed by a JSON state file
pub struct FileHost {
    path: PathBuf,
    notification_log: Option<PathBuf>,
    sensor_output: Option<PathBuf>,
    sensors: Mutex<BTreeMap<String, serde_json::Value>>,
    /// Serializes file replacement
    write_lock: tokio::sync::Mutex<()>,
}

impl FileHost {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            notification_log: None,
            sensor_output: None,
            sensors: Mutex::new(BTreeMap::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Append every notification as one JSON line
    pub fn with_notification_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.notification_log = Some(path.into());
        self
    }

    /// Mirror sensor states into a JSON file
    pub fn with_sensor_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.sensor_output = Some(path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn handles(self: &Arc<Self>) -> HostHandles {
        HostHandles {
            users: self.clone(),
            sources: vec![
                Arc::new(RegistrySource(self.clone())) as Arc<dyn DashboardSource>,
                Arc::new(PanelSource(self.clone())) as Arc<dyn DashboardSource>,
            ],
            writer: Some(self.clone() as Arc<dyn DashboardWriter>),
            notifier: self.clone(),
            sensors: self.clone(),
        }
    }

    pub async fn read_document(&self) -> Result<HostDocument, GuardError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| GuardError::host(format!("cannot read {}: {}", self.path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| GuardError::host(format!("invalid state file {}: {}", self.path.display(), e)))
    }

    async fn write_document(&self, document: &HostDocument) -> Result<(), GuardError> {
        let content = serde_json::to_string_pretty(document)
            .map_err(|e| GuardError::host(format!("cannot serialize state: {}", e)))?;
        let _lock = self.write_lock.lock().await;
        write_atomic(&self.path, content.as_bytes()).await
    }

    async fn write_sensors(&self, path: &Path) -> Result<(), GuardError> {
        let _lock = self.write_lock.lock().await;
        let snapshot = self.sensors.lock().clone();
        let content = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| GuardError::notifier(format!("cannot serialize sensors: {}", e)))?;
        write_atomic(path, content.as_bytes())
            .await
            .map_err(|e| GuardError::notifier(e.to_string()))
    }
}

async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), GuardError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, content)
        .await
        .map_err(|e| GuardError::host(format!("cannot write {}: {}", tmp.display(), e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| GuardError::host(format!("cannot replace {}: {}", path.display(), e)))
}

/// `dashboards` array strategy
pub struct RegistrySource(Arc<FileHost>);

#[async_trait]
impl DashboardSource for RegistrySource {
    fn name(&self) -> &str {
        "registry"
    }

    async fn list_dashboards(&self) -> Result<Vec<DashboardRecord>, GuardError> {
        self.0
            .read_document()
            .await?
            .dashboards
            .ok_or_else(|| GuardError::host("state file has no dashboard registry"))
    }
}

/// `panels` map strategy
pub struct PanelSource(Arc<FileHost>);

#[async_trait]
impl DashboardSource for PanelSource {
    fn name(&self) -> &str {
        "panels"
    }

    async fn list_dashboards(&self) -> Result<Vec<DashboardRecord>, GuardError> {
        let panels = self
            .0
            .read_document()
            .await?
            .panels
            .ok_or_else(|| GuardError::host("state file has no frontend panels"))?;

        Ok(panels
            .into_iter()
            .map(|(key, panel)| DashboardRecord {
                url_path: Some(key),
                title: panel.title,
                mode: Some("panel".to_string()),
                require_admin: panel.require_admin,
                visible_to_all: None,
                visible_users: Vec::new(),
            })
            .collect())
    }
}

#[async_trait]
impl UserDirectory for FileHost {
    async fn list_users(&self) -> Result<Vec<User>, GuardError> {
        Ok(self.read_document().await?.users)
    }
}

#[async_trait]
impl DashboardWriter for FileHost {
    async fn update_dashboard_acl(
        &self,
        dashboard_id: &str,
        visible_to_all: bool,
        explicit_access: &BTreeSet<String>,
    ) -> Result<(), GuardError> {
        let mut document = self.read_document().await?;
        let record = document
            .dashboards
            .as_mut()
            .and_then(|dashboards| dashboards.iter_mut().find(|d| d.dashboard_id() == dashboard_id))
            .ok_or_else(|| {
                GuardError::host(format!("dashboard {} is not in the registry", dashboard_id))
            })?;

        record.visible_to_all = Some(visible_to_all);
        record.visible_users = explicit_access.iter().cloned().collect();

        self.write_document(&document).await?;
        debug!("Updated ACL of {} in {}", dashboard_id, self.path.display());
        Ok(())
    }
}

#[async_trait]
impl Notifier for FileHost {
    async fn emit_notification(&self, notification: &Notification) -> Result<(), GuardError> {
        match notification.severity {
            Severity::Info => info!("[{}] {}: {}", notification.id, notification.title, notification.message),
            Severity::Warning => warn!("[{}] {}: {}", notification.id, notification.title, notification.message),
            Severity::Critical => error!("[{}] {}: {}", notification.id, notification.title, notification.message),
        }

        let Some(log_path) = &self.notification_log else {
            return Ok(());
        };

        let mut line = serde_json::to_string(&serde_json::json!({
            "timestamp": chrono::Utc::now(),
            "notification": notification,
        }))
        .map_err(|e| GuardError::notifier(e.to_string()))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .await
            .map_err(|e| GuardError::notifier(format!("cannot open {}: {}", log_path.display(), e)))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| GuardError::notifier(format!("cannot append {}: {}", log_path.display(), e)))
    }
}

#[async_trait]
impl SensorSink for FileHost {
    async fn publish_sensor_state(
        &self,
        name: &str,
        value: u64,
        attributes: serde_json::Value,
    ) -> Result<(), GuardError> {
        debug!("Sensor {} = {}", name, value);
        self.sensors.lock().insert(
            name.to_string(),
            serde_json::json!({ "state": value, "attributes": attributes }),
        );

        match &self.sensor_output {
            Some(path) => self.write_sensors(path).await,
            None => Ok(()),
        }
    }
}
