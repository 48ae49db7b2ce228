//! In-Memory Host
//!
//! Keeps users and dashboards in process memory and records every
//! notification, sensor update and ACL write. Failure switches let callers
//! simulate an unavailable host.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{
    DashboardRecord, DashboardSource, DashboardWriter, HostHandles, Notification, Notifier,
    SensorSink, User, UserDirectory,
};
use crate::error::GuardError;

/// Last published state of one sensor
#[derive(Debug, Clone, PartialEq)]
pub struct SensorState {
    pub value: u64,
    pub attributes: serde_json::Value,
}

/// One recorded ACL write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclUpdate {
    pub dashboard_id: String,
    pub visible_to_all: bool,
    pub explicit_access: BTreeSet<String>,
}

/// Host that lives entirely in memory
#[derive(Default)]
pub struct InMemoryHost {
    users: RwLock<Vec<User>>,
    dashboards: RwLock<Vec<DashboardRecord>>,
    notifications: RwLock<Vec<Notification>>,
    sensors: RwLock<HashMap<String, SensorState>>,
    acl_updates: RwLock<Vec<AclUpdate>>,
    fail_listing: AtomicBool,
    fail_writes: AtomicBool,
    fail_notifications: AtomicBool,
}

impl InMemoryHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Capability bundle with this host as the only retrieval strategy
    pub fn handles(self: &Arc<Self>) -> HostHandles {
        HostHandles {
            users: self.clone(),
            sources: vec![self.clone() as Arc<dyn DashboardSource>],
            writer: Some(self.clone() as Arc<dyn DashboardWriter>),
            notifier: self.clone(),
            sensors: self.clone(),
        }
    }

    /// Same as `handles` but without ACL write support
    pub fn read_only_handles(self: &Arc<Self>) -> HostHandles {
        HostHandles {
            writer: None,
            ..self.handles()
        }
    }

    pub fn set_users(&self, users: Vec<User>) {
        *self.users.write() = users;
    }

    pub fn set_dashboards(&self, dashboards: Vec<DashboardRecord>) {
        *self.dashboards.write() = dashboards;
    }

    /// Insert or replace a dashboard by normalized id
    pub fn upsert_dashboard(&self, record: DashboardRecord) {
        let id = record.dashboard_id();
        let mut dashboards = self.dashboards.write();
        match dashboards.iter_mut().find(|d| d.dashboard_id() == id) {
            Some(existing) => *existing = record,
            None => dashboards.push(record),
        }
    }

    pub fn remove_dashboard(&self, dashboard_id: &str) {
        self.dashboards.write().retain(|d| d.dashboard_id() != dashboard_id);
    }

    pub fn dashboard(&self, dashboard_id: &str) -> Option<DashboardRecord> {
        self.dashboards
            .read()
            .iter()
            .find(|d| d.dashboard_id() == dashboard_id)
            .cloned()
    }

    pub fn set_fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_notifications(&self, fail: bool) {
        self.fail_notifications.store(fail, Ordering::SeqCst);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.read().clone()
    }

    pub fn clear_notifications(&self) {
        self.notifications.write().clear();
    }

    pub fn sensor(&self, name: &str) -> Option<SensorState> {
        self.sensors.read().get(name).cloned()
    }

    pub fn acl_updates(&self) -> Vec<AclUpdate> {
        self.acl_updates.read().clone()
    }
}

#[async_trait]
impl UserDirectory for InMemoryHost {
    async fn list_users(&self) -> Result<Vec<User>, GuardError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(GuardError::host("user directory unavailable"));
        }
        Ok(self.users.read().clone())
    }
}

#[async_trait]
impl DashboardSource for InMemoryHost {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_dashboards(&self) -> Result<Vec<DashboardRecord>, GuardError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(GuardError::host("dashboard registry unavailable"));
        }
        Ok(self.dashboards.read().clone())
    }
}

#[async_trait]
impl DashboardWriter for InMemoryHost {
    async fn update_dashboard_acl(
        &self,
        dashboard_id: &str,
        visible_to_all: bool,
        explicit_access: &BTreeSet<String>,
    ) -> Result<(), GuardError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(GuardError::host("dashboard store is read-only"));
        }

        let mut dashboards = self.dashboards.write();
        let record = dashboards
            .iter_mut()
            .find(|d| d.dashboard_id() == dashboard_id)
            .ok_or_else(|| GuardError::host(format!("unknown dashboard: {}", dashboard_id)))?;

        record.visible_to_all = Some(visible_to_all);
        record.visible_users = explicit_access.iter().cloned().collect();

        self.acl_updates.write().push(AclUpdate {
            dashboard_id: dashboard_id.to_string(),
            visible_to_all,
            explicit_access: explicit_access.clone(),
        });
        Ok(())
    }
}

#[async_trait]
impl Notifier for InMemoryHost {
    async fn emit_notification(&self, notification: &Notification) -> Result<(), GuardError> {
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(GuardError::notifier("notification service unavailable"));
        }
        self.notifications.write().push(notification.clone());
        Ok(())
    }
}

#[async_trait]
impl SensorSink for InMemoryHost {
    async fn publish_sensor_state(
        &self,
        name: &str,
        value: u64,
        attributes: serde_json::Value,
    ) -> Result<(), GuardError> {
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(GuardError::notifier("sensor registry unavailable"));
        }
        self.sensors
            .write()
            .insert(name.to_string(), SensorState { value, attributes });
        Ok(())
    }
}
