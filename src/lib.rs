//! Guest Dashboard Guard
//!
//! Periodic dashboard-access audit engine for smart-home hosts.
//!
//! # Features
//!
//! - **Guest Classification**: non-admin users or an explicit id list
//! - **Snapshot Reader**: ordered retrieval strategies, first success wins
//! - **Violation Detection**: default visibility and explicit guest grants
//! - **Remediation**: notify-only or mode-gated auto-revoke
//! - **Dedup**: one alert per violation, one notice when it resolves
//! - **Sensors**: monitored / guests / violations counters
//!
//! # Architecture
//!
//! ```text
//! AuditEngine ──► AuditScheduler ──► SnapshotReader ──► Host strategies
//!  (interval)          │
//!                      ├── classify (GuestSet)
//!                      ├── detect (Violations)
//!                      ├── RemediationPolicy ──► DashboardWriter
//!                      ├── AuditState diff
//!                      └── Exporter ──► Notifier / SensorSink
//! ```

pub mod classifier;
pub mod config;
pub mod detector;
pub mod error;
pub mod exporter;
pub mod host;
pub mod lifecycle;
pub mod remediation;
pub mod scheduler;
pub mod snapshot;
pub mod state;

pub use classifier::{classify, GuestSet};
pub use config::{ActionMode, GuardConfig, GuestDetection};
pub use detector::{detect, Violation, ViolationReason};
pub use error::GuardError;
pub use exporter::Exporter;
pub use host::{
    Dashboard, DashboardMode, DashboardRecord, DashboardSource, DashboardWriter, FileHost,
    HostHandles, InMemoryHost, Notification, Notifier, SensorSink, Severity, User, UserDirectory,
};
pub use lifecycle::{AuditStatsSnapshot, CycleState};
pub use remediation::{RemediationPolicy, RemediationResult};
pub use scheduler::{AuditEngine, AuditScheduler, CycleOutcome, CycleReport, ShutdownOutcome};
pub use snapshot::{DashboardSnapshot, SnapshotReader};
pub use state::{AuditCounters, AuditState};
