//! Error taxonomy for the audit engine
//!
//! - `Config`: invalid or incomplete configuration, blocks activation
//! - `SnapshotUnavailable`: every dashboard retrieval strategy failed, cycle skipped
//! - `Host`: a remediation write failed for one dashboard
//! - `Notifier`: a notification or sensor sink rejected an update

/// Errors surfaced by the guard
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GuardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dashboard snapshot unavailable: {}", format_attempts(.attempts))]
    SnapshotUnavailable {
        /// (strategy name, failure) for every strategy that was tried
        attempts: Vec<(String, String)>,
    },

    #[error("Host error: {0}")]
    Host(String),

    #[error("Notifier error: {0}")]
    Notifier(String),
}

impl GuardError {
    pub fn config(msg: impl Into<String>) -> Self {
        GuardError::Config(msg.into())
    }

    pub fn host(msg: impl Into<String>) -> Self {
        GuardError::Host(msg.into())
    }

    pub fn notifier(msg: impl Into<String>) -> Self {
        GuardError::Notifier(msg.into())
    }

    /// Short machine-readable kind, used in skip logs and the config-error notice
    pub fn kind(&self) -> &'static str {
        match self {
            GuardError::Config(_) => "config_error",
            GuardError::SnapshotUnavailable { .. } => "snapshot_unavailable",
            GuardError::Host(_) => "host_error",
            GuardError::Notifier(_) => "notifier_error",
        }
    }
}

fn format_attempts(attempts: &[(String, String)]) -> String {
    if attempts.is_empty() {
        return "no retrieval strategies configured".to_string();
    }
    attempts
        .iter()
        .map(|(name, err)| format!("{}: {}", name, err))
        .collect::<Vec<_>>()
        .join("; ")
}
