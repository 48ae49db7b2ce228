//! Configuration management

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use crate::error::GuardError;

pub const MIN_INTERVAL_SECS: u64 = 10;
pub const MAX_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// What to do with a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActionMode {
    /// Report only, never touch the host
    #[default]
    #[serde(alias = "notify")]
    NotifyOnly,
    /// Report and try to strip guest visibility
    #[serde(alias = "revoke")]
    AutoRevoke,
}

impl ActionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotifyOnly => "notify_only",
            Self::AutoRevoke => "auto_revoke",
        }
    }

    /// Parse a mode name or its short alias
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "notify_only" | "notify" => Some(Self::NotifyOnly),
            "auto_revoke" | "revoke" => Some(Self::AutoRevoke),
            _ => None,
        }
    }
}

/// How guests are identified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GuestDetection {
    /// Every non-admin, non-system user is a guest
    #[default]
    NonAdmin,
    /// Only the configured user ids are guests
    #[serde(alias = "specific_users")]
    Explicit,
}

impl GuestDetection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonAdmin => "non_admin",
            Self::Explicit => "explicit",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "non_admin" => Some(Self::NonAdmin),
            "explicit" | "specific_users" => Some(Self::Explicit),
            _ => None,
        }
    }
}

/// Guard configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub action_mode: ActionMode,
    pub guest_detection: GuestDetection,
    /// Required (non-empty) iff `guest_detection` is `explicit`
    pub guest_user_ids: BTreeSet<String>,
    /// Seconds between audit cycles, 10..=3600
    pub interval_seconds: u64,
    /// Dashboard ids excluded from the audit
    pub ignored_dashboards: BTreeSet<String>,
    /// How long teardown waits for an in-flight cycle
    pub shutdown_timeout_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            action_mode: ActionMode::default(),
            guest_detection: GuestDetection::default(),
            guest_user_ids: BTreeSet::new(),
            interval_seconds: DEFAULT_INTERVAL_SECS,
            ignored_dashboards: BTreeSet::new(),
            shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
        }
    }
}

impl GuardConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, GuardError> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("GUARD_ACTION_MODE") {
            config.action_mode = ActionMode::parse(&value)
                .ok_or_else(|| GuardError::config(format!("unknown action mode: {}", value)))?;
        }

        if let Ok(value) = std::env::var("GUARD_GUEST_DETECTION") {
            config.guest_detection = GuestDetection::parse(&value).ok_or_else(|| {
                GuardError::config(format!("unknown guest detection mode: {}", value))
            })?;
        }

        if let Ok(value) = std::env::var("GUARD_GUEST_USERS") {
            config.guest_user_ids = split_list(&value);
        }

        if let Ok(value) = std::env::var("GUARD_INTERVAL_SECS") {
            config.interval_seconds = value
                .trim()
                .parse()
                .map_err(|_| GuardError::config(format!("invalid interval: {}", value)))?;
        }

        if let Ok(value) = std::env::var("GUARD_IGNORED_DASHBOARDS") {
            config.ignored_dashboards = split_list(&value);
        }

        if let Ok(value) = std::env::var("GUARD_SHUTDOWN_TIMEOUT_SECS") {
            config.shutdown_timeout_secs = value.trim().parse().map_err(|_| {
                GuardError::config(format!("invalid shutdown timeout: {}", value))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, GuardError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GuardError::config(format!("invalid config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self, GuardError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GuardError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), GuardError> {
        if !(MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(&self.interval_seconds) {
            return Err(GuardError::config(format!(
                "interval_seconds must be within {}..={}, got {}",
                MIN_INTERVAL_SECS, MAX_INTERVAL_SECS, self.interval_seconds
            )));
        }

        if self.guest_detection == GuestDetection::Explicit && self.guest_user_ids.is_empty() {
            return Err(GuardError::config(
                "guest_user_ids must not be empty when guest_detection is explicit",
            ));
        }

        Ok(())
    }

    /// Time between cycle starts
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Teardown wait for an in-flight cycle
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Set the action mode
    pub fn with_action_mode(mut self, mode: ActionMode) -> Self {
        self.action_mode = mode;
        self
    }

    /// Switch to explicit detection with these guest ids
    pub fn with_explicit_guests(mut self, ids: &[&str]) -> Self {
        self.guest_detection = GuestDetection::Explicit;
        self.guest_user_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    /// Set the audit interval in seconds
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_seconds = secs;
        self
    }

    /// Exclude these dashboard ids from the audit
    pub fn with_ignored(mut self, ids: &[&str]) -> Self {
        self.ignored_dashboards = ids.iter().map(|id| id.to_string()).collect();
        self
    }
}

fn split_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
