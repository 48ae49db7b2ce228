//! Guest Classifier
//!
//! Resolves the guest set for one cycle. Pure; recomputed every cycle.

use std::collections::BTreeSet;
use tracing::debug;

use crate::config::{GuardConfig, GuestDetection};
use crate::error::GuardError;
use crate::host::User;

/// Ids of the users treated as guests this cycle
pub type GuestSet = BTreeSet<String>;

/// Resolve guest user ids from the current user list
///
/// - `non_admin`: every user that is neither admin nor host-generated
/// - `explicit`: configured ids that still exist; stale ids are dropped
pub fn classify(users: &[User], config: &GuardConfig) -> Result<GuestSet, GuardError> {
    match config.guest_detection {
        GuestDetection::NonAdmin => Ok(users
            .iter()
            .filter(|u| !u.is_admin && !u.system_generated)
            .map(|u| u.id.clone())
            .collect()),

        GuestDetection::Explicit => {
            if config.guest_user_ids.is_empty() {
                return Err(GuardError::config(
                    "explicit guest detection selected but no guest users configured",
                ));
            }

            let existing: BTreeSet<&str> = users.iter().map(|u| u.id.as_str()).collect();
            let guests: GuestSet = config
                .guest_user_ids
                .iter()
                .filter(|id| existing.contains(id.as_str()))
                .cloned()
                .collect();

            let stale = config.guest_user_ids.len() - guests.len();
            if stale > 0 {
                debug!("Dropped {} configured guest id(s) with no matching user", stale);
            }

            Ok(guests)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Vec<User> {
        vec![
            User::admin("owner"),
            User::regular("A"),
            User::regular("kid"),
            User::regular("supervisor").system(),
        ]
    }

    #[test]
    fn test_non_admin_mode() {
        let guests = classify(&users(), &GuardConfig::default()).unwrap();
        let expected: GuestSet = ["A", "kid"].iter().map(|s| s.to_string()).collect();
        assert_eq!(guests, expected);
    }

    #[test]
    fn test_explicit_drops_stale_ids() {
        let config = GuardConfig::default().with_explicit_guests(&["A", "B"]);
        let guests = classify(&users(), &config).unwrap();
        assert_eq!(guests.len(), 1);
        assert!(guests.contains("A"));
    }

    #[test]
    fn test_explicit_may_name_admins() {
        let config = GuardConfig::default().with_explicit_guests(&["owner"]);
        let guests = classify(&users(), &config).unwrap();
        assert!(guests.contains("owner"));
    }

    #[test]
    fn test_explicit_empty_is_config_error() {
        let mut config = GuardConfig::default();
        config.guest_detection = GuestDetection::Explicit;
        let err = classify(&users(), &config).unwrap_err();
        assert!(matches!(err, GuardError::Config(_)));
    }

    #[test]
    fn test_no_users() {
        let guests = classify(&[], &GuardConfig::default()).unwrap();
        assert!(guests.is_empty());
    }
}
