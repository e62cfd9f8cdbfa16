//! Identities produced by the directory and held in the HTTP session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::username::Username;

/// Identity returned by a successful directory authentication.
///
/// `display_name` is the directory's canonical human-readable name (the
/// common name by default) and usually differs from `username`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    /// Login handle the user authenticated with.
    pub username: Username,
    /// Human-readable name shown to other collaborators.
    pub display_name: String,
}

impl VerifiedIdentity {
    /// Create a new verified identity.
    #[must_use]
    pub fn new(username: Username, display_name: impl Into<String>) -> Self {
        Self {
            username,
            display_name: display_name.into(),
        }
    }
}

/// Session-stored identity.
///
/// Written once when a credential check succeeds; `is_admin` is filled in
/// lazily by the authorization gate on the first administrative request and
/// refreshed on every later one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Username verified by the directory.
    pub username: Username,
    /// Administrative privilege: `None` until the first administrative check.
    pub is_admin: Option<bool>,
    /// When the credential check succeeded.
    pub authenticated_at: DateTime<Utc>,
    /// When `is_admin` was last decided.
    pub admin_checked_at: Option<DateTime<Utc>>,
}

impl SessionIdentity {
    /// Create an identity for a freshly authenticated user.
    #[must_use]
    pub fn new(username: Username) -> Self {
        Self {
            username,
            is_admin: None,
            authenticated_at: Utc::now(),
            admin_checked_at: None,
        }
    }

    /// Record the outcome of an administrative group check.
    #[must_use]
    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = Some(is_admin);
        self.admin_checked_at = Some(Utc::now());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Username {
        Username::parse("alice").unwrap()
    }

    #[test]
    fn test_new_identity_has_unset_admin() {
        let identity = SessionIdentity::new(alice());
        assert_eq!(identity.is_admin, None);
        assert!(identity.admin_checked_at.is_none());
    }

    #[test]
    fn test_with_admin_records_decision() {
        let identity = SessionIdentity::new(alice()).with_admin(true);
        assert_eq!(identity.is_admin, Some(true));
        assert!(identity.admin_checked_at.is_some());

        let demoted = identity.with_admin(false);
        assert_eq!(demoted.is_admin, Some(false));
    }

    #[test]
    fn test_session_identity_serde_roundtrip() {
        let identity = SessionIdentity::new(alice()).with_admin(false);
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["username"], "alice");
        assert_eq!(json["is_admin"], false);

        let back: SessionIdentity = serde_json::from_value(json).unwrap();
        assert_eq!(back, identity);
    }
}
