//! Directory service boundary.
//!
//! The gateway never speaks the directory protocol itself; it consumes a
//! [`DirectoryClient`] capability with two operations:
//!
//! - `authenticate(username, password)` - verify credentials, return the
//!   verified identity with its display name
//! - `group_search(username)` - return the administrative groups the user
//!   belongs to (empty when none)
//!
//! [`LdapDirectory`] implements it on top of `ldap3`.

mod error;
pub mod ldap;

pub use error::DirectoryError;
pub use ldap::LdapDirectory;

use async_trait::async_trait;

use padgate_core::{Username, VerifiedIdentity};

/// Credential verification and group lookup against a directory service.
///
/// Implementations may cache results and are responsible for their own
/// timeouts; every failure is reported as a [`DirectoryError`].
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Verify `password` for `username`.
    async fn authenticate(
        &self,
        username: &Username,
        password: &str,
    ) -> Result<VerifiedIdentity, DirectoryError>;

    /// Groups matching the configured administrative group search.
    async fn group_search(&self, username: &Username) -> Result<Vec<String>, DirectoryError>;
}
