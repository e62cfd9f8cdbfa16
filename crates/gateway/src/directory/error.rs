//! Directory error types.

use thiserror::Error;

/// Errors that can occur when talking to the directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// No account matches the username.
    #[error("no such user: {0}")]
    NoSuchUser(String),

    /// More than one account matches the username.
    #[error("ambiguous user: {count} entries match {username}")]
    AmbiguousUser {
        /// Username that was searched.
        username: String,
        /// Number of matching entries.
        count: usize,
    },

    /// The password was rejected (or was empty).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The directory did not answer in time.
    #[error("directory timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Protocol or connection failure.
    #[error("ldap error: {0}")]
    Ldap(#[from] ldap3::LdapError),
}
