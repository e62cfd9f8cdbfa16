//! Directory-backed credential check.
//!
//! Runs as an [`AuthenticateHook`]: a request carrying valid Basic
//! credentials gets a [`SessionIdentity`] in its session and its display
//! name recorded for the upcoming live-session handshake. Anything short of
//! a verified credential defers to the next provider.

mod credential;

pub use credential::{Credential, CredentialError};

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use secrecy::ExposeSecret;
use tower_sessions::Session;
use tracing::{debug, error, info, warn};

use padgate_core::{SessionIdentity, VerifiedIdentity};

use crate::directory::DirectoryClient;
use crate::hooks::{AuthenticateHook, HookOutcome};
use crate::middleware::session::{persisted_session_id, set_identity};
use crate::services::pending_names::PendingDisplayNames;

/// Authentication provider that checks Basic credentials against the
/// directory.
#[derive(Clone)]
pub struct DirectoryAuthenticator {
    directory: Arc<dyn DirectoryClient>,
    pending: PendingDisplayNames,
}

impl DirectoryAuthenticator {
    /// Create a new authenticator.
    #[must_use]
    pub fn new(directory: Arc<dyn DirectoryClient>, pending: PendingDisplayNames) -> Self {
        Self { directory, pending }
    }
}

#[async_trait]
impl AuthenticateHook for DirectoryAuthenticator {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn authenticate(
        &self,
        headers: &HeaderMap,
        session: &Session,
    ) -> HookOutcome<VerifiedIdentity> {
        let credential = match Credential::from_headers(headers) {
            Ok(credential) => credential,
            Err(CredentialError::Missing) => return HookOutcome::Continue,
            Err(e) => {
                debug!(error = %e, "ignoring unusable credentials");
                return HookOutcome::Continue;
            }
        };

        let verified = match self
            .directory
            .authenticate(&credential.username, credential.password.expose_secret())
            .await
        {
            Ok(verified) => verified,
            Err(e) => {
                warn!(
                    username = %credential.username,
                    error = %e,
                    "directory rejected credentials"
                );
                return HookOutcome::Continue;
            }
        };

        let identity = SessionIdentity::new(verified.username.clone());
        if let Err(e) = set_identity(session, &identity).await {
            error!(username = %verified.username, error = %e, "failed to store session identity");
            return HookOutcome::Continue;
        }

        let session_id = match persisted_session_id(session).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                error!(username = %verified.username, "session has no id after save");
                return HookOutcome::Continue;
            }
            Err(e) => {
                error!(username = %verified.username, error = %e, "failed to save session");
                return HookOutcome::Continue;
            }
        };

        self.pending
            .record(session_id, verified.display_name.clone())
            .await;

        info!(
            username = %verified.username,
            display_name = %verified.display_name,
            "user authenticated"
        );
        HookOutcome::Handled(verified)
    }
}
