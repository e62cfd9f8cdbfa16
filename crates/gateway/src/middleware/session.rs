//! Session layer configuration and session-stored identity helpers.
//!
//! Sessions are backed by `PostgreSQL` in production and by the in-memory
//! store in tests; the cookie settings are the same for both.

use tower_sessions::{Expiry, Session, SessionManagerLayer, SessionStore};

use padgate_core::{SessionId, SessionIdentity};

use crate::config::GatewayConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "padgate_session";

/// Session expiry time in seconds (24 hours of inactivity).
const SESSION_EXPIRY_SECONDS: i64 = 24 * 60 * 60;

/// Session keys used by the gateway.
pub mod session_keys {
    /// Key for the authenticated [`SessionIdentity`](padgate_core::SessionIdentity).
    pub const IDENTITY: &str = "identity";
}

/// Create the session layer over the given store.
///
/// `SameSite=Lax` because the editor opens its live connection from pages
/// served by the same site.
#[must_use]
pub fn create_session_layer<S>(store: S, config: &GatewayConfig) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.secure_cookies())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

/// The identity stored in the session, if any.
///
/// # Errors
///
/// Returns an error if the session store cannot be read.
pub async fn current_identity(
    session: &Session,
) -> Result<Option<SessionIdentity>, tower_sessions::session::Error> {
    session.get(session_keys::IDENTITY).await
}

/// Store the identity in the session.
///
/// # Errors
///
/// Returns an error if the session store cannot be written.
pub async fn set_identity(
    session: &Session,
    identity: &SessionIdentity,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(session_keys::IDENTITY, identity).await
}

/// Persist the session and return its id.
///
/// A new session only receives an id once it is saved.
///
/// # Errors
///
/// Returns an error if the session store cannot be written.
pub async fn persisted_session_id(
    session: &Session,
) -> Result<Option<SessionId>, tower_sessions::session::Error> {
    if session.id().is_none() {
        session.save().await?;
    }
    Ok(session.id().map(|id| SessionId::new(id.to_string())))
}
