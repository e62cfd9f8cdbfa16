//! Access gate in front of every proxied request.
//!
//! The authorizers run first. When they don't grant access and the session
//! has no identity yet, the authentication providers get a chance to
//! establish one from the request headers, and the authorizers run again.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tower_sessions::Session;
use tracing::debug;

use crate::error::AppError;
use crate::hooks::HookOutcome;
use crate::middleware::session::current_identity;
use crate::state::AppState;

/// Gate middleware.
///
/// - granted: pass through
/// - no identity: `401` with a Basic challenge
/// - denied with an identity: `403`
/// - no opinion with an identity: pass through; the editor applies its own
///   per-document rules
///
/// On success the [`SessionIdentity`](padgate_core::SessionIdentity), if
/// any, is added to the request extensions.
///
/// # Errors
///
/// Returns `AppError` when access is refused or the session store fails.
pub async fn gate(
    State(state): State<AppState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let resource = request.uri().path().to_string();

    let mut decision = state.authorize_hooks().authorize(&resource, &session).await;
    let mut identity = current_identity(&session).await?;

    if decision != HookOutcome::Handled(true) && identity.is_none() {
        let authenticated = state
            .authenticate_hooks()
            .authenticate(request.headers(), &session)
            .await;
        if authenticated.is_handled() {
            decision = state.authorize_hooks().authorize(&resource, &session).await;
            identity = current_identity(&session).await?;
        }
    }

    match (decision, identity) {
        (HookOutcome::Handled(true), identity) | (HookOutcome::Continue, identity @ Some(_)) => {
            if let Some(identity) = identity {
                request.extensions_mut().insert(identity);
            }
            Ok(next.run(request).await)
        }
        (_, None) => {
            debug!(%resource, "authentication required");
            Err(AppError::AuthenticationRequired {
                realm: state.config().auth_realm.clone(),
            })
        }
        (HookOutcome::Handled(false), Some(identity)) => {
            debug!(%resource, username = %identity.username, "access denied");
            Err(AppError::Forbidden(resource))
        }
    }
}
