//! Live-session handshake interception.
//!
//! When a connection announces itself with `CLIENT_READY`, the display
//! name the directory returned for its HTTP session is written to the
//! author record behind the connection's token. Client-side profile edits
//! are dropped so the directory name stays authoritative.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use padgate_core::{
    AuthorId, AuthorToken, ConnectionId, SessionId, SessionMessage, message_types,
};

use crate::db::{AuthorStore, RepositoryError};
use crate::hooks::{HookOutcome, MessageHook};
use crate::services::pending_names::PendingDisplayNames;
use crate::transport::ConnectionRegistry;

/// Why a display name could not be committed.
#[derive(Debug, Error)]
pub enum CommitError {
    /// The connection was never bound to an HTTP session.
    #[error("connection {0} is not bound to a session")]
    UnknownConnection(ConnectionId),

    /// The session has no pending display name.
    #[error("no pending display name for session {0}")]
    NoPendingName(SessionId),

    /// The author store failed.
    #[error("author store error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Message hook that commits display names on handshake.
#[derive(Clone)]
pub struct HandshakeInterceptor {
    registry: Arc<dyn ConnectionRegistry>,
    authors: Arc<dyn AuthorStore>,
    pending: PendingDisplayNames,
}

impl HandshakeInterceptor {
    /// Create a new interceptor.
    #[must_use]
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        authors: Arc<dyn AuthorStore>,
        pending: PendingDisplayNames,
    ) -> Self {
        Self {
            registry,
            authors,
            pending,
        }
    }

    /// Write the pending display name of `connection`'s session to the
    /// author bound to `token`.
    ///
    /// # Errors
    ///
    /// Returns a [`CommitError`] if any link of the chain is missing or the
    /// author store fails.
    pub async fn commit_display_name(
        &self,
        connection: &ConnectionId,
        token: &AuthorToken,
    ) -> Result<AuthorId, CommitError> {
        let session = self
            .registry
            .session_for_connection(connection)
            .await
            .ok_or_else(|| CommitError::UnknownConnection(connection.clone()))?;

        let name = self
            .pending
            .lookup(&session)
            .await
            .ok_or_else(|| CommitError::NoPendingName(session.clone()))?;

        let author = self.authors.resolve_author_by_token(token).await?;
        self.authors.set_author_display_name(&author, &name).await?;

        info!(
            connection = %connection,
            author = %author,
            display_name = %name,
            "display name committed"
        );
        Ok(author)
    }

    fn spawn_commit(&self, connection: ConnectionId, token: AuthorToken) {
        let interceptor = self.clone();
        tokio::spawn(async move {
            match interceptor.commit_display_name(&connection, &token).await {
                Ok(_) => {}
                Err(e @ (CommitError::UnknownConnection(_) | CommitError::NoPendingName(_))) => {
                    warn!(connection = %connection, error = %e, "display name not committed");
                }
                Err(e) => {
                    error!(connection = %connection, error = %e, "failed to commit display name");
                }
            }
        });
    }
}

#[async_trait]
impl MessageHook for HandshakeInterceptor {
    fn name(&self) -> &'static str {
        "handshake"
    }

    async fn handle_message(
        &self,
        connection: &ConnectionId,
        message: &SessionMessage,
    ) -> HookOutcome<Option<SessionMessage>> {
        if message.is(message_types::CLIENT_READY) {
            match message.token() {
                Some(token) => self.spawn_commit(connection.clone(), AuthorToken::new(token)),
                None => debug!(connection = %connection, "CLIENT_READY without token"),
            }
            return HookOutcome::Continue;
        }

        if message.is(message_types::COLLABROOM)
            && message.data_kind() == Some(message_types::USERINFO_UPDATE)
        {
            debug!(connection = %connection, "dropping client profile update");
            return HookOutcome::Handled(None);
        }

        HookOutcome::Continue
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::test_utils::InMemoryAuthorStore;
    use crate::transport::InMemoryConnectionRegistry;

    struct Fixture {
        interceptor: HandshakeInterceptor,
        registry: InMemoryConnectionRegistry,
        authors: InMemoryAuthorStore,
        pending: PendingDisplayNames,
    }

    fn fixture() -> Fixture {
        let registry = InMemoryConnectionRegistry::default();
        let authors = InMemoryAuthorStore::new().with_author("tok1", "a.alice");
        let pending = PendingDisplayNames::default();
        let interceptor = HandshakeInterceptor::new(
            Arc::new(registry.clone()),
            Arc::new(authors.clone()),
            pending.clone(),
        );
        Fixture {
            interceptor,
            registry,
            authors,
            pending,
        }
    }

    async fn wait_for_name(authors: &InMemoryAuthorStore, author: &str) -> Option<String> {
        for _ in 0..50 {
            if let Some(name) = authors.display_name(&AuthorId::new(author)) {
                return Some(name);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_commit_writes_pending_name() {
        let f = fixture();
        f.registry
            .bind(ConnectionId::new("c1"), SessionId::new("s1"))
            .await;
        f.pending
            .record(SessionId::new("s1"), "Alice Q. Example".to_string())
            .await;

        let author = f
            .interceptor
            .commit_display_name(&ConnectionId::new("c1"), &AuthorToken::new("tok1"))
            .await
            .unwrap();

        assert_eq!(author, AuthorId::new("a.alice"));
        assert_eq!(
            f.authors.display_name(&author).as_deref(),
            Some("Alice Q. Example")
        );
    }

    #[tokio::test]
    async fn test_commit_failures() {
        let f = fixture();
        let err = f
            .interceptor
            .commit_display_name(&ConnectionId::new("nope"), &AuthorToken::new("tok1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::UnknownConnection(_)));

        f.registry
            .bind(ConnectionId::new("c1"), SessionId::new("s1"))
            .await;
        let err = f
            .interceptor
            .commit_display_name(&ConnectionId::new("c1"), &AuthorToken::new("tok1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::NoPendingName(_)));

        f.pending.record(SessionId::new("s1"), "Alice".to_string()).await;
        let err = f
            .interceptor
            .commit_display_name(&ConnectionId::new("c1"), &AuthorToken::new("unknown"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CommitError::Repository(RepositoryError::NotFound)
        ));
        assert_eq!(f.authors.display_name(&AuthorId::new("a.alice")), None);
    }

    #[tokio::test]
    async fn test_client_ready_passes_through_and_commits() {
        let f = fixture();
        f.registry
            .bind(ConnectionId::new("c1"), SessionId::new("s1"))
            .await;
        f.pending
            .record(SessionId::new("s1"), "Alice Q. Example".to_string())
            .await;

        let message = SessionMessage::new(message_types::CLIENT_READY).with_token("tok1");
        let outcome = f
            .interceptor
            .handle_message(&ConnectionId::new("c1"), &message)
            .await;

        assert_eq!(outcome, HookOutcome::Continue);
        assert_eq!(
            wait_for_name(&f.authors, "a.alice").await.as_deref(),
            Some("Alice Q. Example")
        );
    }

    #[tokio::test]
    async fn test_client_ready_without_token_writes_nothing() {
        let f = fixture();
        f.registry
            .bind(ConnectionId::new("c1"), SessionId::new("s1"))
            .await;
        f.pending.record(SessionId::new("s1"), "Alice".to_string()).await;

        let message = SessionMessage::new(message_types::CLIENT_READY);
        let outcome = f
            .interceptor
            .handle_message(&ConnectionId::new("c1"), &message)
            .await;

        assert_eq!(outcome, HookOutcome::Continue);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(f.authors.writes(), 0);
    }

    #[tokio::test]
    async fn test_userinfo_update_is_suppressed() {
        let f = fixture();
        let message = SessionMessage::new(message_types::COLLABROOM).with_data(json!({
            "type": "USERINFO_UPDATE",
            "userInfo": {"name": "Mallory", "colorId": 3}
        }));

        let outcome = f
            .interceptor
            .handle_message(&ConnectionId::new("c1"), &message)
            .await;
        assert_eq!(outcome, HookOutcome::Handled(None));
    }

    #[tokio::test]
    async fn test_other_messages_pass_through() {
        let f = fixture();
        let edit = SessionMessage::new(message_types::COLLABROOM)
            .with_data(json!({"type": "USER_CHANGES", "changeset": "Z:1>1*0+1$x"}));

        for message in [edit, SessionMessage::new("CHANGESET_REQ")] {
            let outcome = f
                .interceptor
                .handle_message(&ConnectionId::new("c1"), &message)
                .await;
            assert_eq!(outcome, HookOutcome::Continue);
        }
    }
}
