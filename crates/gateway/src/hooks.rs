//! Chained hooks for the authentication, authorization and message layers.
//!
//! Every layer the gateway plugs into follows the same contract: hooks run
//! in registration order and the first one that *handles* the call decides
//! the result. A hook that has no opinion returns [`HookOutcome::Continue`]
//! and the next hook is consulted.
//!
//! The editor's plugin contract renders outcomes as one-element arrays
//! (`[true]`, `[false]`, `[message]`, `[null]`); [`HookOutcome::to_wire`]
//! produces that form for logging and for hosts that speak it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::{Value, json};
use tower_sessions::Session;
use tracing::debug;

use padgate_core::{ConnectionId, SessionMessage, VerifiedIdentity};

/// Result of a single hook invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome<T> {
    /// The hook handled the call; stop the chain with this value.
    Handled(T),
    /// No opinion; continue with the next hook.
    Continue,
}

impl<T> HookOutcome<T> {
    /// Whether the hook handled the call.
    #[must_use]
    pub const fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }
}

impl HookOutcome<bool> {
    /// Render as the boolean-array contract: only an explicit grant is `[true]`.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!([matches!(self, Self::Handled(true))])
    }
}

impl HookOutcome<VerifiedIdentity> {
    /// Render as the boolean-array contract: `[true]` once authenticated.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!([self.is_handled()])
    }
}

impl HookOutcome<Option<SessionMessage>> {
    /// Render as the message contract: the message to forward, or `null`.
    #[must_use]
    pub fn to_wire(&self, original: &SessionMessage) -> Value {
        match self {
            Self::Handled(Some(message)) => json!([message]),
            Self::Handled(None) => json!([null]),
            Self::Continue => json!([original]),
        }
    }
}

/// A provider that may authenticate the request from its headers.
///
/// A successful provider records the identity in the session and returns it.
#[async_trait]
pub trait AuthenticateHook: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Try to authenticate the request.
    async fn authenticate(
        &self,
        headers: &HeaderMap,
        session: &Session,
    ) -> HookOutcome<VerifiedIdentity>;
}

/// An authorizer for a requested resource path.
///
/// `Handled(true)` grants, `Handled(false)` denies, `Continue` defers.
#[async_trait]
pub trait AuthorizeHook: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Decide access to `resource` for the session.
    async fn authorize(&self, resource: &str, session: &Session) -> HookOutcome<bool>;
}

/// A filter over live-session messages.
///
/// `Handled(Some(m))` replaces the message, `Handled(None)` suppresses it,
/// `Continue` passes it through unchanged.
#[async_trait]
pub trait MessageHook: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Inspect a message received on `connection`.
    async fn handle_message(
        &self,
        connection: &ConnectionId,
        message: &SessionMessage,
    ) -> HookOutcome<Option<SessionMessage>>;
}

/// An ordered list of hooks with first-handled-wins semantics.
pub struct HookChain<H: ?Sized> {
    hooks: Vec<Arc<H>>,
}

impl<H: ?Sized> HookChain<H> {
    /// Create an empty chain.
    #[must_use]
    pub const fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Append a hook; it runs after every hook already registered.
    #[must_use]
    pub fn with(mut self, hook: Arc<H>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Number of registered hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl<H: ?Sized> Default for HookChain<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: ?Sized> Clone for HookChain<H> {
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
        }
    }
}

impl<H: ?Sized> fmt::Debug for HookChain<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookChain")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl HookChain<dyn AuthenticateHook> {
    /// Run the authentication providers until one handles the request.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        session: &Session,
    ) -> HookOutcome<VerifiedIdentity> {
        for hook in &self.hooks {
            let outcome = hook.authenticate(headers, session).await;
            debug!(hook = hook.name(), result = %outcome.to_wire(), "authenticate hook");
            if outcome.is_handled() {
                return outcome;
            }
        }
        HookOutcome::Continue
    }
}

impl HookChain<dyn AuthorizeHook> {
    /// Run the authorizers until one grants or denies `resource`.
    pub async fn authorize(&self, resource: &str, session: &Session) -> HookOutcome<bool> {
        for hook in &self.hooks {
            let outcome = hook.authorize(resource, session).await;
            debug!(hook = hook.name(), resource, result = %outcome.to_wire(), "authorize hook");
            if outcome.is_handled() {
                return outcome;
            }
        }
        HookOutcome::Continue
    }
}

impl HookChain<dyn MessageHook> {
    /// Run the message filters; returns the message to forward, or `None`
    /// when a hook suppressed it.
    pub async fn handle_message(
        &self,
        connection: &ConnectionId,
        message: SessionMessage,
    ) -> Option<SessionMessage> {
        for hook in &self.hooks {
            let outcome = hook.handle_message(connection, &message).await;
            debug!(
                hook = hook.name(),
                connection = %connection,
                kind = %message.kind,
                result = %outcome.to_wire(&message),
                "message hook"
            );
            if let HookOutcome::Handled(replacement) = outcome {
                return replacement;
            }
        }
        Some(message)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use padgate_core::message_types;
    use tower_sessions::MemoryStore;

    use super::*;

    struct Fixed {
        outcome: HookOutcome<bool>,
        calls: AtomicUsize,
    }

    impl Fixed {
        fn new(outcome: HookOutcome<bool>) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AuthorizeHook for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn authorize(&self, _resource: &str, _session: &Session) -> HookOutcome<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    struct Rename;

    #[async_trait]
    impl MessageHook for Rename {
        fn name(&self) -> &'static str {
            "rename"
        }

        async fn handle_message(
            &self,
            _connection: &ConnectionId,
            message: &SessionMessage,
        ) -> HookOutcome<Option<SessionMessage>> {
            if message.is("PING") {
                HookOutcome::Handled(Some(SessionMessage::new("PONG")))
            } else {
                HookOutcome::Continue
            }
        }
    }

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    #[tokio::test]
    async fn test_first_handled_wins() {
        let deferring = Fixed::new(HookOutcome::Continue);
        let granting = Fixed::new(HookOutcome::Handled(true));
        let never = Fixed::new(HookOutcome::Handled(false));

        let chain = HookChain::<dyn AuthorizeHook>::new()
            .with(deferring.clone())
            .with(granting.clone())
            .with(never.clone());

        let outcome = chain.authorize("/p/welcome", &session()).await;
        assert_eq!(outcome, HookOutcome::Handled(true));
        assert_eq!(deferring.calls.load(Ordering::SeqCst), 1);
        assert_eq!(granting.calls.load(Ordering::SeqCst), 1);
        assert_eq!(never.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_chain_continues() {
        let chain: HookChain<dyn AuthorizeHook> = HookChain::default();
        assert!(chain.is_empty());
        assert_eq!(
            chain.authorize("/", &session()).await,
            HookOutcome::Continue
        );
    }

    #[tokio::test]
    async fn test_message_chain_replaces_and_passes_through() {
        let chain = HookChain::<dyn MessageHook>::new().with(Arc::new(Rename));
        let connection = ConnectionId::new("c1");

        let replaced = chain
            .handle_message(&connection, SessionMessage::new("PING"))
            .await
            .unwrap();
        assert!(replaced.is("PONG"));

        let untouched = SessionMessage::new(message_types::CLIENT_READY).with_token("t1");
        let forwarded = chain
            .handle_message(&connection, untouched.clone())
            .await
            .unwrap();
        assert_eq!(forwarded, untouched);
    }

    #[test]
    fn test_wire_rendering() {
        assert_eq!(HookOutcome::Handled(true).to_wire(), json!([true]));
        assert_eq!(HookOutcome::Handled(false).to_wire(), json!([false]));
        assert_eq!(HookOutcome::<bool>::Continue.to_wire(), json!([false]));

        let original = SessionMessage::new(message_types::CLIENT_READY).with_token("tok1");
        let suppressed: HookOutcome<Option<SessionMessage>> = HookOutcome::Handled(None);
        assert_eq!(suppressed.to_wire(&original), json!([null]));

        let passed: HookOutcome<Option<SessionMessage>> = HookOutcome::Continue;
        assert_eq!(
            passed.to_wire(&original),
            json!([{"type": "CLIENT_READY", "token": "tok1"}])
        );
    }
}
