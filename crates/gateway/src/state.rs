//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::GatewayConfig;
use crate::db::AuthorStore;
use crate::directory::DirectoryClient;
use crate::hooks::{AuthenticateHook, AuthorizeHook, HookChain, MessageHook};
use crate::services::auth::DirectoryAuthenticator;
use crate::services::authz::AuthGate;
use crate::services::handshake::HandshakeInterceptor;
use crate::services::pending_names::PendingDisplayNames;
use crate::transport::InMemoryConnectionRegistry;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and wires the directory,
/// author store and correlation tables into the three hook chains.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: GatewayConfig,
    authenticate: HookChain<dyn AuthenticateHook>,
    authorize: HookChain<dyn AuthorizeHook>,
    messages: HookChain<dyn MessageHook>,
    connections: InMemoryConnectionRegistry,
    upstream: reqwest::Client,
    pool: Option<PgPool>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Gateway configuration
    /// * `directory` - Directory used for credential checks and group search
    /// * `authors` - The editor's author records
    /// * `pool` - `PostgreSQL` pool, checked by the readiness route
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream HTTP client cannot be built.
    pub fn new(
        config: GatewayConfig,
        directory: Arc<dyn DirectoryClient>,
        authors: Arc<dyn AuthorStore>,
        pool: Option<PgPool>,
    ) -> Result<Self, reqwest::Error> {
        let pending_names = PendingDisplayNames::new(&config.pending_names);
        let connections = InMemoryConnectionRegistry::new(&config.connections);

        let authenticate = HookChain::<dyn AuthenticateHook>::new().with(Arc::new(
            DirectoryAuthenticator::new(Arc::clone(&directory), pending_names.clone()),
        ));
        let authorize =
            HookChain::<dyn AuthorizeHook>::new().with(Arc::new(AuthGate::new(directory)));
        let messages =
            HookChain::<dyn MessageHook>::new().with(Arc::new(HandshakeInterceptor::new(
                Arc::new(connections.clone()),
                authors,
                pending_names,
            )));

        let upstream = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                authenticate,
                authorize,
                messages,
                connections,
                upstream,
                pool,
            }),
        })
    }

    /// Get a reference to the gateway configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Authentication providers, in order.
    #[must_use]
    pub fn authenticate_hooks(&self) -> &HookChain<dyn AuthenticateHook> {
        &self.inner.authenticate
    }

    /// Resource authorizers, in order.
    #[must_use]
    pub fn authorize_hooks(&self) -> &HookChain<dyn AuthorizeHook> {
        &self.inner.authorize
    }

    /// Live-session message filters, in order.
    #[must_use]
    pub fn message_hooks(&self) -> &HookChain<dyn MessageHook> {
        &self.inner.messages
    }

    /// Connection id -> session id registry.
    #[must_use]
    pub fn connections(&self) -> &InMemoryConnectionRegistry {
        &self.inner.connections
    }

    /// HTTP client for the upstream editor.
    #[must_use]
    pub fn upstream(&self) -> &reqwest::Client {
        &self.inner.upstream
    }

    /// Get a reference to the database connection pool, if any.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.inner.pool.as_ref()
    }
}
