//! Live connection -> HTTP session correlation.

use async_trait::async_trait;
use moka::future::Cache;

use padgate_core::{ConnectionId, SessionId};

use crate::config::ConnectionsConfig;

/// Maps a live-session connection to the HTTP session that opened it.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// The HTTP session behind a connection, if known.
    async fn session_for_connection(&self, connection: &ConnectionId) -> Option<SessionId>;
}

/// Bounded in-process registry.
///
/// Bound by the socket route whenever a connection with an Engine.IO id is
/// polled or upgraded, and released when its WebSocket closes. Polling-only
/// connections have no close event; their entries expire once the client
/// stops polling for the configured idle time.
#[derive(Clone)]
pub struct InMemoryConnectionRegistry {
    connections: Cache<ConnectionId, SessionId>,
}

impl InMemoryConnectionRegistry {
    /// Create an empty registry with the given bounds.
    #[must_use]
    pub fn new(config: &ConnectionsConfig) -> Self {
        Self {
            connections: Cache::builder()
                .max_capacity(config.capacity)
                .time_to_idle(config.time_to_idle)
                .build(),
        }
    }

    /// Bind a connection to a session, replacing any earlier binding.
    pub async fn bind(&self, connection: ConnectionId, session: SessionId) {
        self.connections.insert(connection, session).await;
    }

    /// Forget a connection.
    pub async fn release(&self, connection: &ConnectionId) {
        self.connections.invalidate(connection).await;
    }

    /// Number of bound connections.
    pub async fn len(&self) -> u64 {
        self.connections.run_pending_tasks().await;
        self.connections.entry_count()
    }

    /// Whether no connections are bound.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl std::fmt::Debug for InMemoryConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryConnectionRegistry")
            .field("connections", &self.connections.entry_count())
            .finish()
    }
}

impl Default for InMemoryConnectionRegistry {
    fn default() -> Self {
        Self::new(&ConnectionsConfig::default())
    }
}

#[async_trait]
impl ConnectionRegistry for InMemoryConnectionRegistry {
    async fn session_for_connection(&self, connection: &ConnectionId) -> Option<SessionId> {
        self.connections.get(connection).await
    }
}
