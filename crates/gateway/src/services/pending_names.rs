//! Display names waiting for their session's handshake.
//!
//! A successful credential check knows the user's display name but not the
//! author record it belongs to; the handshake knows the author but not the
//! name. The two meet here, keyed by HTTP session id.

use moka::future::Cache;

use padgate_core::SessionId;

use crate::config::PendingNamesConfig;

/// Bounded session id -> display name map.
///
/// Entries expire after a period without reads or writes and the map never
/// grows beyond its configured capacity. Clones share the same storage.
#[derive(Clone)]
pub struct PendingDisplayNames {
    names: Cache<SessionId, String>,
}

impl PendingDisplayNames {
    /// Create an empty map with the given bounds.
    #[must_use]
    pub fn new(config: &PendingNamesConfig) -> Self {
        Self {
            names: Cache::builder()
                .max_capacity(config.capacity)
                .time_to_idle(config.time_to_idle)
                .build(),
        }
    }

    /// Record the display name for a session; the last write wins.
    pub async fn record(&self, session: SessionId, display_name: String) {
        self.names.insert(session, display_name).await;
    }

    /// The pending display name for a session, if any.
    ///
    /// Entries are kept after a lookup: every pad the session opens starts
    /// a new handshake that needs the same name.
    pub async fn lookup(&self, session: &SessionId) -> Option<String> {
        self.names.get(session).await
    }
}

impl std::fmt::Debug for PendingDisplayNames {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingDisplayNames")
            .field("entries", &self.names.entry_count())
            .finish()
    }
}

impl Default for PendingDisplayNames {
    fn default() -> Self {
        Self::new(&PendingNamesConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_record_and_lookup() {
        let names = PendingDisplayNames::default();
        let session = SessionId::new("s1");

        assert_eq!(names.lookup(&session).await, None);

        names.record(session.clone(), "Alice".to_string()).await;
        assert_eq!(names.lookup(&session).await.as_deref(), Some("Alice"));

        // Lookups don't consume the entry
        assert_eq!(names.lookup(&session).await.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let names = PendingDisplayNames::default();
        let session = SessionId::new("s1");

        names.record(session.clone(), "Alice".to_string()).await;
        names.record(session.clone(), "Alice Q. Example".to_string()).await;

        assert_eq!(
            names.lookup(&session).await.as_deref(),
            Some("Alice Q. Example")
        );
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let names = PendingDisplayNames::default();
        names.record(SessionId::new("s1"), "Alice".to_string()).await;
        names.record(SessionId::new("s2"), "Bob".to_string()).await;

        assert_eq!(
            names.lookup(&SessionId::new("s1")).await.as_deref(),
            Some("Alice")
        );
        assert_eq!(
            names.lookup(&SessionId::new("s2")).await.as_deref(),
            Some("Bob")
        );
    }

    #[tokio::test]
    async fn test_idle_entries_expire() {
        let names = PendingDisplayNames::new(&PendingNamesConfig {
            time_to_idle: Duration::from_millis(50),
            capacity: 10,
        });
        let session = SessionId::new("s1");
        names.record(session.clone(), "Alice".to_string()).await;

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(names.lookup(&session).await, None);
    }
}
