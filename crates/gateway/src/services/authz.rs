//! Path-based authorization gate.
//!
//! Public assets are open to everyone, administrative paths require a
//! directory group membership, and everything else is left to downstream
//! authorizers once the session has an identity.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tower_sessions::Session;
use tracing::{debug, error, info, warn};

use crate::directory::DirectoryClient;
use crate::hooks::{AuthorizeHook, HookOutcome};
use crate::middleware::session::{current_identity, set_identity};

static PUBLIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(static|javascripts|pluginfw|favicon\.ico|api)(/|\?|$)").expect("Invalid regex")
});

static ADMIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^/admin").expect("Invalid regex"));

/// Access class of a requested path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
    /// Static assets and the HTTP API; never gated.
    Public,
    /// The editor's administration area.
    Administrative,
    /// Anything else, pads included.
    Other,
}

impl ResourceClass {
    /// Classify a request path; the first matching class wins.
    ///
    /// Public prefixes must end at a segment boundary and match case
    /// exactly, so `/apix` or `/API/x` are not public. The admin prefix is a
    /// bare, case-insensitive prefix because the editor routes `/ADMIN` and
    /// `/admin-auth/` to its administration pages. A path that sits between
    /// the two rules always lands in the stricter class.
    #[must_use]
    pub fn classify(path: &str) -> Self {
        if PUBLIC_RE.is_match(path) {
            Self::Public
        } else if ADMIN_RE.is_match(path) {
            Self::Administrative
        } else {
            Self::Other
        }
    }
}

/// Authorizer that gates administrative paths on directory group membership.
#[derive(Clone)]
pub struct AuthGate {
    directory: Arc<dyn DirectoryClient>,
}

impl AuthGate {
    /// Create a new gate.
    #[must_use]
    pub fn new(directory: Arc<dyn DirectoryClient>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl AuthorizeHook for AuthGate {
    fn name(&self) -> &'static str {
        "auth-gate"
    }

    async fn authorize(&self, resource: &str, session: &Session) -> HookOutcome<bool> {
        let class = ResourceClass::classify(resource);
        if class == ResourceClass::Public {
            return HookOutcome::Handled(true);
        }

        let identity = match current_identity(session).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                debug!(resource, "no identity in session");
                return HookOutcome::Handled(false);
            }
            Err(e) => {
                error!(resource, error = %e, "failed to read session identity");
                return HookOutcome::Handled(false);
            }
        };

        if class == ResourceClass::Other {
            return HookOutcome::Continue;
        }

        let groups = match self.directory.group_search(&identity.username).await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(
                    username = %identity.username,
                    resource,
                    error = %e,
                    "group search failed, denying administrative access"
                );
                return HookOutcome::Handled(false);
            }
        };

        let is_admin = !groups.is_empty();
        let username = identity.username.clone();
        let stored = match set_identity(session, &identity.with_admin(is_admin)).await {
            Ok(()) => session.save().await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            error!(
                %username,
                resource,
                is_admin,
                error = %e,
                "failed to store admin flag, denying administrative access"
            );
            return HookOutcome::Handled(false);
        }

        if is_admin {
            info!(%username, resource, "administrative access granted");
        } else {
            info!(%username, resource, "administrative access denied, not in admin group");
        }
        HookOutcome::Handled(is_admin)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use tower_sessions::MemoryStore;
    use tower_sessions::session::{Id, Record};
    use tower_sessions::session_store::{self, SessionStore};

    use padgate_core::{SessionIdentity, Username};

    use super::*;
    use crate::test_utils::StaticDirectory;

    fn session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    async fn session_for(username: &str) -> Session {
        let session = session();
        let identity = SessionIdentity::new(Username::parse(username).unwrap());
        set_identity(&session, &identity).await.unwrap();
        session
    }

    /// Memory store whose writes can be switched off.
    #[derive(Debug, Clone, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        failing: Arc<AtomicBool>,
    }

    impl FlakyStore {
        fn check(&self) -> session_store::Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                Err(session_store::Error::Backend("store offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn create(&self, record: &mut Record) -> session_store::Result<()> {
            self.check()?;
            self.inner.create(record).await
        }

        async fn save(&self, record: &Record) -> session_store::Result<()> {
            self.check()?;
            self.inner.save(record).await
        }

        async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
            self.inner.load(session_id).await
        }

        async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
            self.inner.delete(session_id).await
        }
    }

    fn directory() -> StaticDirectory {
        StaticDirectory::new()
            .with_user("alice", "secret", "Alice Q. Example")
            .with_user("bob", "hunter2", "Bob")
            .with_groups("alice", &["cn=admin,ou=Groups,dc=corp,dc=test"])
    }

    #[test]
    fn test_classification() {
        for path in [
            "/static/css/pad.css",
            "/javascripts/lib/ep_etherpad-lite/static/js/pad.js",
            "/pluginfw/plugin-definitions.json",
            "/favicon.ico",
            "/api/1.2.15/createPad",
            "/api?apikey=x",
            "/api",
        ] {
            assert_eq!(ResourceClass::classify(path), ResourceClass::Public, "{path}");
        }

        for path in [
            "/admin",
            "/admin/",
            "/admin/settings",
            "/administrator",
            "/admin-auth/",
            "/ADMIN/plugins",
            "/Admin",
        ] {
            assert_eq!(
                ResourceClass::classify(path),
                ResourceClass::Administrative,
                "{path}"
            );
        }

        for path in [
            "/",
            "/p/welcome",
            "/staticfile",
            "/apix",
            "/API/1/createPad",
            "/p/admin",
            "/favicon.icox",
        ] {
            assert_eq!(ResourceClass::classify(path), ResourceClass::Other, "{path}");
        }
    }

    #[tokio::test]
    async fn test_public_paths_need_no_identity() {
        let gate = AuthGate::new(Arc::new(directory()));
        assert_eq!(
            gate.authorize("/static/x.css", &session()).await,
            HookOutcome::Handled(true)
        );
    }

    #[tokio::test]
    async fn test_no_identity_is_denied_without_directory() {
        let directory = directory();
        let gate = AuthGate::new(Arc::new(directory.clone()));

        assert_eq!(
            gate.authorize("/p/welcome", &session()).await,
            HookOutcome::Handled(false)
        );
        assert_eq!(
            gate.authorize("/admin/settings", &session()).await,
            HookOutcome::Handled(false)
        );
        assert_eq!(directory.group_searches(), 0);
    }

    #[tokio::test]
    async fn test_other_paths_defer_with_identity() {
        let gate = AuthGate::new(Arc::new(directory()));
        let session = session_for("bob").await;
        assert_eq!(
            gate.authorize("/p/welcome", &session).await,
            HookOutcome::Continue
        );
    }

    #[tokio::test]
    async fn test_admin_group_member_is_granted() {
        let gate = AuthGate::new(Arc::new(directory()));
        let session = session_for("alice").await;

        assert_eq!(
            gate.authorize("/admin/settings", &session).await,
            HookOutcome::Handled(true)
        );
        let identity = current_identity(&session).await.unwrap().unwrap();
        assert_eq!(identity.is_admin, Some(true));
        assert!(identity.admin_checked_at.is_some());
    }

    #[tokio::test]
    async fn test_non_member_is_denied() {
        let gate = AuthGate::new(Arc::new(directory()));
        let session = session_for("bob").await;

        assert_eq!(
            gate.authorize("/admin/settings", &session).await,
            HookOutcome::Handled(false)
        );
        let identity = current_identity(&session).await.unwrap().unwrap();
        assert_eq!(identity.is_admin, Some(false));
    }

    #[tokio::test]
    async fn test_directory_failure_denies_and_keeps_flag() {
        let directory = directory().failing_group_search();
        let gate = AuthGate::new(Arc::new(directory));
        let session = session_for("alice").await;

        assert_eq!(
            gate.authorize("/admin", &session).await,
            HookOutcome::Handled(false)
        );
        let identity = current_identity(&session).await.unwrap().unwrap();
        assert_eq!(identity.is_admin, None);
    }

    #[tokio::test]
    async fn test_admin_flag_is_refreshed_on_every_request() {
        let directory = directory();
        let gate = AuthGate::new(Arc::new(directory.clone()));
        let session = session_for("alice").await;

        gate.authorize("/admin", &session).await;
        gate.authorize("/admin/plugins", &session).await;
        assert_eq!(directory.group_searches(), 2);
    }

    #[tokio::test]
    async fn test_unstored_admin_flag_denies_access() {
        let store = FlakyStore::default();
        let session = Session::new(None, Arc::new(store.clone()), None);
        let identity = SessionIdentity::new(Username::parse("alice").unwrap());
        set_identity(&session, &identity).await.unwrap();
        store.failing.store(true, Ordering::SeqCst);

        let gate = AuthGate::new(Arc::new(directory()));
        assert_eq!(
            gate.authorize("/admin/settings", &session).await,
            HookOutcome::Handled(false)
        );
    }

    #[tokio::test]
    async fn test_admin_flag_is_saved_to_the_store() {
        let store = MemoryStore::default();
        let session = Session::new(None, Arc::new(store.clone()), None);
        let identity = SessionIdentity::new(Username::parse("alice").unwrap());
        set_identity(&session, &identity).await.unwrap();

        let gate = AuthGate::new(Arc::new(directory()));
        gate.authorize("/admin", &session).await;

        let id = session.id().unwrap();
        let record = store.load(&id).await.unwrap().unwrap();
        let stored: SessionIdentity =
            serde_json::from_value(record.data["identity"].clone()).unwrap();
        assert_eq!(stored.is_admin, Some(true));
    }
}
