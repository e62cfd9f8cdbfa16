//! In-memory collaborators for tests.
//!
//! Available to this crate's unit tests and, through the `test-utils`
//! feature, to the integration test crate.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use secrecy::SecretString;
use url::Url;

use padgate_core::{AuthorId, AuthorToken, Username, VerifiedIdentity};

use crate::config::{
    ConnectionsConfig, DirectoryConfig, GatewayConfig, PendingNamesConfig, SearchScope,
};
use crate::db::{AuthorStore, RepositoryError};
use crate::directory::{DirectoryClient, DirectoryError};

#[derive(Debug, Clone)]
struct StaticAccount {
    password: String,
    display_name: String,
}

/// Directory with a fixed set of accounts and group memberships.
///
/// Clones share their call counters.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    accounts: HashMap<String, StaticAccount>,
    groups: HashMap<String, Vec<String>>,
    fail_group_search: bool,
    group_searches: Arc<AtomicUsize>,
}

impl StaticDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account.
    #[must_use]
    pub fn with_user(mut self, username: &str, password: &str, display_name: &str) -> Self {
        self.accounts.insert(
            username.to_string(),
            StaticAccount {
                password: password.to_string(),
                display_name: display_name.to_string(),
            },
        );
        self
    }

    /// Set the administrative groups `username` belongs to.
    #[must_use]
    pub fn with_groups(mut self, username: &str, groups: &[&str]) -> Self {
        self.groups.insert(
            username.to_string(),
            groups.iter().map(ToString::to_string).collect(),
        );
        self
    }

    /// Make every group search fail as if the directory were unreachable.
    #[must_use]
    pub fn failing_group_search(mut self) -> Self {
        self.fail_group_search = true;
        self
    }

    /// Number of group searches performed so far.
    #[must_use]
    pub fn group_searches(&self) -> usize {
        self.group_searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectoryClient for StaticDirectory {
    async fn authenticate(
        &self,
        username: &Username,
        password: &str,
    ) -> Result<VerifiedIdentity, DirectoryError> {
        let account = self
            .accounts
            .get(username.as_str())
            .ok_or_else(|| DirectoryError::NoSuchUser(username.to_string()))?;
        if password.is_empty() || account.password != password {
            return Err(DirectoryError::InvalidCredentials);
        }
        Ok(VerifiedIdentity::new(
            username.clone(),
            account.display_name.clone(),
        ))
    }

    async fn group_search(&self, username: &Username) -> Result<Vec<String>, DirectoryError> {
        self.group_searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_group_search {
            return Err(DirectoryError::Timeout(Duration::from_secs(10)));
        }
        Ok(self
            .groups
            .get(username.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

/// Author store backed by concurrent maps.
///
/// Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuthorStore {
    tokens: Arc<DashMap<AuthorToken, AuthorId>>,
    names: Arc<DashMap<AuthorId, Option<String>>>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryAuthorStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unnamed author reachable through `token`.
    #[must_use]
    pub fn with_author(self, token: &str, author: &str) -> Self {
        self.tokens
            .insert(AuthorToken::new(token), AuthorId::new(author));
        self.names.insert(AuthorId::new(author), None);
        self
    }

    /// The author's current display name.
    #[must_use]
    pub fn display_name(&self, author: &AuthorId) -> Option<String> {
        self.names.get(author).and_then(|entry| entry.value().clone())
    }

    /// Number of successful display name writes.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorStore for InMemoryAuthorStore {
    async fn resolve_author_by_token(
        &self,
        token: &AuthorToken,
    ) -> Result<AuthorId, RepositoryError> {
        self.tokens
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(RepositoryError::NotFound)
    }

    async fn set_author_display_name(
        &self,
        author: &AuthorId,
        name: &str,
    ) -> Result<(), RepositoryError> {
        let mut entry = self.names.get_mut(author).ok_or(RepositoryError::NotFound)?;
        *entry = Some(name.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A configuration fronting `upstream_url`, with no environment access.
#[must_use]
pub fn test_config(upstream_url: Url) -> GatewayConfig {
    GatewayConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        base_url: "http://localhost:9002".to_string(),
        upstream_url,
        database_url: SecretString::from("postgres://unused@localhost/unused".to_string()),
        auth_realm: "Collaborative Editor".to_string(),
        pending_names: PendingNamesConfig::default(),
        connections: ConnectionsConfig::default(),
        directory: DirectoryConfig {
            url: "ldap://localhost:389".to_string(),
            bind_dn: "cn=gateway,dc=corp,dc=test".to_string(),
            bind_password: SecretString::from("unused".to_string()),
            account_base: "ou=People,dc=corp,dc=test".to_string(),
            account_pattern: "(&(objectClass=*)(uid={{username}}))".to_string(),
            search_scope: SearchScope::Subtree,
            display_name_attribute: "cn".to_string(),
            group_search_base: "ou=Groups,dc=corp,dc=test".to_string(),
            group_attribute: "member".to_string(),
            group_attribute_is_dn: true,
            group_search: "(&(cn=admin)(objectClass=groupOfNames))".to_string(),
            cache: false,
            timeout: Duration::from_secs(1),
        },
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 1.0,
        tls: None,
    }
}
