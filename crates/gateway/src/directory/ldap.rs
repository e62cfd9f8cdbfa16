//! LDAP implementation of [`DirectoryClient`].
//!
//! Every operation opens a short-lived connection, binds with the search
//! account, performs its searches and unbinds. Account lookups and group
//! results are cached for five minutes when caching is enabled; password
//! checks always go to the directory.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, ldap_escape};
use moka::future::Cache;
use tracing::{debug, instrument, warn};

use padgate_core::{Username, VerifiedIdentity};

use super::{DirectoryClient, DirectoryError};
use crate::config::{DirectoryConfig, SearchScope};

/// LDAP result code for a rejected bind.
const INVALID_CREDENTIALS: u32 = 49;

/// Cache lifetime for account and group lookups.
const CACHE_TTL: Duration = Duration::from_secs(300);

/// A resolved account entry.
#[derive(Debug, Clone)]
struct Account {
    dn: String,
    display_name: String,
}

/// Directory client backed by an LDAP server.
#[derive(Clone)]
pub struct LdapDirectory {
    inner: Arc<LdapDirectoryInner>,
}

struct LdapDirectoryInner {
    config: DirectoryConfig,
    accounts: Option<Cache<String, Account>>,
    groups: Option<Cache<String, Vec<String>>>,
}

impl LdapDirectory {
    /// Create a new LDAP directory client.
    #[must_use]
    pub fn new(config: DirectoryConfig) -> Self {
        let (accounts, groups) = if config.cache {
            (
                Some(Cache::builder().max_capacity(10_000).time_to_live(CACHE_TTL).build()),
                Some(Cache::builder().max_capacity(10_000).time_to_live(CACHE_TTL).build()),
            )
        } else {
            (None, None)
        };

        Self {
            inner: Arc::new(LdapDirectoryInner {
                config,
                accounts,
                groups,
            }),
        }
    }

    fn config(&self) -> &DirectoryConfig {
        &self.inner.config
    }

    /// Run a directory operation under the configured timeout.
    async fn timed<T>(
        &self,
        operation: impl Future<Output = Result<T, DirectoryError>>,
    ) -> Result<T, DirectoryError> {
        let timeout = self.config().timeout;
        tokio::time::timeout(timeout, operation)
            .await
            .map_err(|_| DirectoryError::Timeout(timeout))?
    }

    /// Open a connection and drive it in the background.
    async fn connect(&self) -> Result<Ldap, DirectoryError> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.config().timeout);
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.config().url).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection terminated");
            }
        });
        Ok(ldap)
    }

    /// Open a connection bound as the search account.
    async fn search_connection(&self) -> Result<Ldap, DirectoryError> {
        let mut ldap = self.connect().await?;
        ldap.simple_bind(&self.config().bind_dn, self.config().bind_password())
            .await?
            .success()?;
        Ok(ldap)
    }

    /// Find the single account entry for `username`.
    async fn find_account(&self, username: &Username) -> Result<Account, DirectoryError> {
        if let Some(cache) = &self.inner.accounts
            && let Some(account) = cache.get(username.as_str()).await
        {
            debug!(%username, "account cache hit");
            return Ok(account);
        }

        let filter = render_account_filter(&self.config().account_pattern, username.as_str());
        let attribute = self.config().display_name_attribute.clone();
        let entries = self
            .timed(async {
                let mut ldap = self.search_connection().await?;
                let (entries, _) = ldap
                    .search(
                        &self.config().account_base,
                        ldap_scope(self.config().search_scope),
                        &filter,
                        vec![attribute.as_str()],
                    )
                    .await?
                    .success()?;
                let _ = ldap.unbind().await;
                Ok(entries)
            })
            .await?;

        let count = entries.len();
        let entry = match (count, entries.into_iter().next()) {
            (1, Some(entry)) => SearchEntry::construct(entry),
            (0, _) | (_, None) => return Err(DirectoryError::NoSuchUser(username.to_string())),
            _ => {
                return Err(DirectoryError::AmbiguousUser {
                    username: username.to_string(),
                    count,
                });
            }
        };

        let display_name = entry
            .attrs
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&attribute))
            .and_then(|(_, values)| values.first())
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| username.to_string());

        let account = Account {
            dn: entry.dn,
            display_name,
        };

        if let Some(cache) = &self.inner.accounts {
            cache.insert(username.to_string(), account.clone()).await;
        }
        Ok(account)
    }
}

#[async_trait]
impl DirectoryClient for LdapDirectory {
    #[instrument(skip_all, fields(username = %username))]
    async fn authenticate(
        &self,
        username: &Username,
        password: &str,
    ) -> Result<VerifiedIdentity, DirectoryError> {
        // An empty password would turn the bind into an anonymous one.
        if password.is_empty() {
            return Err(DirectoryError::InvalidCredentials);
        }

        let account = self.find_account(username).await?;

        self.timed(async {
            let mut ldap = self.connect().await?;
            let result = ldap.simple_bind(&account.dn, password).await?;
            let _ = ldap.unbind().await;
            if result.rc == INVALID_CREDENTIALS {
                return Err(DirectoryError::InvalidCredentials);
            }
            result.success()?;
            Ok(())
        })
        .await?;

        debug!(dn = %account.dn, "bind succeeded");
        Ok(VerifiedIdentity::new(username.clone(), account.display_name))
    }

    #[instrument(skip_all, fields(username = %username))]
    async fn group_search(&self, username: &Username) -> Result<Vec<String>, DirectoryError> {
        if let Some(cache) = &self.inner.groups
            && let Some(groups) = cache.get(username.as_str()).await
        {
            debug!("group cache hit");
            return Ok(groups);
        }

        let member = if self.config().group_attribute_is_dn {
            self.find_account(username).await?.dn
        } else {
            username.to_string()
        };
        let filter = render_group_filter(
            &self.config().group_search,
            &self.config().group_attribute,
            &member,
            username.as_str(),
        );

        let groups = self
            .timed(async {
                let mut ldap = self.search_connection().await?;
                let (entries, _) = ldap
                    .search(
                        &self.config().group_search_base,
                        ldap_scope(self.config().search_scope),
                        &filter,
                        vec!["1.1"],
                    )
                    .await?
                    .success()?;
                let _ = ldap.unbind().await;
                Ok(entries
                    .into_iter()
                    .map(|entry| SearchEntry::construct(entry).dn)
                    .collect::<Vec<_>>())
            })
            .await?;

        debug!(groups = groups.len(), "group search finished");
        if let Some(cache) = &self.inner.groups {
            cache.insert(username.to_string(), groups.clone()).await;
        }
        Ok(groups)
    }
}

const fn ldap_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

/// Substitute the escaped username into the account filter.
fn render_account_filter(pattern: &str, username: &str) -> String {
    pattern.replace("{{username}}", &ldap_escape(username))
}

/// Build the group membership filter.
///
/// Templates with `{{dn}}` or `{{username}}` placeholders are substituted;
/// anything else is combined with an equality match on the membership
/// attribute.
fn render_group_filter(template: &str, attribute: &str, member: &str, username: &str) -> String {
    if template.contains("{{dn}}") || template.contains("{{username}}") {
        template
            .replace("{{dn}}", &ldap_escape(member))
            .replace("{{username}}", &ldap_escape(username))
    } else {
        format!("(&{template}({attribute}={}))", ldap_escape(member))
    }
}
