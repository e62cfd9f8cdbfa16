//! Author record access.
//!
//! The editor keeps its authors in a flat key/value table (`store`):
//!
//! - `token2author:<token>` holds the author id as a JSON string
//! - `globalAuthor:<id>` holds the author record as a JSON object
//!
//! The gateway never creates authors; it only resolves a token and updates
//! the `name` field of an existing record.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::instrument;

use padgate_core::{AuthorId, AuthorToken};

use super::RepositoryError;

/// Outbound interface to the editor's author records.
#[async_trait]
pub trait AuthorStore: Send + Sync {
    /// Resolve the author bound to a one-time token.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the token is unknown.
    async fn resolve_author_by_token(&self, token: &AuthorToken)
    -> Result<AuthorId, RepositoryError>;

    /// Overwrite the author's display name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the author record is missing.
    async fn set_author_display_name(
        &self,
        author: &AuthorId,
        name: &str,
    ) -> Result<(), RepositoryError>;
}

fn token_key(token: &AuthorToken) -> String {
    format!("token2author:{token}")
}

fn author_key(author: &AuthorId) -> String {
    format!("globalAuthor:{author}")
}

/// `PostgreSQL` implementation over the editor's `store` table.
#[derive(Clone)]
pub struct PgAuthorStore {
    pool: PgPool,
}

impl PgAuthorStore {
    /// Create a new author store.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuthorStore for PgAuthorStore {
    #[instrument(skip(self))]
    async fn resolve_author_by_token(
        &self,
        token: &AuthorToken,
    ) -> Result<AuthorId, RepositoryError> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM store WHERE key = $1")
            .bind(token_key(token))
            .fetch_optional(&self.pool)
            .await?;

        let raw = value.ok_or(RepositoryError::NotFound)?;
        let author: String = serde_json::from_str(&raw).map_err(|e| {
            RepositoryError::DataCorruption(format!("token2author value is not a JSON string: {e}"))
        })?;

        Ok(AuthorId::new(author))
    }

    #[instrument(skip(self))]
    async fn set_author_display_name(
        &self,
        author: &AuthorId,
        name: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE store
            SET value = jsonb_set(value::jsonb, '{name}', to_jsonb($2::text))::text
            WHERE key = $1
            ",
        )
        .bind(author_key(author))
        .bind(name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_keys() {
        assert_eq!(
            token_key(&AuthorToken::new("t.0123abc")),
            "token2author:t.0123abc"
        );
        assert_eq!(
            author_key(&AuthorId::new("a.XyZ")),
            "globalAuthor:a.XyZ"
        );
    }
}
