//! `PostgreSQL` implementation of the `SessionStore` trait.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use storyloom_core::error::DomainError;
use storyloom_core::store::SessionStore;

use crate::schema::{CREATE_SESSION_LIBRARY_TABLE, LIBRARY_ROW_ID};

/// PostgreSQL-backed session store. The library lives in a single JSONB row.
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    /// Creates a new `PgSessionStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the library table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the statement fails.
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::raw_sql(CREATE_SESSION_LIBRARY_TABLE)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(())
    }
}

fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self) -> Result<Option<serde_json::Value>, DomainError> {
        let library: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT library FROM session_library WHERE id = $1")
                .bind(LIBRARY_ROW_ID)
                .fetch_optional(&self.pool)
                .await
                .map_err(infrastructure)?;
        debug!(found = library.is_some(), "loaded session library");
        Ok(library)
    }

    async fn save(&self, library: &serde_json::Value) -> Result<(), DomainError> {
        sqlx::query(
            r"
            INSERT INTO session_library (id, library, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (id) DO UPDATE
                SET library = EXCLUDED.library,
                    updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(LIBRARY_ROW_ID)
        .bind(library)
        .execute(&self.pool)
        .await
        .map_err(infrastructure)?;
        Ok(())
    }
}
