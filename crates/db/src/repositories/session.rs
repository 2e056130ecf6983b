use chrono::{DateTime, Utc};
use sqlx::Row;

use storefront_core::domain::account::AccountId;
use storefront_core::domain::session::{Session, SessionId};

use super::account::parse_timestamp;
use super::{RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let account_id: String =
        row.try_get("account_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let expires_at_str: String =
        row.try_get("expires_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Session {
        id: SessionId(id),
        account_id: AccountId(account_id),
        created_at: parse_timestamp(&created_at_str)?,
        expires_at: parse_timestamp(&expires_at_str)?,
    })
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn create(&self, session: Session) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO session (id, account_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.id.0)
        .bind(&session.account_id.0)
        .bind(session.created_at.to_rfc3339())
        .bind(session.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let row =
            sqlx::query("SELECT id, account_id, created_at, expires_at FROM session WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    async fn touch(&self, id: &SessionId, expires_at: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE session SET expires_at = ? WHERE id = ?")
            .bind(expires_at.to_rfc3339())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM session WHERE id = ?").bind(&id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        // Timestamps are RFC 3339 text, so expiry is compared after decoding.
        let rows: Vec<sqlx::sqlite::SqliteRow> =
            sqlx::query("SELECT id, account_id, created_at, expires_at FROM session")
                .fetch_all(&self.pool)
                .await?;

        let mut purged = 0;
        for row in &rows {
            let session = row_to_session(row)?;
            if session.is_expired(now) {
                purged += self.delete(&session.id).await.map(u64::from)?;
            }
        }
        Ok(purged)
    }
}
