use chrono::{DateTime, Utc};
use sqlx::Row;

use storefront_core::domain::account::{Account, AccountId, ExternalLogin, ExternalLoginKey};

use super::{normalize, AccountRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAccountRepository {
    pool: DbPool,
}

impl SqlAccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{value}`: {e}")))
}

fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_name: String =
        row.try_get("user_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: String = row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let lockout_end_str: Option<String> =
        row.try_get("lockout_end").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Account {
        id: AccountId(id),
        user_name,
        email,
        created_at: parse_timestamp(&created_at_str)?,
        lockout_end: lockout_end_str.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn unique_violation_on(error: &sqlx::Error, column: &str) -> bool {
    match error {
        sqlx::Error::Database(db_error) => {
            db_error.is_unique_violation() && db_error.message().contains(column)
        }
        _ => false,
    }
}

#[async_trait::async_trait]
impl AccountRepository for SqlAccountRepository {
    async fn create(&self, account: Account) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO account (id, user_name, normalized_user_name, email, normalized_email,
                                  lockout_end, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&account.id.0)
        .bind(&account.user_name)
        .bind(normalize(&account.user_name))
        .bind(&account.email)
        .bind(normalize(&account.email))
        .bind(account.lockout_end.map(|dt| dt.to_rfc3339()))
        .bind(account.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if unique_violation_on(&error, "account.normalized_email") => {
                Err(RepositoryError::DuplicateEmail(account.email))
            }
            Err(error) if unique_violation_on(&error, "account.normalized_user_name") => {
                Err(RepositoryError::DuplicateUserName(account.user_name))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn delete(&self, id: &AccountId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM account WHERE id = ?").bind(&id.0).execute(&self.pool).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_name, email, lockout_end, created_at FROM account WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn find_by_external_login(
        &self,
        key: &ExternalLoginKey,
    ) -> Result<Option<Account>, RepositoryError> {
        let row = sqlx::query(
            "SELECT a.id, a.user_name, a.email, a.lockout_end, a.created_at
             FROM account_login l
             JOIN account a ON a.id = l.account_id
             WHERE l.provider = ? AND l.provider_key = ?",
        )
        .bind(&key.provider)
        .bind(&key.provider_key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn add_login(&self, login: ExternalLogin) -> Result<(), RepositoryError> {
        let exists = sqlx::query("SELECT 1 FROM account WHERE id = ?")
            .bind(&login.account_id.0)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(RepositoryError::AccountNotFound(login.account_id.0));
        }

        let result = sqlx::query(
            "INSERT INTO account_login (provider, provider_key, provider_display_name, account_id,
                                        created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&login.key.provider)
        .bind(&login.key.provider_key)
        .bind(&login.provider_display_name)
        .bind(&login.account_id.0)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if unique_violation_on(&error, "account_login") => {
                Err(RepositoryError::DuplicateLogin {
                    provider: login.key.provider,
                    provider_key: login.key.provider_key,
                })
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn set_lockout_end(
        &self,
        id: &AccountId,
        lockout_end: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE account SET lockout_end = ? WHERE id = ?")
            .bind(lockout_end.map(|dt| dt.to_rfc3339()))
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::AccountNotFound(id.0.clone()));
        }
        Ok(())
    }
}
