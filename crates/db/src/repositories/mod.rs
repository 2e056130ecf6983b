use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use storefront_core::catalog::{Catalog, CatalogQuery, CatalogSearchView};
use storefront_core::domain::account::{Account, AccountId, ExternalLogin, ExternalLoginKey};
use storefront_core::domain::session::{Session, SessionId};

pub mod account;
pub mod memory;
pub mod session;

pub use account::SqlAccountRepository;
pub use memory::{InMemoryAccountRepository, InMemoryCatalogRepository, InMemorySessionRepository};
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("email `{0}` is already taken")]
    DuplicateEmail(String),
    #[error("user name `{0}` is already taken")]
    DuplicateUserName(String),
    #[error("login {provider}/{provider_key} is already linked to an account")]
    DuplicateLogin { provider: String, provider_key: String },
    #[error("account `{0}` was not found")]
    AccountNotFound(String),
}

impl RepositoryError {
    /// Message shown beside the confirmation form for user-correctable conflicts. `None` means
    /// the failure is an outage.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::DuplicateEmail(email) => Some(format!("Email '{email}' is already taken.")),
            Self::DuplicateUserName(user_name) => {
                Some(format!("User name '{user_name}' is already taken."))
            }
            Self::DuplicateLogin { .. } => Some("A user with this login already exists.".to_string()),
            _ => None,
        }
    }
}

/// Read access to the immutable product catalog snapshot.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list(&self) -> Result<Catalog, RepositoryError>;

    async fn query(&self, query: &CatalogQuery) -> Result<CatalogSearchView, RepositoryError> {
        Ok(self.list().await?.search(query))
    }
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Inserts a new account. Email and user name are unique case-insensitively.
    async fn create(&self, account: Account) -> Result<(), RepositoryError>;
    async fn delete(&self, id: &AccountId) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, RepositoryError>;
    async fn find_by_external_login(
        &self,
        key: &ExternalLoginKey,
    ) -> Result<Option<Account>, RepositoryError>;
    async fn add_login(&self, login: ExternalLogin) -> Result<(), RepositoryError>;
    async fn set_lockout_end(
        &self,
        id: &AccountId,
        lockout_end: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: Session) -> Result<(), RepositoryError>;
    async fn find(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError>;
    /// Moves the expiry of a live session forward.
    async fn touch(&self, id: &SessionId, expires_at: DateTime<Utc>) -> Result<(), RepositoryError>;
    /// Returns whether a session was removed.
    async fn delete(&self, id: &SessionId) -> Result<bool, RepositoryError>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

pub(crate) fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}
