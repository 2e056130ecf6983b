use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use storefront_core::catalog::Catalog;
use storefront_core::domain::account::{Account, AccountId, ExternalLogin, ExternalLoginKey};
use storefront_core::domain::session::{Session, SessionId};

use super::{
    normalize, AccountRepository, CatalogRepository, RepositoryError, SessionRepository,
};

/// Serves one fixed snapshot. Clones share the product list.
pub struct InMemoryCatalogRepository {
    snapshot: Catalog,
}

impl InMemoryCatalogRepository {
    pub fn new(catalog: Catalog) -> Self {
        Self { snapshot: catalog }
    }
}

impl Default for InMemoryCatalogRepository {
    fn default() -> Self {
        Self::new(crate::fixtures::seed_catalog())
    }
}

#[async_trait::async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn list(&self) -> Result<Catalog, RepositoryError> {
        Ok(self.snapshot.clone())
    }
}

#[derive(Default)]
struct AccountTables {
    accounts: HashMap<String, Account>,
    logins: HashMap<ExternalLoginKey, ExternalLogin>,
}

#[derive(Default)]
pub struct InMemoryAccountRepository {
    tables: RwLock<AccountTables>,
}

#[async_trait::async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn create(&self, account: Account) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let email = normalize(&account.email);
        let user_name = normalize(&account.user_name);
        for existing in tables.accounts.values() {
            if normalize(&existing.email) == email {
                return Err(RepositoryError::DuplicateEmail(account.email.clone()));
            }
            if normalize(&existing.user_name) == user_name {
                return Err(RepositoryError::DuplicateUserName(account.user_name.clone()));
            }
        }
        tables.accounts.insert(account.id.0.clone(), account);
        Ok(())
    }

    async fn delete(&self, id: &AccountId) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.accounts.remove(&id.0);
        tables.logins.retain(|_, login| &login.account_id != id);
        Ok(())
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<Account>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.accounts.get(&id.0).cloned())
    }

    async fn find_by_external_login(
        &self,
        key: &ExternalLoginKey,
    ) -> Result<Option<Account>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .logins
            .get(key)
            .and_then(|login| tables.accounts.get(&login.account_id.0))
            .cloned())
    }

    async fn add_login(&self, login: ExternalLogin) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        if !tables.accounts.contains_key(&login.account_id.0) {
            return Err(RepositoryError::AccountNotFound(login.account_id.0.clone()));
        }
        if tables.logins.contains_key(&login.key) {
            return Err(RepositoryError::DuplicateLogin {
                provider: login.key.provider.clone(),
                provider_key: login.key.provider_key.clone(),
            });
        }
        tables.logins.insert(login.key.clone(), login);
        Ok(())
    }

    async fn set_lockout_end(
        &self,
        id: &AccountId,
        lockout_end: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        match tables.accounts.get_mut(&id.0) {
            Some(account) => {
                account.lockout_end = lockout_end;
                Ok(())
            }
            None => Err(RepositoryError::AccountNotFound(id.0.clone())),
        }
    }
}

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create(&self, session: Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.0.clone(), session);
        Ok(())
    }

    async fn find(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id.0).cloned())
    }

    async fn touch(&self, id: &SessionId, expires_at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&id.0) {
            session.expires_at = expires_at;
        }
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(&id.0).is_some())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now));
        Ok((before - sessions.len()) as u64)
    }
}
