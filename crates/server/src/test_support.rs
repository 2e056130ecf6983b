//! Shared fixtures for handler and orchestrator tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use storefront_core::audit::InMemoryAuditSink;
use storefront_core::config::AppConfig;
use storefront_core::domain::account::{Account, AccountId, ExternalIdentity, ExternalLogin};
use storefront_core::domain::session::{Session, SessionId};
use storefront_core::identity::{AuthError, IdentityProvider};
use storefront_core::login::{ExternalLoginTicket, LoginFlow};
use storefront_core::signing::{random_token, TokenSigner};
use storefront_db::repositories::{
    InMemoryAccountRepository, InMemoryCatalogRepository, InMemorySessionRepository,
};

use crate::account::providers::ProviderRegistry;
use crate::account::views::init_templates;
use crate::state::{AppState, WebSettings};

pub const TEST_SIGNING_KEY: &str = "0123456789abcdef0123456789abcdef";

/// Redirects to a fake consent page and accepts only the code `good-code`.
pub struct StubProvider;

#[async_trait]
impl IdentityProvider for StubProvider {
    fn name(&self) -> &str {
        "Google"
    }

    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String, AuthError> {
        Ok(format!("https://provider.test/authorize?state={state}&redirect_uri={redirect_uri}"))
    }

    async fn exchange(&self, code: &str, _redirect_uri: &str) -> Result<ExternalIdentity, AuthError> {
        if code == "good-code" {
            Ok(google_identity())
        } else {
            Err(AuthError::CodeRejected(format!("unknown code `{code}`")))
        }
    }
}

pub fn google_identity() -> ExternalIdentity {
    ExternalIdentity {
        provider: "Google".to_string(),
        provider_key: "google-subject-1".to_string(),
        email: Some("jane@example.com".to_string()),
        display_name: Some("Jane Doe".to_string()),
    }
}

/// A sealed external login ticket issued at `issued_at`.
pub fn ticket_token(state: &AppState, identity: ExternalIdentity, issued_at: DateTime<Utc>) -> String {
    ExternalLoginTicket { identity, provider_display_name: "Google".to_string() }
        .seal(&state.signer, issued_at + state.settings.external_login_ttl)
        .expect("ticket seals")
}

pub struct TestApp {
    pub state: AppState,
    pub audit: InMemoryAuditSink,
}

impl TestApp {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.auth.signing_key = TEST_SIGNING_KEY.to_string().into();
        let audit = InMemoryAuditSink::default();

        let state = AppState {
            catalog: Arc::new(InMemoryCatalogRepository::default()),
            accounts: Arc::new(InMemoryAccountRepository::default()),
            sessions: Arc::new(InMemorySessionRepository::default()),
            providers: Arc::new(ProviderRegistry::default().with_provider(Arc::new(StubProvider))),
            signer: TokenSigner::new(TEST_SIGNING_KEY),
            templates: init_templates(),
            audit: Arc::new(audit.clone()),
            login_flow: Arc::new(LoginFlow::default()),
            settings: Arc::new(WebSettings::from_config(&config)),
        };
        Self { state, audit }
    }

    pub async fn seed_account(&self, email: &str) -> Account {
        let account = Account {
            id: AccountId(format!("ACC-{}", random_token())),
            user_name: email.to_string(),
            email: email.to_string(),
            created_at: Utc::now(),
            lockout_end: None,
        };
        self.state.accounts.create(account.clone()).await.expect("seed account");
        account
    }

    /// An account already linked to [`google_identity`].
    pub async fn seed_linked_account(
        &self,
        email: &str,
        lockout_end: Option<DateTime<Utc>>,
    ) -> Account {
        let account = self.seed_account(email).await;
        self.state
            .accounts
            .add_login(ExternalLogin {
                key: google_identity().login_key(),
                provider_display_name: "Google".to_string(),
                account_id: account.id.clone(),
            })
            .await
            .expect("seed login");
        if lockout_end.is_some() {
            self.state.accounts.set_lockout_end(&account.id, lockout_end).await.expect("lock");
        }
        Account { lockout_end, ..account }
    }

    pub async fn seed_session(&self, account_id: &AccountId, issued_at: DateTime<Utc>) -> Session {
        let session = Session::issue(
            SessionId(random_token()),
            account_id.clone(),
            issued_at,
            self.state.settings.session_lifetime,
        );
        self.state.sessions.create(session.clone()).await.expect("seed session");
        session
    }
}
