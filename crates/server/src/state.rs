use std::path::PathBuf;
use std::sync::Arc;

use chrono::Duration;
use secrecy::ExposeSecret;
use storefront_core::audit::AuditSink;
use storefront_core::config::AppConfig;
use storefront_core::login::{ExternalLoginFlow, LoginFlow};
use storefront_core::signing::TokenSigner;
use storefront_db::{AccountRepository, CatalogRepository, SessionRepository};
use tera::Tera;

use crate::account::providers::ProviderRegistry;

/// Per-process settings the handlers read on every request.
#[derive(Clone, Debug)]
pub struct WebSettings {
    pub base_url: String,
    pub session_cookie_name: String,
    pub session_lifetime: Duration,
    pub sliding_expiration: bool,
    pub secure_cookies: bool,
    pub correlation_ttl: Duration,
    pub external_login_ttl: Duration,
    pub static_dir: PathBuf,
}

impl WebSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.server.base_url(),
            session_cookie_name: config.session.cookie_name.clone(),
            session_lifetime: Duration::days(i64::from(config.session.expire_days)),
            sliding_expiration: config.session.sliding_expiration,
            secure_cookies: config.session.secure_cookies,
            correlation_ttl: Duration::seconds(config.auth.correlation_ttl_secs as i64),
            external_login_ttl: Duration::seconds(config.auth.external_login_ttl_secs as i64),
            static_dir: config.server.static_dir.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub providers: Arc<ProviderRegistry>,
    pub signer: TokenSigner,
    pub templates: Arc<Tera>,
    pub audit: Arc<dyn AuditSink>,
    pub login_flow: Arc<LoginFlow<ExternalLoginFlow>>,
    pub settings: Arc<WebSettings>,
}

impl AppState {
    pub fn signer_from_config(config: &AppConfig) -> TokenSigner {
        TokenSigner::new(config.auth.signing_key.expose_secret().as_bytes())
    }
}
