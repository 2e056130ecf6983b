use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use storefront_core::config::{AppConfig, ConfigError, LoadOptions};
use storefront_core::login::LoginFlow;
use storefront_db::repositories::{
    InMemoryCatalogRepository, SqlAccountRepository, SqlSessionRepository,
};
use storefront_db::{connect_from_config, migrations, DbPool, RepositoryError, SessionRepository};
use thiserror::Error;
use tracing::{info, warn};

use crate::account::providers::ProviderRegistry;
use crate::account::views::init_templates;
use crate::audit::TracingAuditSink;
use crate::state::{AppState, WebSettings};

const PROVIDER_HTTP_TIMEOUT_SECS: u64 = 10;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("session cleanup failed: {0}")]
    Repository(#[source] RepositoryError),
    #[error("http client could not be built: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let sessions = Arc::new(SqlSessionRepository::new(db_pool.clone()));
    let purged = sessions.purge_expired(Utc::now()).await.map_err(BootstrapError::Repository)?;
    info!(
        event_name = "system.bootstrap.sessions_purged",
        correlation_id = "bootstrap",
        purged,
        "expired sessions removed"
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(PROVIDER_HTTP_TIMEOUT_SECS))
        .build()
        .map_err(BootstrapError::HttpClient)?;

    let providers = ProviderRegistry::from_config(&config.auth, client);
    if providers.is_empty() {
        warn!(
            event_name = "system.bootstrap.no_providers",
            correlation_id = "bootstrap",
            "no external login provider has both client id and secret configured"
        );
    }

    let state = AppState {
        catalog: Arc::new(InMemoryCatalogRepository::default()),
        accounts: Arc::new(SqlAccountRepository::new(db_pool.clone())),
        sessions,
        providers: Arc::new(providers),
        signer: AppState::signer_from_config(&config),
        templates: init_templates(),
        audit: Arc::new(TracingAuditSink),
        login_flow: Arc::new(LoginFlow::default()),
        settings: Arc::new(WebSettings::from_config(&config)),
    };

    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use storefront_core::config::{ConfigOverrides, LoadOptions};
    use storefront_db::CatalogRepository;

    use crate::bootstrap::bootstrap;
    use crate::test_support::TEST_SIGNING_KEY;

    fn options(database_url: &str, signing_key: Option<&str>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                signing_key: signing_key.map(str::to_string),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_signing_key() {
        let result = bootstrap(options("sqlite::memory:", None)).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("auth.signing_key"), "unexpected error: {message}");
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_serves_seed_catalog() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("storefront.db").display());

        let app = bootstrap(options(&url, Some(TEST_SIGNING_KEY))).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('account', 'account_login', 'session')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 3);

        let catalog = app.state.catalog.list().await.expect("catalog");
        assert_eq!(catalog.len(), 5);
        assert!(app.state.providers.is_empty(), "no provider credentials configured");

        app.db_pool.close().await;
    }
}
