use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use storefront_db::{CatalogRepository, DbPool};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    catalog: Arc<dyn CatalogRepository>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

impl HealthCheck {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: "ready", detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: "degraded", detail: detail.into() }
    }

    fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub account_store: HealthCheck,
    pub catalog: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, catalog: Arc<dyn CatalogRepository>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, catalog })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let account_store = account_store_check(&state.db_pool).await;
    let catalog = catalog_check(state.catalog.as_ref()).await;
    let ready = account_store.is_ready() && catalog.is_ready();

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        account_store,
        catalog,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn account_store_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM account").fetch_one(pool).await {
        Ok(accounts) => HealthCheck::ready(format!("{accounts} account(s) registered")),
        Err(error) => HealthCheck::degraded(format!("account store query failed: {error}")),
    }
}

async fn catalog_check(catalog: &dyn CatalogRepository) -> HealthCheck {
    match catalog.list().await {
        Ok(snapshot) if snapshot.is_empty() => HealthCheck::degraded("catalog has no products"),
        Ok(snapshot) => HealthCheck::ready(format!("{} product(s) listed", snapshot.len())),
        Err(error) => HealthCheck::degraded(format!("catalog unavailable: {error}")),
    }
}
