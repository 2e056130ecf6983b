use axum::{extract::State, http::HeaderMap, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tower_cookies::{CookieManagerLayer, Cookies};
use tower_http::services::ServeDir;

use crate::account::{self, cookies, orchestrator::LoginOrchestrator};
use crate::catalog;
use crate::error::{correlation_id, WebError};
use crate::state::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub signed_in: bool,
    pub user_name: Option<String>,
    pub expires_at: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let images = ServeDir::new(state.settings.static_dir.join("images"));
    Router::new()
        .route("/", get(landing))
        .merge(catalog::routes())
        .merge(account::routes())
        .nest_service("/images", images)
        .layer(CookieManagerLayer::new())
        .with_state(state)
}

/// Default landing route: who, if anyone, is signed in.
async fn landing(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
) -> Result<Json<SessionSummary>, WebError> {
    let correlation_id = correlation_id(&headers);
    let session_id = cookies::session_id(&cookies, &state.settings);

    let orchestrator = LoginOrchestrator::new(&state, &correlation_id, Utc::now());
    let current = orchestrator
        .current_session(session_id.as_deref())
        .await
        .map_err(|error| error.into_web(&correlation_id))?;

    let summary = match current {
        Some((session, account)) => SessionSummary {
            signed_in: true,
            user_name: Some(account.user_name),
            expires_at: Some(session.expires_at.to_rfc3339()),
        },
        None => {
            if session_id.is_some() {
                cookies::clear_session(&cookies, &state.settings);
            }
            SessionSummary { signed_in: false, user_name: None, expires_at: None }
        }
    };
    Ok(Json(summary))
}
