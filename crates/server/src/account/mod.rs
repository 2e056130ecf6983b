//! Account routes: login entry, external login round trip, confirmation, and logout.

pub mod antiforgery;
pub mod cookies;
pub mod orchestrator;
pub mod providers;
pub mod views;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, Uri},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tower_cookies::Cookies;
use tracing::info;

use self::cookies::{CORRELATION_COOKIE, EXTERNAL_LOGIN_COOKIE};
use self::orchestrator::{LoginOrchestrator, LoginOutcome, ProviderRedirect, LOGIN_ROUTE};
use self::providers::ProviderKind;
use self::views::{LoginPage, ProviderButton, CONFIRMATION_TEMPLATE, LOGIN_TEMPLATE};
use crate::error::{correlation_id, WebError};
use crate::state::AppState;

const SIGNIN_PREFIX: &str = "/signin-";

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    #[serde(rename = "returnUrl")]
    pub return_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExternalLoginForm {
    pub provider: String,
    #[serde(rename = "returnUrl")]
    pub return_url: Option<String>,
    #[serde(rename = "__RequestVerificationToken")]
    pub request_verification_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(rename = "returnUrl")]
    pub return_url: Option<String>,
    #[serde(rename = "remoteError")]
    pub remote_error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmationForm {
    #[serde(default)]
    pub email: String,
    #[serde(rename = "returnUrl")]
    pub return_url: Option<String>,
    #[serde(rename = "__RequestVerificationToken")]
    pub request_verification_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogoutForm {
    #[serde(rename = "__RequestVerificationToken")]
    pub request_verification_token: Option<String>,
}

pub fn routes() -> Router<AppState> {
    let mut router = Router::new()
        .route(LOGIN_ROUTE, get(login))
        .route("/account/external-login", post(external_login))
        .route(orchestrator::CALLBACK_ROUTE, get(external_login_callback))
        .route("/account/external-login-confirmation", post(external_login_confirmation))
        .route("/account/logout", post(logout));

    for kind in [ProviderKind::Google, ProviderKind::Facebook] {
        let path = format!("{SIGNIN_PREFIX}{}", kind.as_str().to_ascii_lowercase());
        router = router.route(&path, get(provider_redirect));
    }
    router
}

async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> Result<Response, WebError> {
    let correlation_id = correlation_id(&headers);
    let status_message =
        cookies::take_status_message(&cookies, &state.settings, &state.signer, Utc::now());
    let antiforgery_token =
        antiforgery::form_token(&cookies, &state.settings, &state.signer, &correlation_id)?;
    let providers = state
        .providers
        .iter()
        .map(|provider| ProviderButton {
            name: provider.name().to_string(),
            display_name: provider.display_name().to_string(),
        })
        .collect();

    let page = LoginPage {
        return_url: query.return_url.unwrap_or_default(),
        status_message,
        providers,
        antiforgery_token,
    };
    Ok(views::render(&state.templates, LOGIN_TEMPLATE, &page, &correlation_id)?.into_response())
}

async fn external_login(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Form(form): Form<ExternalLoginForm>,
) -> Result<Response, WebError> {
    let correlation_id = correlation_id(&headers);
    antiforgery::verify(
        &cookies,
        &state.signer,
        form.request_verification_token.as_deref(),
        &correlation_id,
    )?;

    let orchestrator = LoginOrchestrator::new(&state, &correlation_id, Utc::now());
    let challenge = orchestrator
        .challenge(&form.provider, form.return_url.as_deref())
        .map_err(|error| error.into_web(&correlation_id))?;

    cookies::set(&cookies, &state.settings, CORRELATION_COOKIE, challenge.correlation_token);
    Ok(Redirect::to(&challenge.location).into_response())
}

async fn provider_redirect(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    uri: Uri,
    Query(query): Query<ProviderRedirect>,
) -> Result<Response, WebError> {
    let correlation_id = correlation_id(&headers);
    let provider = uri.path().trim_start_matches(SIGNIN_PREFIX);
    let correlation_token = cookies::read(&cookies, CORRELATION_COOKIE);
    cookies::clear(&cookies, &state.settings, CORRELATION_COOKIE);

    let orchestrator = LoginOrchestrator::new(&state, &correlation_id, Utc::now());
    let returned = orchestrator
        .provider_return(provider, query, correlation_token.as_deref())
        .await
        .map_err(|error| error.into_web(&correlation_id))?;

    match returned.ticket {
        Some(ticket) => cookies::set(&cookies, &state.settings, EXTERNAL_LOGIN_COOKIE, ticket),
        None => cookies::clear(&cookies, &state.settings, EXTERNAL_LOGIN_COOKIE),
    }
    Ok(Redirect::to(&returned.redirect).into_response())
}

async fn external_login_callback(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, WebError> {
    let correlation_id = correlation_id(&headers);
    let ticket = cookies::read(&cookies, EXTERNAL_LOGIN_COOKIE);

    let orchestrator = LoginOrchestrator::new(&state, &correlation_id, Utc::now());
    let outcome = orchestrator
        .callback(query.return_url.as_deref(), query.remote_error.as_deref(), ticket.as_deref())
        .await
        .map_err(|error| error.into_web(&correlation_id))?;

    respond(&state, &cookies, outcome, &correlation_id)
}

async fn external_login_confirmation(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Form(form): Form<ConfirmationForm>,
) -> Result<Response, WebError> {
    let correlation_id = correlation_id(&headers);
    antiforgery::verify(
        &cookies,
        &state.signer,
        form.request_verification_token.as_deref(),
        &correlation_id,
    )?;
    let ticket = cookies::read(&cookies, EXTERNAL_LOGIN_COOKIE);

    let orchestrator = LoginOrchestrator::new(&state, &correlation_id, Utc::now());
    let outcome = orchestrator
        .confirm(&form.email, form.return_url.as_deref(), ticket.as_deref())
        .await
        .map_err(|error| error.into_web(&correlation_id))?;

    respond(&state, &cookies, outcome, &correlation_id)
}

async fn logout(
    State(state): State<AppState>,
    cookies: Cookies,
    headers: HeaderMap,
    Form(form): Form<LogoutForm>,
) -> Result<Response, WebError> {
    let correlation_id = correlation_id(&headers);
    antiforgery::verify(
        &cookies,
        &state.signer,
        form.request_verification_token.as_deref(),
        &correlation_id,
    )?;
    let session_id = cookies::session_id(&cookies, &state.settings);

    let orchestrator = LoginOrchestrator::new(&state, &correlation_id, Utc::now());
    let landing = orchestrator
        .sign_out(session_id.as_deref())
        .await
        .map_err(|error| error.into_web(&correlation_id))?;

    cookies::clear_session(&cookies, &state.settings);
    Ok(Redirect::to(&landing).into_response())
}

fn respond(
    state: &AppState,
    cookies: &Cookies,
    outcome: LoginOutcome,
    correlation_id: &str,
) -> Result<Response, WebError> {
    match outcome {
        LoginOutcome::SignedIn { session, redirect } => {
            cookies::clear(cookies, &state.settings, EXTERNAL_LOGIN_COOKIE);
            cookies::set_session(cookies, &state.settings, &session.id.0);
            info!(
                event_name = "login.signed_in",
                correlation_id = %correlation_id,
                account_id = %session.account_id.0,
                "external login completed"
            );
            Ok(Redirect::to(&redirect).into_response())
        }
        LoginOutcome::Rejected { message } => {
            cookies::clear(cookies, &state.settings, EXTERNAL_LOGIN_COOKIE);
            let now = Utc::now();
            cookies::set_status_message(cookies, &state.settings, &state.signer, &message, now);
            Ok(Redirect::to(LOGIN_ROUTE).into_response())
        }
        LoginOutcome::Confirm(mut page) => {
            page.antiforgery_token =
                antiforgery::form_token(cookies, &state.settings, &state.signer, correlation_id)?;
            Ok(views::render(&state.templates, CONFIRMATION_TEMPLATE, &page, correlation_id)?
                .into_response())
        }
    }
}
