//! Drives one browser through the external login round trip.
//!
//! Every step applies a transition of [`ExternalLoginFlow`] before it touches the stores, so the
//! audit trail records each hop even when the request ends in a rejection.
//!
//! [`ExternalLoginFlow`]: storefront_core::login::ExternalLoginFlow

use chrono::{DateTime, Utc};
use reqwest::Url;
use storefront_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use storefront_core::domain::account::{Account, AccountId, ExternalLogin, NewAccount};
use storefront_core::domain::session::{Session, SessionId};
use storefront_core::errors::{ApplicationError, DomainError};
use storefront_core::identity::AuthError;
use storefront_core::login::{
    CorrelationState, ExternalLoginTicket, LoginContext, LoginEvent, LoginState,
    LoginTransitionError,
};
use storefront_core::redirect::{safe_redirect_target, DEFAULT_LANDING_ROUTE};
use storefront_core::signing::{random_token, TokenError};
use storefront_db::RepositoryError;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::providers::callback_uri;
use super::views::ConfirmationPage;
use crate::error::WebError;
use crate::state::AppState;

pub const LOGIN_ROUTE: &str = "/account/login";
pub const CALLBACK_ROUTE: &str = "/account/external-login-callback";

pub const LOGIN_INFO_UNAVAILABLE: &str =
    "Error loading external login information. Please try again.";
pub const LOGIN_INFO_UNAVAILABLE_DURING_CONFIRMATION: &str =
    "Error loading external login information during confirmation.";
pub const ACCOUNT_LOCKED: &str = "Your account has been locked. Please contact support.";

const MAX_SHOWN_REMOTE_ERROR_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("unknown login provider `{0}`")]
    UnknownProvider(String),
    #[error(transparent)]
    Transition(#[from] LoginTransitionError),
    #[error("login token could not be issued: {0}")]
    Token(#[from] TokenError),
    #[error(transparent)]
    Provider(#[from] AuthError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl LoginError {
    pub fn into_web(self, correlation_id: &str) -> WebError {
        match self {
            Self::UnknownProvider(provider) => {
                WebError::UnknownProvider { provider, correlation_id: correlation_id.to_string() }
            }
            Self::Transition(error) => WebError::application(
                ApplicationError::Domain(DomainError::LoginTransition(error)),
                correlation_id,
            ),
            Self::Token(error) => WebError::application(
                ApplicationError::Configuration(error.to_string()),
                correlation_id,
            ),
            Self::Provider(error) => WebError::application(
                ApplicationError::Integration(error.to_string()),
                correlation_id,
            ),
            Self::Repository(error) => WebError::repository(error, correlation_id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    pub location: String,
    pub correlation_token: String,
}

/// Query the provider appends when it redirects back to `/signin-{provider}`.
#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct ProviderRedirect {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderReturn {
    pub redirect: String,
    pub ticket: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    SignedIn { session: Session, redirect: String },
    Rejected { message: String },
    Confirm(ConfirmationPage),
}

pub struct LoginOrchestrator<'a> {
    state: &'a AppState,
    correlation_id: &'a str,
    now: DateTime<Utc>,
}

impl<'a> LoginOrchestrator<'a> {
    pub fn new(state: &'a AppState, correlation_id: &'a str, now: DateTime<Utc>) -> Self {
        Self { state, correlation_id, now }
    }

    fn transition(
        &self,
        from: LoginState,
        event: LoginEvent,
        context: &LoginContext,
        account_id: Option<&AccountId>,
    ) -> Result<LoginState, LoginError> {
        let audit = AuditContext::new(account_id.cloned(), self.correlation_id, "web");
        let outcome = self.state.login_flow.apply_with_audit(
            &from,
            &event,
            context,
            self.state.audit.as_ref(),
            &audit,
        )?;
        debug!(
            event_name = "login.transition",
            correlation_id = %self.correlation_id,
            from = ?outcome.from,
            to = ?outcome.to,
            event = ?outcome.event,
            "login state advanced"
        );
        Ok(outcome.to)
    }

    /// Starts the round trip: signs the correlation state and points the browser at the provider.
    pub fn challenge(
        &self,
        provider: &str,
        return_url: Option<&str>,
    ) -> Result<Challenge, LoginError> {
        let provider = self
            .state
            .providers
            .get(provider)
            .ok_or_else(|| LoginError::UnknownProvider(provider.trim().to_string()))?;
        self.transition(
            LoginState::AnonymousBrowsing,
            LoginEvent::ChallengeRequested,
            &LoginContext::for_provider(provider.name()),
            None,
        )?;

        let nonce = random_token();
        let correlation = CorrelationState {
            provider: provider.name().to_string(),
            nonce: nonce.clone(),
            return_url: non_blank(return_url).map(str::to_string),
        };
        let correlation_token = correlation
            .seal(&self.state.signer, self.now + self.state.settings.correlation_ttl)?;
        let redirect_uri = callback_uri(&self.state.settings.base_url, provider.name());
        let location = provider.authorization_url(&redirect_uri, &nonce)?;

        info!(
            event_name = "login.challenge.issued",
            correlation_id = %self.correlation_id,
            provider = provider.name(),
            "external login challenge issued"
        );
        Ok(Challenge { location, correlation_token })
    }

    /// Validates the provider's redirect against the correlation cookie and redeems the code.
    ///
    /// Always lands on the callback route; a missing ticket there means the login info was lost.
    pub async fn provider_return(
        &self,
        provider_path: &str,
        query: ProviderRedirect,
        correlation_token: Option<&str>,
    ) -> Result<ProviderReturn, LoginError> {
        let provider = self
            .state
            .providers
            .get(provider_path)
            .ok_or_else(|| LoginError::UnknownProvider(provider_path.trim().to_string()))?;

        let correlation = correlation_token.and_then(|token| {
            CorrelationState::open(&self.state.signer, token, self.now)
                .map_err(|error| {
                    warn!(
                        event_name = "login.correlation.invalid",
                        correlation_id = %self.correlation_id,
                        provider = provider.name(),
                        error = %error,
                        "correlation cookie could not be opened"
                    );
                })
                .ok()
        });
        let echoed_state = query.state.as_deref().unwrap_or_default();
        let correlation = match correlation {
            Some(correlation) if correlation.matches(provider.name(), echoed_state) => correlation,
            _ => {
                warn!(
                    event_name = "login.correlation.failed",
                    correlation_id = %self.correlation_id,
                    provider = provider.name(),
                    "provider redirect did not match an issued challenge"
                );
                return Ok(ProviderReturn { redirect: callback_location(None, None), ticket: None });
            }
        };
        let return_url = correlation.return_url.as_deref();

        if let Some(remote_error) = non_blank(query.error.as_deref()) {
            warn!(
                event_name = "login.provider.remote_error",
                correlation_id = %self.correlation_id,
                provider = provider.name(),
                remote_error = %remote_error,
                description = ?query.error_description,
                "provider reported an error"
            );
            return Ok(ProviderReturn {
                redirect: callback_location(return_url, Some(remote_error)),
                ticket: None,
            });
        }

        let Some(code) = non_blank(query.code.as_deref()) else {
            warn!(
                event_name = "login.provider.code_missing",
                correlation_id = %self.correlation_id,
                provider = provider.name(),
                "provider redirect carried no authorization code"
            );
            return Ok(ProviderReturn { redirect: callback_location(return_url, None), ticket: None });
        };

        let redirect_uri = callback_uri(&self.state.settings.base_url, provider.name());
        let ticket = match provider.exchange(code, &redirect_uri).await {
            Ok(identity) => {
                let ticket = ExternalLoginTicket {
                    identity,
                    provider_display_name: provider.display_name().to_string(),
                };
                Some(ticket.seal(
                    &self.state.signer,
                    self.now + self.state.settings.external_login_ttl,
                )?)
            }
            Err(error) => {
                error!(
                    event_name = "login.provider.exchange_failed",
                    correlation_id = %self.correlation_id,
                    provider = provider.name(),
                    error = %error,
                    "authorization code exchange failed"
                );
                None
            }
        };

        Ok(ProviderReturn { redirect: callback_location(return_url, None), ticket })
    }

    pub async fn callback(
        &self,
        return_url: Option<&str>,
        remote_error: Option<&str>,
        ticket_token: Option<&str>,
    ) -> Result<LoginOutcome, LoginError> {
        let none = LoginContext::default();

        if let Some(remote_error) = non_blank(remote_error) {
            warn!(
                event_name = "login.callback.remote_error",
                correlation_id = %self.correlation_id,
                remote_error = %remote_error,
                "external login rejected by provider"
            );
            self.transition(
                LoginState::ChallengeIssued,
                LoginEvent::RemoteErrorReported,
                &none,
                None,
            )?;
            return Ok(LoginOutcome::Rejected { message: remote_error_message(remote_error) });
        }

        let Some(ticket) = self.open_ticket(ticket_token) else {
            self.transition(
                LoginState::ChallengeIssued,
                LoginEvent::LoginInfoUnavailable,
                &none,
                None,
            )?;
            return Ok(LoginOutcome::Rejected { message: LOGIN_INFO_UNAVAILABLE.to_string() });
        };

        let context = LoginContext::for_provider(ticket.identity.provider.clone());
        let received = self.transition(
            LoginState::ChallengeIssued,
            LoginEvent::CallbackArrived,
            &context,
            None,
        )?;

        match self.state.accounts.find_by_external_login(&ticket.identity.login_key()).await? {
            Some(account) if account.is_locked_out(self.now) => {
                self.transition(received, LoginEvent::AccountLockedOut, &context, Some(&account.id))?;
                warn!(
                    event_name = "login.callback.locked_out",
                    correlation_id = %self.correlation_id,
                    account_id = %account.id.0,
                    provider = %ticket.identity.provider,
                    "locked account attempted external login"
                );
                Ok(LoginOutcome::Rejected { message: ACCOUNT_LOCKED.to_string() })
            }
            Some(account) => {
                self.transition(
                    received,
                    LoginEvent::ExistingLoginSignedIn,
                    &context,
                    Some(&account.id),
                )?;
                let session = self.start_session(&account).await?;
                Ok(LoginOutcome::SignedIn { session, redirect: self.redirect_target(return_url) })
            }
            None => {
                self.transition(received, LoginEvent::NoLinkedAccount, &context, None)?;
                Ok(LoginOutcome::Confirm(ConfirmationPage {
                    email: ticket.identity.email.clone().unwrap_or_default(),
                    provider_display_name: ticket.provider_display_name,
                    return_url: return_url.unwrap_or_default().to_string(),
                    ..ConfirmationPage::default()
                }))
            }
        }
    }

    /// Creates the local account, links the external login, then signs in.
    pub async fn confirm(
        &self,
        email: &str,
        return_url: Option<&str>,
        ticket_token: Option<&str>,
    ) -> Result<LoginOutcome, LoginError> {
        let ticket = self.open_ticket(ticket_token);
        let provider = ticket.as_ref().map(|ticket| ticket.identity.provider.clone());
        let page = |errors: Vec<String>| ConfirmationPage {
            email: email.to_string(),
            provider_display_name: ticket
                .as_ref()
                .map(|ticket| ticket.provider_display_name.clone())
                .unwrap_or_default(),
            return_url: return_url.unwrap_or_default().to_string(),
            errors,
            antiforgery_token: String::new(),
        };

        let new_account = NewAccount { email: email.trim().to_string() };
        let errors = new_account.validation_errors();
        if !errors.is_empty() {
            let context = LoginContext { provider: provider.clone(), validation_errors: errors };
            self.transition(
                LoginState::NeedsAccountCreation,
                LoginEvent::AccountRejected,
                &context,
                None,
            )?;
            return Ok(LoginOutcome::Confirm(page(context.validation_errors)));
        }

        let Some(ticket) = ticket.as_ref() else {
            self.transition(
                LoginState::NeedsAccountCreation,
                LoginEvent::LoginInfoUnavailable,
                &LoginContext::default(),
                None,
            )?;
            return Ok(LoginOutcome::Rejected {
                message: LOGIN_INFO_UNAVAILABLE_DURING_CONFIRMATION.to_string(),
            });
        };
        let context = LoginContext::for_provider(ticket.identity.provider.clone());

        let account = Account {
            id: AccountId(Uuid::new_v4().to_string()),
            user_name: new_account.user_name().to_string(),
            email: new_account.email.clone(),
            created_at: self.now,
            lockout_end: None,
        };
        if let Err(error) = self.state.accounts.create(account.clone()).await {
            return self.reject_confirmation(LoginState::NeedsAccountCreation, error, &context, page);
        }

        let linking = self.transition(
            LoginState::NeedsAccountCreation,
            LoginEvent::AccountCreated,
            &context,
            Some(&account.id),
        )?;
        let login = ExternalLogin {
            key: ticket.identity.login_key(),
            provider_display_name: ticket.provider_display_name.clone(),
            account_id: account.id.clone(),
        };
        if let Err(error) = self.state.accounts.add_login(login).await {
            self.discard_account(&account.id).await;
            return self.reject_confirmation(linking, error, &context, page);
        }

        self.transition(linking, LoginEvent::LoginLinked, &context, Some(&account.id))?;
        info!(
            event_name = "login.account.created",
            correlation_id = %self.correlation_id,
            account_id = %account.id.0,
            provider = %ticket.identity.provider,
            "account created from external login"
        );
        let session = self.start_session(&account).await?;
        Ok(LoginOutcome::SignedIn { session, redirect: self.redirect_target(return_url) })
    }

    fn reject_confirmation(
        &self,
        from: LoginState,
        error: RepositoryError,
        context: &LoginContext,
        page: impl Fn(Vec<String>) -> ConfirmationPage,
    ) -> Result<LoginOutcome, LoginError> {
        let Some(message) = error.user_message() else {
            return Err(error.into());
        };
        let event = match from {
            LoginState::NeedsAccountLink => LoginEvent::LinkRejected,
            _ => LoginEvent::AccountRejected,
        };
        let context = LoginContext {
            provider: context.provider.clone(),
            validation_errors: vec![message.clone()],
        };
        self.transition(from, event, &context, None)?;
        Ok(LoginOutcome::Confirm(page(vec![message])))
    }

    /// Removes an account whose login could not be linked so the email can be reused.
    async fn discard_account(&self, id: &AccountId) {
        if let Err(error) = self.state.accounts.delete(id).await {
            error!(
                event_name = "login.account.discard_failed",
                correlation_id = %self.correlation_id,
                account_id = %id.0,
                error = %error,
                "unlinked account could not be removed"
            );
        }
    }

    /// Destroys the local session, if any. Safe to repeat.
    pub async fn sign_out(&self, session_id: Option<&str>) -> Result<String, LoginError> {
        let mut from = LoginState::AnonymousBrowsing;
        let mut account_id = None;
        if let Some(id) = session_id {
            let id = SessionId(id.to_string());
            account_id = self.state.sessions.find(&id).await?.map(|session| session.account_id);
            if self.state.sessions.delete(&id).await? {
                from = LoginState::SignedIn;
                if let Some(account_id) = &account_id {
                    self.record_session("session.revoked", account_id, AuditOutcome::Success);
                }
            }
        }
        self.transition(
            from,
            LoginEvent::SignOutRequested,
            &LoginContext::default(),
            account_id.as_ref(),
        )?;
        Ok(DEFAULT_LANDING_ROUTE.to_string())
    }

    /// Resolves the signed-in account, renewing a sliding session past half its lifetime.
    pub async fn current_session(
        &self,
        session_id: Option<&str>,
    ) -> Result<Option<(Session, Account)>, LoginError> {
        let Some(id) = non_blank(session_id) else {
            return Ok(None);
        };
        let id = SessionId(id.to_string());
        let Some(mut session) = self.state.sessions.find(&id).await? else {
            return Ok(None);
        };
        if session.is_expired(self.now) {
            self.state.sessions.delete(&id).await?;
            self.record_session("session.expired", &session.account_id, AuditOutcome::Rejected);
            return Ok(None);
        }
        let Some(account) = self.state.accounts.find_by_id(&session.account_id).await? else {
            self.state.sessions.delete(&id).await?;
            return Ok(None);
        };

        let lifetime = self.state.settings.session_lifetime;
        if self.state.settings.sliding_expiration && session.needs_renewal(self.now, lifetime) {
            let expires_at = self.now + lifetime;
            self.state.sessions.touch(&id, expires_at).await?;
            session.expires_at = expires_at;
            self.record_session("session.renewed", &account.id, AuditOutcome::Success);
        }
        Ok(Some((session, account)))
    }

    async fn start_session(&self, account: &Account) -> Result<Session, LoginError> {
        let session = Session::issue(
            SessionId(random_token()),
            account.id.clone(),
            self.now,
            self.state.settings.session_lifetime,
        );
        self.state.sessions.create(session.clone()).await?;
        self.record_session("session.issued", &account.id, AuditOutcome::Success);
        Ok(session)
    }

    fn record_session(&self, event_type: &str, account_id: &AccountId, outcome: AuditOutcome) {
        let context = AuditContext::new(Some(account_id.clone()), self.correlation_id, "web");
        self.state.audit.emit(context.event(event_type, AuditCategory::Session, outcome));
    }

    fn open_ticket(&self, token: Option<&str>) -> Option<ExternalLoginTicket> {
        let token = non_blank(token)?;
        ExternalLoginTicket::open(&self.state.signer, token, self.now)
            .map_err(|error| {
                debug!(
                    event_name = "login.ticket.invalid",
                    correlation_id = %self.correlation_id,
                    error = %error,
                    "external login ticket could not be opened"
                );
            })
            .ok()
    }

    fn redirect_target(&self, return_url: Option<&str>) -> String {
        let target = safe_redirect_target(return_url);
        if let Some(requested) = non_blank(return_url) {
            if requested != target {
                debug!(
                    event_name = "login.redirect.downgraded",
                    correlation_id = %self.correlation_id,
                    requested = %requested,
                    "return url is not local, using landing route"
                );
            }
        }
        target
    }
}

/// Provider error codes are shown only when they look like an OAuth error code.
pub fn remote_error_message(raw: &str) -> String {
    let code = raw.trim();
    let is_error_code = !code.is_empty()
        && code.len() <= MAX_SHOWN_REMOTE_ERROR_LEN
        && code.bytes().all(|byte| byte.is_ascii_lowercase() || byte == b'_');
    if is_error_code {
        format!("Error from external provider: {code}")
    } else {
        "Error from external provider.".to_string()
    }
}

pub fn callback_location(return_url: Option<&str>, remote_error: Option<&str>) -> String {
    local_url(CALLBACK_ROUTE, &[("returnUrl", return_url), ("remoteError", remote_error)])
}

fn local_url(path: &str, params: &[(&str, Option<&str>)]) -> String {
    let pairs = params.iter().filter_map(|(key, value)| value.map(|value| (*key, value)));
    match Url::parse_with_params(&format!("http://localhost{path}"), pairs) {
        Ok(url) => match url.query() {
            Some(query) if !query.is_empty() => format!("{}?{query}", url.path()),
            _ => url.path().to_string(),
        },
        Err(_) => path.to_string(),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use storefront_core::audit::{AuditCategory, AuditOutcome};
    use storefront_core::domain::account::ExternalLoginKey;
    use storefront_core::login::{CorrelationState, ExternalLoginTicket};

    use super::{
        callback_location, remote_error_message, LoginError, LoginOrchestrator, LoginOutcome,
        ProviderRedirect, ACCOUNT_LOCKED, LOGIN_INFO_UNAVAILABLE,
        LOGIN_INFO_UNAVAILABLE_DURING_CONFIRMATION,
    };
    use crate::test_support::{google_identity, ticket_token, TestApp};

    #[test]
    fn remote_error_codes_are_shown_and_free_text_is_not() {
        assert_eq!(
            remote_error_message("access_denied"),
            "Error from external provider: access_denied"
        );
        assert_eq!(
            remote_error_message("<script>alert(1)</script>"),
            "Error from external provider."
        );
        assert_eq!(remote_error_message(&"a".repeat(65)), "Error from external provider.");
    }

    #[test]
    fn callback_location_encodes_parameters() {
        assert_eq!(callback_location(None, None), "/account/external-login-callback");
        assert_eq!(
            callback_location(Some("/catalog?searchTerm=a b"), Some("access_denied")),
            "/account/external-login-callback?returnUrl=%2Fcatalog%3FsearchTerm%3Da+b&remoteError=access_denied"
        );
    }

    #[tokio::test]
    async fn challenge_seals_return_url_and_points_at_provider() {
        let app = TestApp::new();
        let now = Utc::now();
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);

        let challenge = orchestrator.challenge("google", Some("/catalog")).expect("challenge");

        let correlation =
            CorrelationState::open(&app.state.signer, &challenge.correlation_token, now)
                .expect("correlation opens");
        assert_eq!(correlation.provider, "Google");
        assert_eq!(correlation.return_url.as_deref(), Some("/catalog"));
        assert!(challenge.location.starts_with("https://provider.test/authorize"));
        assert!(challenge.location.contains(&correlation.nonce));
        assert!(challenge.location.contains("signin-google"));
    }

    #[tokio::test]
    async fn challenge_for_unknown_provider_fails() {
        let app = TestApp::new();
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", Utc::now());

        let error = orchestrator.challenge("Myspace", None).expect_err("unknown provider");
        assert!(matches!(error, LoginError::UnknownProvider(name) if name == "Myspace"));
    }

    #[tokio::test]
    async fn provider_return_with_valid_state_issues_ticket() {
        let app = TestApp::new();
        let now = Utc::now();
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);
        let challenge = orchestrator.challenge("Google", Some("/catalog")).expect("challenge");
        let nonce = CorrelationState::open(&app.state.signer, &challenge.correlation_token, now)
            .expect("correlation")
            .nonce;

        let returned = orchestrator
            .provider_return(
                "google",
                ProviderRedirect {
                    code: Some("good-code".to_string()),
                    state: Some(nonce),
                    ..ProviderRedirect::default()
                },
                Some(&challenge.correlation_token),
            )
            .await
            .expect("provider return");

        assert_eq!(returned.redirect, callback_location(Some("/catalog"), None));
        let ticket = ExternalLoginTicket::open(
            &app.state.signer,
            returned.ticket.as_deref().expect("ticket"),
            now,
        )
        .expect("ticket opens");
        assert_eq!(ticket.identity, google_identity());
    }

    #[tokio::test]
    async fn provider_return_with_forged_state_drops_login_info() {
        let app = TestApp::new();
        let now = Utc::now();
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);
        let challenge = orchestrator.challenge("Google", Some("/catalog")).expect("challenge");

        let returned = orchestrator
            .provider_return(
                "google",
                ProviderRedirect {
                    code: Some("good-code".to_string()),
                    state: Some("not-the-nonce".to_string()),
                    ..ProviderRedirect::default()
                },
                Some(&challenge.correlation_token),
            )
            .await
            .expect("provider return");

        assert_eq!(returned.ticket, None);
        assert_eq!(returned.redirect, callback_location(None, None));
    }

    #[tokio::test]
    async fn provider_error_is_forwarded_as_remote_error() {
        let app = TestApp::new();
        let now = Utc::now();
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);
        let challenge = orchestrator.challenge("Google", None).expect("challenge");
        let nonce = CorrelationState::open(&app.state.signer, &challenge.correlation_token, now)
            .expect("correlation")
            .nonce;

        let returned = orchestrator
            .provider_return(
                "Google",
                ProviderRedirect {
                    error: Some("access_denied".to_string()),
                    state: Some(nonce),
                    ..ProviderRedirect::default()
                },
                Some(&challenge.correlation_token),
            )
            .await
            .expect("provider return");

        assert_eq!(returned.redirect, callback_location(None, Some("access_denied")));
        assert_eq!(returned.ticket, None);
    }

    #[tokio::test]
    async fn failed_code_exchange_drops_login_info() {
        let app = TestApp::new();
        let now = Utc::now();
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);
        let challenge = orchestrator.challenge("Google", None).expect("challenge");
        let nonce = CorrelationState::open(&app.state.signer, &challenge.correlation_token, now)
            .expect("correlation")
            .nonce;

        let returned = orchestrator
            .provider_return(
                "Google",
                ProviderRedirect {
                    code: Some("bad-code".to_string()),
                    state: Some(nonce),
                    ..ProviderRedirect::default()
                },
                Some(&challenge.correlation_token),
            )
            .await
            .expect("provider return");

        assert_eq!(returned.ticket, None);
    }

    #[tokio::test]
    async fn remote_error_rejects_with_message() {
        let app = TestApp::new();
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", Utc::now());

        let outcome =
            orchestrator.callback(Some("/catalog"), Some("access_denied"), None).await.expect("ok");

        assert_eq!(
            outcome,
            LoginOutcome::Rejected {
                message: "Error from external provider: access_denied".to_string()
            }
        );
        let events = app.audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, AuditOutcome::Rejected);
    }

    #[tokio::test]
    async fn remote_error_wins_over_a_valid_linked_ticket() {
        let app = TestApp::new();
        let now = Utc::now();
        app.seed_linked_account("jane@example.com", None).await;
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);
        let ticket = ticket_token(&app.state, google_identity(), now);

        let outcome = orchestrator
            .callback(Some("/catalog"), Some("access_denied"), Some(&ticket))
            .await
            .expect("ok");

        assert_eq!(
            outcome,
            LoginOutcome::Rejected {
                message: "Error from external provider: access_denied".to_string()
            }
        );
        assert!(app.audit.event_types(AuditCategory::Session).is_empty());
        let login_events = app.audit.events();
        assert_eq!(login_events.len(), 1);
        assert_eq!(login_events[0].outcome, AuditOutcome::Rejected);
        assert!(login_events[0].account_id.is_none());
    }

    #[tokio::test]
    async fn missing_or_expired_ticket_rejects() {
        let app = TestApp::new();
        let now = Utc::now();
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);
        let expired = ticket_token(&app.state, google_identity(), now - Duration::hours(1));

        for ticket in [None, Some("garbage"), Some(expired.as_str())] {
            let outcome = orchestrator.callback(None, None, ticket).await.expect("ok");
            assert_eq!(
                outcome,
                LoginOutcome::Rejected { message: LOGIN_INFO_UNAVAILABLE.to_string() }
            );
        }
    }

    #[tokio::test]
    async fn linked_login_signs_in_and_honours_local_return_url() {
        let app = TestApp::new();
        let now = Utc::now();
        let account = app.seed_linked_account("jane@example.com", None).await;
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);
        let ticket = ticket_token(&app.state, google_identity(), now);

        let outcome =
            orchestrator.callback(Some("/catalog"), None, Some(&ticket)).await.expect("ok");

        let LoginOutcome::SignedIn { session, redirect } = outcome else {
            panic!("expected sign in, got {outcome:?}");
        };
        assert_eq!(redirect, "/catalog");
        assert_eq!(session.account_id, account.id);
        assert!(app.state.sessions.find(&session.id).await.expect("find").is_some());
    }

    #[tokio::test]
    async fn cross_origin_return_url_falls_back_to_landing() {
        let app = TestApp::new();
        let now = Utc::now();
        app.seed_linked_account("jane@example.com", None).await;
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);

        for return_url in ["https://evil.example/", "//evil.example", "/\\evil.example"] {
            let ticket = ticket_token(&app.state, google_identity(), now);
            let outcome =
                orchestrator.callback(Some(return_url), None, Some(&ticket)).await.expect("ok");
            let LoginOutcome::SignedIn { redirect, .. } = outcome else {
                panic!("expected sign in, got {outcome:?}");
            };
            assert_eq!(redirect, "/", "return url {return_url}");
        }
    }

    #[tokio::test]
    async fn locked_account_is_rejected() {
        let app = TestApp::new();
        let now = Utc::now();
        app.seed_linked_account("jane@example.com", Some(now + Duration::hours(1))).await;
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);
        let ticket = ticket_token(&app.state, google_identity(), now);

        let outcome = orchestrator.callback(None, None, Some(&ticket)).await.expect("ok");

        assert_eq!(outcome, LoginOutcome::Rejected { message: ACCOUNT_LOCKED.to_string() });
    }

    #[tokio::test]
    async fn unlinked_login_prompts_for_confirmation_with_email_claim() {
        let app = TestApp::new();
        let now = Utc::now();
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);
        let ticket = ticket_token(&app.state, google_identity(), now);

        let outcome =
            orchestrator.callback(Some("/catalog"), None, Some(&ticket)).await.expect("ok");

        let LoginOutcome::Confirm(page) = outcome else {
            panic!("expected confirmation, got {outcome:?}");
        };
        assert_eq!(page.email, "jane@example.com");
        assert_eq!(page.provider_display_name, "Google");
        assert_eq!(page.return_url, "/catalog");
        assert!(page.errors.is_empty());
    }

    #[tokio::test]
    async fn confirmation_creates_links_and_signs_in() {
        let app = TestApp::new();
        let now = Utc::now();
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);
        let ticket = ticket_token(&app.state, google_identity(), now);

        let outcome = orchestrator
            .confirm("jane@example.com", Some("/catalog"), Some(&ticket))
            .await
            .expect("ok");

        let LoginOutcome::SignedIn { session, redirect } = outcome else {
            panic!("expected sign in, got {outcome:?}");
        };
        assert_eq!(redirect, "/catalog");
        let key = ExternalLoginKey {
            provider: "Google".to_string(),
            provider_key: "google-subject-1".to_string(),
        };
        let linked = app.state.accounts.find_by_external_login(&key).await.expect("find");
        assert_eq!(linked.map(|account| account.id), Some(session.account_id));
    }

    #[tokio::test]
    async fn confirmation_with_malformed_email_stays_on_form() {
        let app = TestApp::new();
        let now = Utc::now();
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);
        let ticket = ticket_token(&app.state, google_identity(), now);

        let outcome =
            orchestrator.confirm("not-an-email", None, Some(&ticket)).await.expect("ok");

        let LoginOutcome::Confirm(page) = outcome else {
            panic!("expected confirmation, got {outcome:?}");
        };
        assert!(!page.errors.is_empty());
        assert_eq!(page.email, "not-an-email");
        assert_eq!(page.provider_display_name, "Google");
        assert_eq!(
            app.state
                .accounts
                .find_by_external_login(&google_identity().login_key())
                .await
                .expect("find"),
            None
        );
    }

    #[tokio::test]
    async fn confirmation_with_taken_email_shows_conflict() {
        let app = TestApp::new();
        let now = Utc::now();
        app.seed_account("jane@example.com").await;
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);
        let ticket = ticket_token(&app.state, google_identity(), now);

        let outcome =
            orchestrator.confirm("Jane@Example.com", None, Some(&ticket)).await.expect("ok");

        let LoginOutcome::Confirm(page) = outcome else {
            panic!("expected confirmation, got {outcome:?}");
        };
        assert_eq!(page.errors, vec!["Email 'Jane@Example.com' is already taken.".to_string()]);
    }

    #[tokio::test]
    async fn confirmation_for_already_linked_login_discards_new_account() {
        let app = TestApp::new();
        let now = Utc::now();
        app.seed_linked_account("first@example.com", None).await;
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);
        let ticket = ticket_token(&app.state, google_identity(), now);

        let outcome =
            orchestrator.confirm("second@example.com", None, Some(&ticket)).await.expect("ok");

        let LoginOutcome::Confirm(page) = outcome else {
            panic!("expected confirmation, got {outcome:?}");
        };
        assert_eq!(page.errors, vec!["A user with this login already exists.".to_string()]);
        // The discarded account released its email.
        app.seed_account("second@example.com").await;
    }

    #[tokio::test]
    async fn confirmation_without_ticket_rejects() {
        let app = TestApp::new();
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", Utc::now());

        let outcome = orchestrator.confirm("jane@example.com", None, None).await.expect("ok");

        assert_eq!(
            outcome,
            LoginOutcome::Rejected {
                message: LOGIN_INFO_UNAVAILABLE_DURING_CONFIRMATION.to_string()
            }
        );
    }

    #[tokio::test]
    async fn sign_out_is_idempotent() {
        let app = TestApp::new();
        let now = Utc::now();
        app.seed_linked_account("jane@example.com", None).await;
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);
        let ticket = ticket_token(&app.state, google_identity(), now);
        let LoginOutcome::SignedIn { session, .. } =
            orchestrator.callback(None, None, Some(&ticket)).await.expect("ok")
        else {
            panic!("expected sign in");
        };

        let first = orchestrator.sign_out(Some(&session.id.0)).await.expect("sign out");
        let second = orchestrator.sign_out(Some(&session.id.0)).await.expect("sign out again");
        let anonymous = orchestrator.sign_out(None).await.expect("anonymous sign out");

        assert_eq!((first.as_str(), second.as_str(), anonymous.as_str()), ("/", "/", "/"));
        assert!(app.state.sessions.find(&session.id).await.expect("find").is_none());
        assert_eq!(
            app.audit.event_types(AuditCategory::Session),
            ["session.issued", "session.revoked"]
        );
    }

    #[tokio::test]
    async fn sliding_session_is_renewed_past_half_life() {
        let app = TestApp::new();
        let issued_at = Utc::now() - Duration::days(20);
        let account = app.seed_account("jane@example.com").await;
        let session = app.seed_session(&account.id, issued_at).await;
        let now = Utc::now();
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", now);

        let (renewed, found) = orchestrator
            .current_session(Some(&session.id.0))
            .await
            .expect("resolve")
            .expect("session");

        assert_eq!(found.id, account.id);
        assert_eq!(renewed.expires_at, now + Duration::days(30));
    }

    #[tokio::test]
    async fn expired_session_is_dropped() {
        let app = TestApp::new();
        let account = app.seed_account("jane@example.com").await;
        let session = app.seed_session(&account.id, Utc::now() - Duration::days(31)).await;
        let orchestrator = LoginOrchestrator::new(&app.state, "corr-1", Utc::now());

        let resolved = orchestrator.current_session(Some(&session.id.0)).await.expect("resolve");

        assert!(resolved.is_none());
        assert!(app.state.sessions.find(&session.id).await.expect("find").is_none());
    }
}
