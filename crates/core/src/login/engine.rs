use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::login::states::{LoginContext, LoginEvent, LoginState, TransitionOutcome};

pub trait LoginFlowDefinition {
    fn initial_state(&self) -> LoginState;
    fn transition(
        &self,
        current: &LoginState,
        event: &LoginEvent,
        context: &LoginContext,
    ) -> Result<TransitionOutcome, LoginTransitionError>;
}

/// Redirect-based external login: challenge, callback, then sign-in or account creation.
#[derive(Clone, Debug, Default)]
pub struct ExternalLoginFlow;

impl LoginFlowDefinition for ExternalLoginFlow {
    fn initial_state(&self) -> LoginState {
        LoginState::AnonymousBrowsing
    }

    fn transition(
        &self,
        current: &LoginState,
        event: &LoginEvent,
        context: &LoginContext,
    ) -> Result<TransitionOutcome, LoginTransitionError> {
        transition_external_login(current, event, context)
    }
}

pub struct LoginFlow<F> {
    flow: F,
}

impl<F> LoginFlow<F>
where
    F: LoginFlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> LoginState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &LoginState,
        event: &LoginEvent,
        context: &LoginContext,
    ) -> Result<TransitionOutcome, LoginTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &LoginState,
        event: &LoginEvent,
        context: &LoginContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, LoginTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        let audit = audit.clone().with_provider(context.provider.as_deref());
        match &result {
            Ok(outcome) => {
                let outcome_kind = if outcome.to == LoginState::Rejected {
                    AuditOutcome::Rejected
                } else {
                    AuditOutcome::Success
                };
                sink.emit(
                    audit
                        .event("login.transition_applied", AuditCategory::Login, outcome_kind)
                        .with_metadata("from", format!("{:?}", outcome.from))
                        .with_metadata("to", format!("{:?}", outcome.to))
                        .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    audit
                        .event("login.transition_rejected", AuditCategory::Login, AuditOutcome::Failed)
                        .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for LoginFlow<ExternalLoginFlow> {
    fn default() -> Self {
        Self::new(ExternalLoginFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LoginTransitionError {
    #[error("a provider is required before transition from {state:?}")]
    MissingProvider { state: LoginState },
    #[error("account created from {state:?} while validation errors remain: {errors:?}")]
    UnresolvedValidationErrors { state: LoginState, errors: Vec<String> },
    #[error("rejection from {state:?} requires at least one validation error")]
    MissingValidationErrors { state: LoginState },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: LoginState, event: LoginEvent },
}

fn transition_external_login(
    current: &LoginState,
    event: &LoginEvent,
    context: &LoginContext,
) -> Result<TransitionOutcome, LoginTransitionError> {
    use LoginEvent::{
        AccountCreated, AccountLockedOut, AccountRejected, CallbackArrived, ChallengeRequested,
        ExistingLoginSignedIn, LinkRejected, LoginInfoUnavailable, LoginLinked, NoLinkedAccount,
        RemoteErrorReported, SignOutRequested,
    };
    use LoginState::{
        AnonymousBrowsing, ChallengeIssued, NeedsAccountCreation, NeedsAccountLink,
        ProviderCallbackReceived, Rejected, SignedIn,
    };

    let to = match (current, event) {
        (AnonymousBrowsing, ChallengeRequested) => {
            let has_provider =
                context.provider.as_deref().map(|value| !value.trim().is_empty()).unwrap_or(false);
            if !has_provider {
                return Err(LoginTransitionError::MissingProvider { state: current.clone() });
            }
            ChallengeIssued
        }
        (ChallengeIssued, RemoteErrorReported) | (ChallengeIssued, LoginInfoUnavailable) => Rejected,
        (ChallengeIssued, CallbackArrived) => ProviderCallbackReceived,
        (ProviderCallbackReceived, ExistingLoginSignedIn) => SignedIn,
        (ProviderCallbackReceived, AccountLockedOut) => Rejected,
        (ProviderCallbackReceived, NoLinkedAccount) => NeedsAccountCreation,
        (NeedsAccountCreation, LoginInfoUnavailable) => Rejected,
        (NeedsAccountCreation, AccountCreated) => {
            if !context.validation_errors.is_empty() {
                return Err(LoginTransitionError::UnresolvedValidationErrors {
                    state: current.clone(),
                    errors: context.validation_errors.clone(),
                });
            }
            NeedsAccountLink
        }
        (NeedsAccountCreation, AccountRejected) | (NeedsAccountLink, LinkRejected) => {
            if context.validation_errors.is_empty() {
                return Err(LoginTransitionError::MissingValidationErrors {
                    state: current.clone(),
                });
            }
            NeedsAccountCreation
        }
        (NeedsAccountLink, LoginLinked) => SignedIn,
        (_, SignOutRequested) => AnonymousBrowsing,
        _ => {
            return Err(LoginTransitionError::InvalidTransition {
                state: current.clone(),
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: current.clone(), to, event: event.clone() })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, AuditOutcome, InMemoryAuditSink};
    use crate::login::engine::{ExternalLoginFlow, LoginFlow, LoginTransitionError};
    use crate::login::states::{LoginContext, LoginEvent, LoginState};

    #[test]
    fn existing_login_happy_path_signs_in() {
        let flow = LoginFlow::new(ExternalLoginFlow);
        let context = LoginContext::for_provider("Google");

        let mut state = flow.initial_state();
        state = flow
            .apply(&state, &LoginEvent::ChallengeRequested, &context)
            .expect("anonymous -> challenge issued")
            .to;
        state = flow
            .apply(&state, &LoginEvent::CallbackArrived, &context)
            .expect("challenge issued -> callback received")
            .to;
        let signed_in = flow
            .apply(&state, &LoginEvent::ExistingLoginSignedIn, &context)
            .expect("callback received -> signed in");

        assert_eq!(signed_in.from, LoginState::ProviderCallbackReceived);
        assert_eq!(signed_in.to, LoginState::SignedIn);
        assert_eq!(signed_in.event, LoginEvent::ExistingLoginSignedIn);
    }

    #[test]
    fn new_user_path_creates_links_and_signs_in() {
        let flow = LoginFlow::default();
        let context = LoginContext::for_provider("Facebook");

        let needs_creation = flow
            .apply(&LoginState::ProviderCallbackReceived, &LoginEvent::NoLinkedAccount, &context)
            .expect("callback -> needs account creation");
        assert_eq!(needs_creation.to, LoginState::NeedsAccountCreation);

        let needs_link = flow
            .apply(&needs_creation.to, &LoginEvent::AccountCreated, &context)
            .expect("creation -> link");
        assert_eq!(needs_link.to, LoginState::NeedsAccountLink);

        let signed_in = flow
            .apply(&needs_link.to, &LoginEvent::LoginLinked, &context)
            .expect("link -> signed in");
        assert_eq!(signed_in.to, LoginState::SignedIn);
    }

    #[test]
    fn early_callback_failures_reject_with_status_message() {
        let flow = LoginFlow::default();
        for event in [LoginEvent::RemoteErrorReported, LoginEvent::LoginInfoUnavailable] {
            let outcome = flow
                .apply(&LoginState::ChallengeIssued, &event, &LoginContext::default())
                .expect("early exit is a valid transition");
            assert_eq!(outcome.to, LoginState::Rejected);
            assert_eq!(outcome.event, event);
        }
    }

    #[test]
    fn lockout_rejects() {
        let outcome = LoginFlow::default()
            .apply(
                &LoginState::ProviderCallbackReceived,
                &LoginEvent::AccountLockedOut,
                &LoginContext::default(),
            )
            .expect("lockout is a valid transition");
        assert_eq!(outcome.to, LoginState::Rejected);
    }

    #[test]
    fn validation_errors_keep_confirmation_step_open() {
        let flow = LoginFlow::default();
        let context = LoginContext {
            provider: Some("Google".to_string()),
            validation_errors: vec!["Email 'jane@example.com' is already taken.".to_string()],
        };

        let from_creation = flow
            .apply(&LoginState::NeedsAccountCreation, &LoginEvent::AccountRejected, &context)
            .expect("rejected creation stays on confirmation");
        assert_eq!(from_creation.to, LoginState::NeedsAccountCreation);

        let from_link = flow
            .apply(&LoginState::NeedsAccountLink, &LoginEvent::LinkRejected, &context)
            .expect("rejected link returns to confirmation");
        assert_eq!(from_link.to, LoginState::NeedsAccountCreation);
    }

    #[test]
    fn account_created_with_outstanding_errors_is_rejected() {
        let error = LoginFlow::default()
            .apply(
                &LoginState::NeedsAccountCreation,
                &LoginEvent::AccountCreated,
                &LoginContext {
                    provider: None,
                    validation_errors: vec!["The Email field is required.".to_string()],
                },
            )
            .expect_err("cannot create with validation errors");
        assert!(matches!(error, LoginTransitionError::UnresolvedValidationErrors { .. }));
    }

    #[test]
    fn rejection_without_errors_is_invalid() {
        let error = LoginFlow::default()
            .apply(
                &LoginState::NeedsAccountCreation,
                &LoginEvent::AccountRejected,
                &LoginContext::default(),
            )
            .expect_err("rejection needs errors to render");
        assert!(matches!(error, LoginTransitionError::MissingValidationErrors { .. }));
    }

    #[test]
    fn challenge_requires_provider() {
        let error = LoginFlow::default()
            .apply(
                &LoginState::AnonymousBrowsing,
                &LoginEvent::ChallengeRequested,
                &LoginContext::for_provider("  "),
            )
            .expect_err("blank provider is rejected");
        assert_eq!(
            error,
            LoginTransitionError::MissingProvider { state: LoginState::AnonymousBrowsing }
        );
    }

    #[test]
    fn sign_out_is_valid_from_any_state() {
        let flow = LoginFlow::default();
        for state in [LoginState::AnonymousBrowsing, LoginState::SignedIn, LoginState::Rejected] {
            let outcome = flow
                .apply(&state, &LoginEvent::SignOutRequested, &LoginContext::default())
                .expect("sign out always applies");
            assert_eq!(outcome.from, state);
            assert_eq!(outcome.to, LoginState::AnonymousBrowsing);
        }
    }

    #[test]
    fn skipping_the_challenge_is_invalid() {
        let error = LoginFlow::default()
            .apply(
                &LoginState::AnonymousBrowsing,
                &LoginEvent::ExistingLoginSignedIn,
                &LoginContext::default(),
            )
            .expect_err("cannot sign in without a callback");
        assert!(matches!(
            error,
            LoginTransitionError::InvalidTransition {
                state: LoginState::AnonymousBrowsing,
                event: LoginEvent::ExistingLoginSignedIn
            }
        ));
    }

    #[test]
    fn transitions_emit_audit_events() {
        let flow = LoginFlow::default();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(None, "req-42", "login-orchestrator");

        flow.apply_with_audit(
            &LoginState::ChallengeIssued,
            &LoginEvent::RemoteErrorReported,
            &LoginContext::for_provider("Google"),
            &sink,
            &audit,
        )
        .expect("transition should succeed");
        let _ = flow.apply_with_audit(
            &LoginState::SignedIn,
            &LoginEvent::CallbackArrived,
            &LoginContext::default(),
            &sink,
            &audit,
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "login.transition_applied");
        assert_eq!(events[0].outcome, AuditOutcome::Rejected);
        assert_eq!(events[0].provider.as_deref(), Some("Google"));
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("Rejected"));
        assert_eq!(events[1].event_type, "login.transition_rejected");
        assert_eq!(events[1].provider, None);
        assert_eq!(events[1].correlation_id, "req-42");
    }
}
