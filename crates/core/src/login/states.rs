use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginState {
    AnonymousBrowsing,
    ChallengeIssued,
    ProviderCallbackReceived,
    SignedIn,
    NeedsAccountLink,
    NeedsAccountCreation,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginEvent {
    ChallengeRequested,
    CallbackArrived,
    RemoteErrorReported,
    LoginInfoUnavailable,
    ExistingLoginSignedIn,
    AccountLockedOut,
    NoLinkedAccount,
    AccountCreated,
    AccountRejected,
    LoginLinked,
    LinkRejected,
    SignOutRequested,
}

/// Facts the engine needs to validate a transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LoginContext {
    pub provider: Option<String>,
    pub validation_errors: Vec<String>,
}

impl LoginContext {
    pub fn for_provider(provider: impl Into<String>) -> Self {
        Self { provider: Some(provider.into()), validation_errors: Vec::new() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: LoginState,
    pub to: LoginState,
    pub event: LoginEvent,
}
