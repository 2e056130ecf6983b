//! The seam between the login flow and a concrete external identity provider.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::account::ExternalIdentity;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("provider `{0}` is not configured")]
    UnknownProvider(String),
    #[error("provider rejected the authorization code: {0}")]
    CodeRejected(String),
    #[error("provider response could not be read: {0}")]
    InvalidResponse(String),
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("provider configuration is invalid: {0}")]
    Configuration(String),
}

/// An external identity provider reachable through a redirect round trip.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Scheme name used in routes and persisted logins, e.g. `Google`.
    fn name(&self) -> &str;

    fn display_name(&self) -> &str {
        self.name()
    }

    /// Where the browser is sent to authenticate. `state` is echoed back on the callback.
    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String, AuthError>;

    /// Turns the callback's authorization code into the asserted identity.
    async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<ExternalIdentity, AuthError>;
}
