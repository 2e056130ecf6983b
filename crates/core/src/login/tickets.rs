//! Payloads carried between the requests of one external login round trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::account::ExternalIdentity;
use crate::signing::{TokenError, TokenSigner};

pub const CORRELATION_PURPOSE: &str = "external-login.correlation";
pub const EXTERNAL_TICKET_PURPOSE: &str = "external-login.ticket";

/// Written when the challenge is issued; checked when the provider redirects back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationState {
    pub provider: String,
    pub nonce: String,
    pub return_url: Option<String>,
}

impl CorrelationState {
    pub fn seal(&self, signer: &TokenSigner, expires_at: DateTime<Utc>) -> Result<String, TokenError> {
        signer.seal(CORRELATION_PURPOSE, expires_at, self)
    }

    pub fn open(signer: &TokenSigner, token: &str, now: DateTime<Utc>) -> Result<Self, TokenError> {
        signer.open(CORRELATION_PURPOSE, token, now)
    }

    /// True when the provider echoed this challenge's nonce for this provider.
    pub fn matches(&self, provider: &str, echoed_state: &str) -> bool {
        self.provider.eq_ignore_ascii_case(provider) && self.nonce == echoed_state
    }
}

/// The identity recovered from the provider, held until sign-in or confirmation completes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLoginTicket {
    pub identity: ExternalIdentity,
    pub provider_display_name: String,
}

impl ExternalLoginTicket {
    pub fn seal(&self, signer: &TokenSigner, expires_at: DateTime<Utc>) -> Result<String, TokenError> {
        signer.seal(EXTERNAL_TICKET_PURPOSE, expires_at, self)
    }

    pub fn open(signer: &TokenSigner, token: &str, now: DateTime<Utc>) -> Result<Self, TokenError> {
        signer.open(EXTERNAL_TICKET_PURPOSE, token, now)
    }
}
