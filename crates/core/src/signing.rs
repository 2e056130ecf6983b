//! HMAC-signed, expiring tokens for state that round-trips through the browser.
//!
//! A token is `hex(json(envelope)).hex(hmac)`. The envelope binds a purpose string so a token
//! minted for one cookie cannot be replayed as another.

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token was issued for `{found}`, expected `{expected}`")]
    WrongPurpose { expected: String, found: String },
    #[error("token expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },
    #[error("signing key is unusable")]
    InvalidKey,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    purpose: String,
    expires_at: i64,
    payload: T,
}

#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").field("key", &"[redacted]").finish()
    }
}

impl TokenSigner {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self { key: key.as_ref().to_vec() }
    }

    pub fn seal<T>(
        &self,
        purpose: &str,
        expires_at: DateTime<Utc>,
        payload: &T,
    ) -> Result<String, TokenError>
    where
        T: Serialize,
    {
        let envelope =
            Envelope { purpose: purpose.to_string(), expires_at: expires_at.timestamp(), payload };
        let body = serde_json::to_vec(&envelope).map_err(|_| TokenError::Malformed)?;
        let body_hex = encode_hex(&body);
        let signature = self.mac_hex(body_hex.as_bytes())?;
        Ok(format!("{body_hex}.{signature}"))
    }

    pub fn open<T>(&self, purpose: &str, token: &str, now: DateTime<Utc>) -> Result<T, TokenError>
    where
        T: DeserializeOwned,
    {
        let (body_hex, signature_hex) = token.split_once('.').ok_or(TokenError::Malformed)?;
        let signature = decode_hex(signature_hex).ok_or(TokenError::Malformed)?;
        self.verify(body_hex.as_bytes(), &signature)?;

        let body = decode_hex(body_hex).ok_or(TokenError::Malformed)?;
        let envelope: Envelope<T> =
            serde_json::from_slice(&body).map_err(|_| TokenError::Malformed)?;

        if envelope.purpose != purpose {
            return Err(TokenError::WrongPurpose {
                expected: purpose.to_string(),
                found: envelope.purpose,
            });
        }
        let expired_at =
            Utc.timestamp_opt(envelope.expires_at, 0).single().ok_or(TokenError::Malformed)?;
        if expired_at <= now {
            return Err(TokenError::Expired { expired_at });
        }

        Ok(envelope.payload)
    }

    /// Hex MAC of `value` under this key, scoped to `purpose`.
    pub fn derive(&self, purpose: &str, value: &str) -> Result<String, TokenError> {
        self.mac_hex(format!("{purpose}:{value}").as_bytes())
    }

    /// Constant-time check that `mac_hex` is [`TokenSigner::derive`] of `value`.
    pub fn verify_derived(&self, purpose: &str, value: &str, mac_hex: &str) -> bool {
        match decode_hex(mac_hex) {
            Some(expected) => {
                self.verify(format!("{purpose}:{value}").as_bytes(), &expected).is_ok()
            }
            None => false,
        }
    }

    fn mac_hex(&self, payload: &[u8]) -> Result<String, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| TokenError::InvalidKey)?;
        mac.update(payload);
        Ok(encode_hex(mac.finalize().into_bytes().as_slice()))
    }

    fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<(), TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.key).map_err(|_| TokenError::InvalidKey)?;
        mac.update(payload);
        mac.verify_slice(signature).map_err(|_| TokenError::BadSignature)
    }
}

/// 32 random bytes, hex encoded.
pub fn random_token() -> String {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    encode_hex(&bytes)
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn decode_hex(input: &str) -> Option<Vec<u8>> {
    if input.len() % 2 != 0 || !input.is_ascii() {
        return None;
    }
    (0..input.len())
        .step_by(2)
        .map(|index| u8::from_str_radix(&input[index..index + 2], 16).ok())
        .collect()
}
