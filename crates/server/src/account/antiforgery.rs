//! Double-submit anti-forgery tokens for the account POST endpoints.

use storefront_core::signing::{random_token, TokenSigner};
use tower_cookies::Cookies;

use super::cookies::{self, ANTIFORGERY_COOKIE};
use crate::error::WebError;
use crate::state::WebSettings;

pub const FORM_FIELD: &str = "__RequestVerificationToken";
const PURPOSE: &str = "antiforgery";

/// Form token for the current browser, issuing the cookie half when it is missing.
pub fn form_token(
    cookies: &Cookies,
    settings: &WebSettings,
    signer: &TokenSigner,
    correlation_id: &str,
) -> Result<String, WebError> {
    let cookie_token = match cookies::read(cookies, ANTIFORGERY_COOKIE) {
        Some(token) => token,
        None => {
            let token = random_token();
            cookies::set(cookies, settings, ANTIFORGERY_COOKIE, token.clone());
            token
        }
    };
    signer
        .derive(PURPOSE, &cookie_token)
        .map_err(|_| WebError::AntiForgery { correlation_id: correlation_id.to_string() })
}

pub fn verify(
    cookies: &Cookies,
    signer: &TokenSigner,
    submitted: Option<&str>,
    correlation_id: &str,
) -> Result<(), WebError> {
    let rejected = || WebError::AntiForgery { correlation_id: correlation_id.to_string() };
    let cookie_token = cookies::read(cookies, ANTIFORGERY_COOKIE).ok_or_else(rejected)?;
    let submitted = submitted.filter(|token| !token.is_empty()).ok_or_else(rejected)?;
    if signer.verify_derived(PURPOSE, &cookie_token, submitted) {
        Ok(())
    } else {
        Err(rejected())
    }
}
