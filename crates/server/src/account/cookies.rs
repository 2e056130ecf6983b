use chrono::{DateTime, Utc};
use storefront_core::signing::TokenSigner;
use tower_cookies::cookie::{time::Duration as CookieDuration, SameSite};
use tower_cookies::{Cookie, Cookies};

use crate::state::WebSettings;

pub const CORRELATION_COOKIE: &str = "storefront_correlation";
pub const EXTERNAL_LOGIN_COOKIE: &str = "storefront_external_login";
pub const STATUS_MESSAGE_COOKIE: &str = "storefront_status";
pub const ANTIFORGERY_COOKIE: &str = "storefront_antiforgery";

const STATUS_MESSAGE_PURPOSE: &str = "status-message";
const STATUS_MESSAGE_TTL_SECS: i64 = 300;

/// Session-scoped cookie: HttpOnly, path `/`, SameSite=Lax, no max-age.
fn build(name: impl Into<String>, value: impl Into<String>, settings: &WebSettings) -> Cookie<'static> {
    Cookie::build((name.into(), value.into()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.secure_cookies)
        .build()
}

pub fn set(cookies: &Cookies, settings: &WebSettings, name: &str, value: impl Into<String>) {
    cookies.add(build(name, value, settings));
}

pub fn clear(cookies: &Cookies, settings: &WebSettings, name: &str) {
    let mut cookie = build(name, "", settings);
    cookie.set_max_age(CookieDuration::ZERO);
    cookies.add(cookie);
}

pub fn read(cookies: &Cookies, name: &str) -> Option<String> {
    cookies
        .get(name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

pub fn session_id(cookies: &Cookies, settings: &WebSettings) -> Option<String> {
    read(cookies, &settings.session_cookie_name)
}

pub fn set_session(cookies: &Cookies, settings: &WebSettings, session_id: &str) {
    set(cookies, settings, &settings.session_cookie_name, session_id);
}

pub fn clear_session(cookies: &Cookies, settings: &WebSettings) {
    clear(cookies, settings, &settings.session_cookie_name);
}

/// Stores a message shown once by the next login page render.
pub fn set_status_message(
    cookies: &Cookies,
    settings: &WebSettings,
    signer: &TokenSigner,
    message: &str,
    now: DateTime<Utc>,
) {
    let expires_at = now + chrono::Duration::seconds(STATUS_MESSAGE_TTL_SECS);
    if let Ok(token) = signer.seal(STATUS_MESSAGE_PURPOSE, expires_at, &message) {
        set(cookies, settings, STATUS_MESSAGE_COOKIE, token);
    }
}

pub fn take_status_message(
    cookies: &Cookies,
    settings: &WebSettings,
    signer: &TokenSigner,
    now: DateTime<Utc>,
) -> Option<String> {
    let token = read(cookies, STATUS_MESSAGE_COOKIE)?;
    clear(cookies, settings, STATUS_MESSAGE_COOKIE);
    signer.open::<String>(STATUS_MESSAGE_PURPOSE, &token, now).ok()
}
