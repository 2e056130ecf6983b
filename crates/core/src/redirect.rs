//! Redirect targets derived from caller-supplied return URLs.
//!
//! Only same-origin, root-relative paths are echoed back. Everything else (absolute URLs,
//! protocol-relative `//host` forms, `/\host` forms that browsers normalise to `//host`, and values
//! carrying control characters) collapses to the default landing route.

pub const DEFAULT_LANDING_ROUTE: &str = "/";

pub fn is_local_url(url: &str) -> bool {
    let mut chars = url.chars();
    if chars.next() != Some('/') {
        return false;
    }
    match chars.next() {
        None => true,
        Some('/') | Some('\\') => false,
        Some(_) => !url.chars().any(char::is_control),
    }
}

/// The return URL when it is local, otherwise [`DEFAULT_LANDING_ROUTE`].
pub fn safe_redirect_target(return_url: Option<&str>) -> String {
    match return_url {
        Some(url) if is_local_url(url) => url.to_string(),
        _ => DEFAULT_LANDING_ROUTE.to_string(),
    }
}
