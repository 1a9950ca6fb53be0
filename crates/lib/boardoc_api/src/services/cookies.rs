//! Session cookie.
//!
//! The app runs inside the platform's iframe, so the cookie is third-party:
//! it needs `SameSite=None`, which browsers only accept with `Secure`.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Cookie name for the session token.
pub const SESSION_COOKIE: &str = "boardoc_session";

/// Build the httpOnly session cookie, expiring with the token at `exp`.
pub fn session_cookie(token: &str, exp: i64, now: i64) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE.to_string(), token.to_string()))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .path("/".to_string())
        .max_age(Duration::seconds((exp - now).max(0)))
        .build()
}
