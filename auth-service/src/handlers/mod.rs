pub mod api_keys;
pub mod auth;
pub mod oauth;
pub mod otp;
pub mod passkey;

use crate::middleware::ACCESS_TOKEN_COOKIE;
use axum_extra::extract::cookie::{Cookie, SameSite};

/// Access-token cookie mirroring the response body, for browser clients
/// that prefer cookie transport over storing the token themselves. The
/// token carries its own expiry; the cookie is session-scoped.
pub(crate) fn session_cookie(access_token: &str) -> Cookie<'static> {
    Cookie::build((ACCESS_TOKEN_COOKIE, access_token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub(crate) fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((ACCESS_TOKEN_COOKIE, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}
