//! Google OAuth endpoints.

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::{AuthResponse, OAuthCallbackQuery},
    handlers::session_cookie,
    middleware::client_id_from_request,
    AppState,
};

/// Redirect to Google's consent screen.
///
/// GET /auth/google
pub async fn google_login(State(state): State<AppState>) -> impl IntoResponse {
    Redirect::temporary(&state.google.login_url())
}

/// Handle the provider callback and issue a session.
///
/// GET /auth/google/callback
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(error) = query.error {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Provider returned an error: {}",
            error
        )));
    }
    let code = query
        .code
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing authorization code")))?;

    let client_id = client_id_from_request(&headers);
    let (user, tokens, is_new) = state.google.handle_callback(&code, &client_id).await?;

    let jar = jar.add(session_cookie(&tokens.access_token));
    let mut response = AuthResponse::new(user, tokens);
    response.is_new_user = Some(is_new);
    Ok((StatusCode::OK, jar, Json(response)))
}
