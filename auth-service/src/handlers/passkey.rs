//! WebAuthn passkey endpoints.
//!
//! Registration requires an authenticated session. Authentication comes
//! in two shapes: email-first, where we look up the user's credentials,
//! and discoverable, where the authenticator identifies the user.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;

use crate::{
    dtos::{
        AuthResponse, DiscoverableLoginFinishRequest, PasskeyLoginFinishRequest,
        PasskeyLoginStartRequest, PasskeyRegisterFinishRequest,
    },
    handlers::session_cookie,
    middleware::{client_id_from_request, AuthUser},
    utils::ValidatedJson,
    AppState,
};

/// Begin passkey registration for the current principal.
///
/// POST /auth/passkeys/register/start
pub async fn register_start(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let challenge = state.passkeys.start_registration(&ctx.user).await?;
    Ok((StatusCode::OK, Json(challenge)))
}

/// Finish passkey registration.
///
/// POST /auth/passkeys/register/finish
pub async fn register_finish(
    State(state): State<AppState>,
    headers: HeaderMap,
    AuthUser(ctx): AuthUser,
    Json(req): Json<PasskeyRegisterFinishRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = client_id_from_request(&headers);
    let credential = serde_json::from_value(req.credential)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Malformed credential: {}", e)))?;
    let summary = state
        .passkeys
        .finish_registration(&ctx.user, credential, req.device_name, &client_id)
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Begin email-first passkey authentication.
///
/// POST /auth/passkeys/login/start
pub async fn login_start(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasskeyLoginStartRequest>,
) -> Result<impl IntoResponse, AppError> {
    let challenge = state.passkeys.start_authentication(&req.email).await?;
    Ok((StatusCode::OK, Json(challenge)))
}

/// Finish email-first passkey authentication.
///
/// POST /auth/passkeys/login/finish
pub async fn login_finish(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(req): Json<PasskeyLoginFinishRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = client_id_from_request(&headers);
    let (user, tokens) = state
        .passkeys
        .finish_authentication(&req.email, req.credential, req.remember_me, &client_id)
        .await?;

    let jar = jar.add(session_cookie(&tokens.access_token));
    Ok((StatusCode::OK, jar, Json(AuthResponse::new(user, tokens))))
}

/// Begin discoverable (usernameless) authentication.
///
/// POST /auth/passkeys/discoverable/start
pub async fn discoverable_start(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let challenge = state.passkeys.start_discoverable().await?;
    Ok((StatusCode::OK, Json(challenge)))
}

/// Finish discoverable authentication.
///
/// POST /auth/passkeys/discoverable/finish
pub async fn discoverable_finish(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(req): Json<DiscoverableLoginFinishRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = client_id_from_request(&headers);
    let (user, tokens) = state
        .passkeys
        .finish_discoverable(req.credential, req.remember_me, &client_id)
        .await?;

    let jar = jar.add(session_cookie(&tokens.access_token));
    Ok((StatusCode::OK, jar, Json(AuthResponse::new(user, tokens))))
}

/// List the current principal's registered passkeys.
///
/// GET /auth/passkeys
pub async fn list(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let credentials = state.passkeys.list_credentials(ctx.user.id).await?;
    Ok((StatusCode::OK, Json(credentials)))
}
