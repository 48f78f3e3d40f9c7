//! Email one-time-code endpoints.
//!
//! Code request endpoints return the same response whether or not the
//! email is registered.

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
        AuthResponse, MessageResponse, RequestLoginCodeRequest, RequestSignupCodeRequest,
        VerifyLoginCodeRequest, VerifyMagicLinkRequest, VerifySignupCodeRequest,
    },
    handlers::session_cookie,
    middleware::client_id_from_request,
    utils::ValidatedJson,
    AppState,
};

/// Send a signup verification code.
///
/// POST /auth/otp/signup/request
pub async fn request_signup_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RequestSignupCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.otp.request_signup_code(&req.email, req.name).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Verification code sent")),
    ))
}

/// Send a login code.
///
/// POST /auth/otp/login/request
pub async fn request_login_code(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RequestLoginCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.otp.request_login_code(&req.email).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Login code sent")),
    ))
}

/// Verify a signup code and create the account.
///
/// POST /auth/otp/signup/verify
pub async fn verify_signup_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<VerifySignupCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = client_id_from_request(&headers);
    let (user, tokens) = state
        .otp
        .verify_signup_code(&req.email, &req.code, &client_id)
        .await?;

    let jar = jar.add(session_cookie(&tokens.access_token));
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse::new(user, tokens)),
    ))
}

/// Verify a login code.
///
/// POST /auth/otp/login/verify
pub async fn verify_login_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<VerifyLoginCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = client_id_from_request(&headers);
    let (user, tokens) = state
        .otp
        .verify_login_code(&req.email, &req.code, req.remember_me, &client_id)
        .await?;

    let jar = jar.add(session_cookie(&tokens.access_token));
    Ok((StatusCode::OK, jar, Json(AuthResponse::new(user, tokens))))
}

/// Redeem a magic-link token from an emailed link.
///
/// POST /auth/otp/magic-link/verify
pub async fn verify_magic_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<VerifyMagicLinkRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = client_id_from_request(&headers);
    let (user, tokens) = state.otp.verify_magic_link(&req.token, &client_id).await?;

    let jar = jar.add(session_cookie(&tokens.access_token));
    Ok((StatusCode::OK, jar, Json(AuthResponse::new(user, tokens))))
}
