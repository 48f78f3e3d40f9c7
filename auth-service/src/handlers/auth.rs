//! Password authentication and account endpoints.

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
        AuthResponse, ChangePasswordRequest, ErrorResponse, ForgotPasswordRequest, LoginRequest,
        LogoutRequest, MeResponse, MembershipInfo, MessageResponse, RefreshRequest,
        RegisterRequest, ResetPasswordRequest, SwitchOrganizationRequest,
    },
    handlers::{clear_session_cookie, session_cookie},
    middleware::{client_id_from_request, AuthUser},
    utils::ValidatedJson,
    AppState,
};

/// Register with email and password
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = client_id_from_request(&headers);
    let (user, tokens) = state
        .auth
        .register(&req.email, &req.password, req.name, &client_id)
        .await?;

    let jar = jar.add(session_cookie(&tokens.access_token));
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse::new(user, tokens)),
    ))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account disabled", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = client_id_from_request(&headers);
    let (user, tokens) = state
        .auth
        .login(&req.email, &req.password, req.remember_me, &client_id)
        .await?;

    let jar = jar.add(session_cookie(&tokens.access_token));
    Ok((StatusCode::OK, jar, Json(AuthResponse::new(user, tokens))))
}

/// Rotate a refresh token into a new session
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed", body = AuthResponse),
        (status = 401, description = "Invalid or expired token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, tokens) = state.auth.refresh(&req.refresh_token).await?;

    let jar = jar.add(session_cookie(&tokens.access_token));
    Ok((StatusCode::OK, jar, Json(AuthResponse::new(user, tokens))))
}

/// Logout and revoke the refresh token
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LogoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = client_id_from_request(&headers);
    state.auth.logout(&req.refresh_token, &client_id).await?;

    let jar = jar.remove(clear_session_cookie());
    Ok((
        StatusCode::OK,
        jar,
        Json(MessageResponse::new("Logged out successfully")),
    ))
}

/// Current principal with organization memberships
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let (user, memberships) = state.auth.me(ctx.user.id).await?;
    Ok((
        StatusCode::OK,
        Json(MeResponse {
            user,
            memberships: memberships.into_iter().map(MembershipInfo::from).collect(),
        }),
    ))
}

/// Change password; every other session is revoked
#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 401, description = "Current password incorrect", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    AuthUser(ctx): AuthUser,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = client_id_from_request(&headers);
    state
        .auth
        .change_password(ctx.user.id, &req.current_password, &req.new_password, &client_id)
        .await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Password changed successfully")),
    ))
}

/// Switch the active organization and reissue tokens
#[utoipa::path(
    post,
    path = "/auth/switch-organization",
    request_body = SwitchOrganizationRequest,
    responses(
        (status = 200, description = "Organization switched", body = AuthResponse),
        (status = 403, description = "No active membership", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn switch_organization(
    State(state): State<AppState>,
    jar: CookieJar,
    AuthUser(ctx): AuthUser,
    Json(req): Json<SwitchOrganizationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (user, tokens) = state
        .auth
        .switch_organization(ctx.user.id, req.organization_id)
        .await?;

    let jar = jar.add(session_cookie(&tokens.access_token));
    Ok((StatusCode::OK, jar, Json(AuthResponse::new(user, tokens))))
}

/// Request a password reset code; always reports success
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset code sent if the account exists", body = MessageResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = client_id_from_request(&headers);
    state.auth.forgot_password(&req.email, &client_id).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new(
            "If that email is registered, a reset code has been sent",
        )),
    ))
}

/// Reset password with an emailed code
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 401, description = "Invalid or expired code", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let client_id = client_id_from_request(&headers);
    state
        .auth
        .reset_password(&req.email, &req.code, &req.new_password, &client_id)
        .await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Password reset successfully")),
    ))
}

/// Mark onboarding complete for the current principal
#[utoipa::path(
    post,
    path = "/auth/onboarding/complete",
    responses(
        (status = 200, description = "Onboarding completed"),
        (status = 400, description = "No organization membership", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn complete_onboarding(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = state.auth.complete_onboarding(ctx.user.id).await?;
    Ok((StatusCode::OK, Json(user)))
}
