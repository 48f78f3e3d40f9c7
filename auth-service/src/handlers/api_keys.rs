//! API key management endpoints, scoped to the caller's active org.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{ApiKeyCreatedResponse, ApiKeyListResponse, CreateApiKeyRequest, ErrorResponse, MessageResponse},
    middleware::AuthUser,
    utils::ValidatedJson,
    AppState,
};

/// Create an API key; the full key appears only in this response
#[utoipa::path(
    post,
    path = "/auth/api-keys",
    request_body = CreateApiKeyRequest,
    responses(
        (status = 201, description = "Key created", body = ApiKeyCreatedResponse),
        (status = 403, description = "No active organization", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "API Keys",
    security(("bearer_auth" = []))
)]
pub async fn create(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let org_id = ctx
        .org_id
        .ok_or_else(|| AppError::Forbidden(anyhow::anyhow!("No active organization")))?;
    let (api_key, key) = state
        .api_keys
        .mint(&ctx.user, org_id, req.name, req.scopes)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiKeyCreatedResponse { api_key, key }),
    ))
}

/// List keys in the caller's active organization
#[utoipa::path(
    get,
    path = "/auth/api-keys",
    responses(
        (status = 200, description = "Keys for the active organization", body = ApiKeyListResponse),
        (status = 403, description = "No active organization", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "API Keys",
    security(("bearer_auth" = []))
)]
pub async fn list(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let org_id = ctx
        .org_id
        .ok_or_else(|| AppError::Forbidden(anyhow::anyhow!("No active organization")))?;
    let api_keys = state.api_keys.list(org_id).await?;
    Ok((StatusCode::OK, Json(ApiKeyListResponse { api_keys })))
}

/// Revoke a key
#[utoipa::path(
    delete,
    path = "/auth/api-keys/{id}",
    params(("id" = Uuid, Path, description = "API key id")),
    responses(
        (status = 200, description = "Key revoked", body = MessageResponse),
        (status = 403, description = "Not the key creator", body = ErrorResponse),
        (status = 404, description = "Key not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "API Keys",
    security(("bearer_auth" = []))
)]
pub async fn revoke(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.api_keys.revoke(id, &ctx.user).await?;
    Ok((StatusCode::OK, Json(MessageResponse::new("API key revoked"))))
}
