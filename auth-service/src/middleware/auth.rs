//! Request authentication resolver.
//!
//! One resolution order for every protected route: Authorization bearer
//! token, then the access-token cookie, then the X-API-Key header. A
//! bearer value carrying the API-key prefix is treated as an API key, so
//! keys work in either position. The resolved `AuthContext` rides the
//! request extensions; handlers take it through the `AuthUser` extractor.

use crate::models::{OrgRole, User, API_KEY_PREFIX};
use crate::store::active_role;
use crate::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use service_core::error::AppError;
use uuid::Uuid;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    Session,
    ApiKey,
}

/// Authenticated caller, attached to request extensions by the resolver.
#[derive(Clone)]
pub struct AuthContext {
    pub user: User,
    pub org_id: Option<Uuid>,
    pub org_role: Option<OrgRole>,
    pub kind: AuthKind,
    /// Granted scopes; empty for session principals.
    pub scopes: Vec<String>,
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = resolve(&state, req.headers(), &jar)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))?;
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

/// Attaches an `AuthContext` when credentials are present and valid;
/// everything else, including invalid credentials, continues anonymously.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(ctx) = resolve(&state, req.headers(), &jar).await.ok().flatten() {
        req.extensions_mut().insert(ctx);
    }
    Ok(next.run(req).await)
}

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let ctx = resolve(&state, req.headers(), &jar)
        .await?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))?;
    if !ctx.user.is_admin() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Admin privileges required"
        )));
    }
    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

async fn resolve(
    state: &AppState,
    headers: &HeaderMap,
    jar: &CookieJar,
) -> Result<Option<AuthContext>, AppError> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let token = bearer
        .map(str::to_string)
        .or_else(|| jar.get(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string()));

    if let Some(token) = token {
        if token.starts_with(API_KEY_PREFIX) {
            return resolve_api_key(state, &token).await.map(Some);
        }
        return resolve_session(state, &token).await.map(Some);
    }

    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(key) = api_key {
        return resolve_api_key(state, key).await.map(Some);
    }

    Ok(None)
}

async fn resolve_session(state: &AppState, token: &str) -> Result<AuthContext, AppError> {
    let claims = state
        .jwt
        .validate_access_token(token)
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token")))?;

    let user = state
        .store
        .find_user_by_id(claims.sub)
        .await
        .map_err(|e| AppError::InternalError(anyhow::Error::new(e)))?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token")))?;
    if !user.is_active {
        return Err(AppError::Forbidden(anyhow::anyhow!("Account is disabled")));
    }

    Ok(AuthContext {
        user,
        org_id: claims.org_id,
        org_role: claims.org_role,
        kind: AuthKind::Session,
        scopes: Vec::new(),
    })
}

async fn resolve_api_key(state: &AppState, presented: &str) -> Result<AuthContext, AppError> {
    let key = state.api_keys.verify(presented).await?;

    let user = state
        .store
        .find_user_by_id(key.user_id)
        .await
        .map_err(|e| AppError::InternalError(anyhow::Error::new(e)))?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid credentials")))?;

    let org_role = active_role(state.store.as_ref(), user.id, key.organization_id)
        .await
        .map_err(|e| AppError::InternalError(anyhow::Error::new(e)))?;

    Ok(AuthContext {
        user,
        org_id: Some(key.organization_id),
        org_role,
        kind: AuthKind::ApiKey,
        scopes: key.scopes,
    })
}

/// Extractor for handlers behind the auth middleware.
pub struct AuthUser(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))
    }
}

/// Client identifier used for attempt limiting and audit records:
/// the first X-Forwarded-For hop, or "unknown" when absent.
pub fn client_id_from_request(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
