//! Session issuance: mint access/refresh pairs, rotate, revoke.
//!
//! The refresh-token record id is generated before signing so the signed
//! `jti` and the stored row always agree. Refresh is rotating: a used
//! token is revoked in the same operation that issues its successor.

use crate::models::{RefreshTokenRecord, User};
use crate::services::error::ServiceError;
use crate::services::jwt::JwtService;
use crate::store::{active_role, CredentialStore};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Extends the refresh-token lifetime.
    pub remember_me: bool,
    /// Extends the access-token lifetime; used by code and passkey flows.
    pub long_session: bool,
}

impl SessionOptions {
    pub fn remembered(remember_me: bool) -> Self {
        Self {
            remember_me,
            long_session: false,
        }
    }

    pub fn long(remember_me: bool) -> Self {
        Self {
            remember_me,
            long_session: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access-token lifetime in seconds.
    pub expires_in: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    store: Arc<dyn CredentialStore>,
    jwt: JwtService,
}

impl TokenIssuer {
    pub fn new(store: Arc<dyn CredentialStore>, jwt: JwtService) -> Self {
        Self { store, jwt }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    /// Mint an access/refresh pair for a principal. The org claims are
    /// resolved from the active membership at issuance time; a stale or
    /// inactive `current_org_id` yields a token without org claims.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn issue(
        &self,
        user: &User,
        opts: SessionOptions,
    ) -> Result<TokenResponse, ServiceError> {
        let org = match user.current_org_id {
            Some(org_id) => active_role(self.store.as_ref(), user.id, org_id)
                .await?
                .map(|role| (org_id, role)),
            None => None,
        };

        let access_ttl = self.jwt.access_ttl(opts.long_session);
        let access_token = self.jwt.generate_access_token(user, org, access_ttl)?;

        let refresh_id = Uuid::new_v4();
        let expiry_days = self.jwt.refresh_ttl_days(opts.remember_me);
        let refresh_token = self
            .jwt
            .generate_refresh_token(user.id, refresh_id, expiry_days)?;
        let record =
            RefreshTokenRecord::new_with_id(refresh_id, user.id, &refresh_token, expiry_days);
        self.store.insert_refresh_token(&record).await?;

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: access_ttl.num_seconds(),
        })
    }

    /// Rotate a refresh token: validate signature and stored state, revoke
    /// the presented token, issue a fresh pair.
    #[tracing::instrument(skip(self, refresh_token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<(User, TokenResponse), ServiceError> {
        let claims = self.jwt.validate_refresh_token(refresh_token)?;

        let record = self
            .store
            .find_refresh_token(claims.jti)
            .await?
            .ok_or(ServiceError::InvalidToken)?;
        if !record.is_valid() {
            return Err(ServiceError::InvalidToken);
        }
        if record.token_hash != RefreshTokenRecord::hash_token(refresh_token) {
            tracing::warn!(token_id = %claims.jti, "refresh token hash mismatch");
            return Err(ServiceError::InvalidToken);
        }

        // Rotation: the presented token dies here regardless of what follows.
        self.store.revoke_refresh_token(record.id).await?;

        let user = self
            .store
            .find_user_by_id(claims.sub)
            .await?
            .ok_or(ServiceError::InvalidToken)?;
        if !user.is_active {
            return Err(ServiceError::AccountDisabled);
        }

        let pair = self.issue(&user, SessionOptions::default()).await?;
        Ok((user, pair))
    }

    /// Revoke a single refresh token. Idempotent: unknown, expired, or
    /// already-revoked tokens are not an error.
    pub async fn revoke(&self, refresh_token: &str) -> Result<(), ServiceError> {
        if let Ok(claims) = self.jwt.validate_refresh_token(refresh_token) {
            let _ = self.store.revoke_refresh_token(claims.jti).await?;
        }
        Ok(())
    }

    /// Revoke every live refresh token for a principal. Used after
    /// password changes and resets.
    pub async fn revoke_all(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        Ok(self.store.revoke_all_refresh_tokens(user_id).await?)
    }
}
