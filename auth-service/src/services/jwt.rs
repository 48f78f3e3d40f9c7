//! HS256 token signing and validation.
//!
//! Three token families share the signing key and are kept apart by the
//! `typ` claim: short-lived access tokens, rotating refresh tokens, and
//! magic-link tokens that wrap a one-time code reference. A token of one
//! family never validates as another.

use crate::models::{CodePurpose, OrgRole, User, UserRole};
use crate::services::error::ServiceError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const ISSUER: &str = "auth-service";
const AUDIENCE: &str = "auth-api";

const TYP_ACCESS: &str = "access";
const TYP_REFRESH: &str = "refresh";
const TYP_MAGIC_LINK: &str = "magic-link";

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: Uuid,
    pub email: String,
    pub role: UserRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_role: Option<OrgRole>,
    pub onboarding_pending: bool,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    pub sub: Uuid,
    /// Id of the stored refresh-token record; rotation revokes by this id.
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MagicLinkClaims {
    pub email: String,
    /// Id of the one-time code this link wraps; the stored code stays
    /// authoritative for used/expired state.
    pub code_id: Uuid,
    pub purpose: CodePurpose,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub typ: String,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_expiry_minutes: i64,
    long_session_expiry_hours: i64,
    refresh_expiry_days: i64,
    remember_me_expiry_days: i64,
    magic_link_expiry_minutes: i64,
}

impl JwtService {
    pub fn new(
        secret: &str,
        access_expiry_minutes: i64,
        long_session_expiry_hours: i64,
        refresh_expiry_days: i64,
        remember_me_expiry_days: i64,
        magic_link_expiry_minutes: i64,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_expiry_minutes,
            long_session_expiry_hours,
            refresh_expiry_days,
            remember_me_expiry_days,
            magic_link_expiry_minutes,
        }
    }

    /// Access-token lifetime: the long-session variant is used by code and
    /// passkey flows where re-prompting the user is expensive.
    pub fn access_ttl(&self, long_session: bool) -> Duration {
        if long_session {
            Duration::hours(self.long_session_expiry_hours)
        } else {
            Duration::minutes(self.access_expiry_minutes)
        }
    }

    pub fn refresh_ttl_days(&self, remember_me: bool) -> i64 {
        if remember_me {
            self.remember_me_expiry_days
        } else {
            self.refresh_expiry_days
        }
    }

    pub fn generate_access_token(
        &self,
        user: &User,
        org: Option<(Uuid, OrgRole)>,
        ttl: Duration,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            org_id: org.map(|(id, _)| id),
            org_role: org.map(|(_, role)| role),
            onboarding_pending: !user.onboarding_completed,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            typ: TYP_ACCESS.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Token signing failed: {}", e)))
    }

    pub fn generate_refresh_token(
        &self,
        user_id: Uuid,
        token_id: Uuid,
        expiry_days: i64,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = RefreshTokenClaims {
            sub: user_id,
            jti: token_id,
            iat: now.timestamp(),
            exp: (now + Duration::days(expiry_days)).timestamp(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            typ: TYP_REFRESH.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Token signing failed: {}", e)))
    }

    pub fn generate_magic_link_token(
        &self,
        email: &str,
        code_id: Uuid,
        purpose: CodePurpose,
        name: Option<String>,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = MagicLinkClaims {
            email: email.to_string(),
            code_id,
            purpose,
            name,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.magic_link_expiry_minutes)).timestamp(),
            iss: ISSUER.to_string(),
            aud: AUDIENCE.to_string(),
            typ: TYP_MAGIC_LINK.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Token signing failed: {}", e)))
    }

    pub fn validate_access_token(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        let claims: AccessTokenClaims = self.decode_checked(token)?;
        if claims.typ != TYP_ACCESS {
            return Err(ServiceError::InvalidToken);
        }
        Ok(claims)
    }

    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, ServiceError> {
        let claims: RefreshTokenClaims = self.decode_checked(token)?;
        if claims.typ != TYP_REFRESH {
            return Err(ServiceError::InvalidToken);
        }
        Ok(claims)
    }

    pub fn validate_magic_link_token(&self, token: &str) -> Result<MagicLinkClaims, ServiceError> {
        let claims: MagicLinkClaims = self.decode_checked(token)?;
        if claims.typ != TYP_MAGIC_LINK {
            return Err(ServiceError::InvalidToken);
        }
        Ok(claims)
    }

    fn decode_checked<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
    ) -> Result<T, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[AUDIENCE]);
        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| ServiceError::InvalidToken)
    }
}
