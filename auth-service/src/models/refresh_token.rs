use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Server-tracked refresh token record.
///
/// The record id is generated before the token is signed so the signed
/// value can embed it; exactly one insert happens per issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// Record id, embedded in the signed token as the `jti` claim
    pub id: Uuid,
    pub user_id: Uuid,
    /// SHA-256 hash of the signed token value
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    pub fn new_with_id(id: Uuid, user_id: Uuid, token: &str, expires_in_days: i64) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            token_hash: Self::hash_token(token),
            expires_at: now + Duration::days(expires_in_days),
            created_at: now,
            revoked_at: None,
        }
    }

    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Usable: not expired and not revoked.
    pub fn is_valid(&self) -> bool {
        !self.is_expired() && self.revoked_at.is_none()
    }
}
