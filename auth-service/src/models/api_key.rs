//! API key model - long-lived machine credentials.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

/// Fixed literal prefix; lets the request resolver classify a bearer
/// value as an API key without a store round-trip.
pub const API_KEY_PREFIX: &str = "qk_";
const API_KEY_FULL_PREFIX: &str = "qk_live_";
/// Display prefix length, includes the literal prefix
const DISPLAY_PREFIX_LEN: usize = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    /// First characters of the full key, for display
    pub prefix: String,
    /// SHA-256 hex hash of the full key
    pub key_hash: String,
    pub scopes: Vec<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Mint a new key. The full key is returned exactly once.
    pub fn generate(
        user_id: Uuid,
        organization_id: Uuid,
        name: String,
        scopes: Vec<String>,
    ) -> (Self, String) {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let full_key = format!("{}{}", API_KEY_FULL_PREFIX, URL_SAFE_NO_PAD.encode(raw));
        let prefix = full_key[..DISPLAY_PREFIX_LEN].to_string();

        let key = Self {
            id: Uuid::new_v4(),
            user_id,
            organization_id,
            name,
            prefix,
            key_hash: Self::hash_key(&full_key),
            scopes,
            last_used_at: None,
            revoked_at: None,
            created_at: Utc::now(),
        };
        (key, full_key)
    }

    pub fn hash_key(full_key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(full_key.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn sanitized(&self) -> ApiKeySummary {
        ApiKeySummary {
            id: self.id,
            name: self.name.clone(),
            prefix: self.prefix.clone(),
            scopes: self.scopes.clone(),
            last_used_at: self.last_used_at,
            revoked_at: self.revoked_at,
            created_at: self.created_at,
        }
    }
}

/// API key listing entry, never contains the key or its hash.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiKeySummary {
    pub id: Uuid,
    pub name: String,
    pub prefix: String,
    pub scopes: Vec<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
