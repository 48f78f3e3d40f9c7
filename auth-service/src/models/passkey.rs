//! Passkey credential and ceremony challenge models.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webauthn_rs::prelude::Passkey;

/// Challenge lifetime; a ceremony must complete within this window.
pub const CHALLENGE_EXPIRY_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyPurpose {
    Registration,
    Authentication,
    AuthenticationDiscoverable,
}

/// Serialized in-flight ceremony state. One live challenge per
/// (principal, purpose) in normal operation; deleted after verify.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CeremonyChallenge {
    pub id: Uuid,
    pub purpose: CeremonyPurpose,
    /// Absent for discoverable authentication
    pub user_id: Option<Uuid>,
    /// Serialized webauthn ceremony state
    pub state: serde_json::Value,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CeremonyChallenge {
    pub fn new(purpose: CeremonyPurpose, user_id: Option<Uuid>, state: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            purpose,
            user_id,
            state,
            expires_at: Utc::now() + Duration::minutes(CHALLENGE_EXPIRY_MINUTES),
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Stored public-key credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasskeyCredential {
    pub user_id: Uuid,
    /// base64url credential id, the lookup key
    pub credential_id: String,
    /// Full passkey (COSE public key and verification policy)
    pub passkey: Passkey,
    /// Signature counter; must strictly increase across uses
    pub counter: u32,
    pub device_name: Option<String>,
    pub backup_eligible: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PasskeyCredential {
    pub fn new(user_id: Uuid, passkey: Passkey, device_name: Option<String>) -> Self {
        let credential_id = encode_credential_id(passkey.cred_id().as_ref());
        Self {
            user_id,
            credential_id,
            passkey,
            counter: 0,
            device_name,
            backup_eligible: false,
            last_used_at: None,
            created_at: Utc::now(),
        }
    }
}

pub fn encode_credential_id(raw: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_challenge_not_expired() {
        let challenge = CeremonyChallenge::new(
            CeremonyPurpose::Registration,
            Some(Uuid::new_v4()),
            serde_json::json!({"challenge": "abc"}),
        );
        assert!(!challenge.is_expired());
    }

    #[test]
    fn test_challenge_expiry() {
        let mut challenge = CeremonyChallenge::new(
            CeremonyPurpose::AuthenticationDiscoverable,
            None,
            serde_json::Value::Null,
        );
        challenge.expires_at = Utc::now() - Duration::seconds(1);
        assert!(challenge.is_expired());
    }

    #[test]
    fn test_credential_id_encoding() {
        assert_eq!(encode_credential_id(&[0xde, 0xad, 0xbe, 0xef]), "3q2-7w");
    }
}
