//! API key minting and verification.
//!
//! The full key is shown once at mint time; only the SHA-256 hash and a
//! short display prefix are stored. Verification compares hashes in
//! constant time and stamps last use.

use crate::models::{ApiKey, ApiKeySummary, AuditEvent, User};
use crate::services::audit::{emit, AuditSink};
use crate::services::error::ServiceError;
use crate::store::CredentialStore;
use chrono::Utc;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

#[derive(Clone)]
pub struct ApiKeyService {
    store: Arc<dyn CredentialStore>,
    audit: Arc<dyn AuditSink>,
}

impl ApiKeyService {
    pub fn new(store: Arc<dyn CredentialStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Mint a key scoped to the caller's organization. Returns the
    /// summary and the full key string, which is never recoverable later.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn mint(
        &self,
        user: &User,
        organization_id: Uuid,
        name: String,
        scopes: Vec<String>,
    ) -> Result<(ApiKeySummary, String), ServiceError> {
        let (key, full_key) = ApiKey::generate(user.id, organization_id, name, scopes);
        self.store.insert_api_key(&key).await?;
        emit(
            &self.audit,
            AuditEvent::success("api_key_created", Some(user.id), "-"),
        );
        Ok((key.sanitized(), full_key))
    }

    /// Resolve a presented key to its record. Unknown, revoked, and
    /// malformed keys all fail the same way.
    pub async fn verify(&self, presented: &str) -> Result<ApiKey, ServiceError> {
        let presented_hash = ApiKey::hash_key(presented);
        let key = self
            .store
            .find_api_key_by_hash(&presented_hash)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        if key
            .key_hash
            .as_bytes()
            .ct_eq(presented_hash.as_bytes())
            .unwrap_u8()
            != 1
        {
            return Err(ServiceError::InvalidCredentials);
        }
        if key.is_revoked() {
            return Err(ServiceError::InvalidCredentials);
        }

        self.store.touch_api_key(key.id, Utc::now()).await?;
        Ok(key)
    }

    pub async fn list(&self, organization_id: Uuid) -> Result<Vec<ApiKeySummary>, ServiceError> {
        let keys = self.store.api_keys_for_org(organization_id).await?;
        Ok(keys.iter().map(ApiKey::sanitized).collect())
    }

    /// Revoking requires the acting user to own the key or hold the
    /// platform admin role, and the key must live in their active org.
    pub async fn revoke(&self, key_id: Uuid, acting_user: &User) -> Result<(), ServiceError> {
        let keys = self
            .store
            .api_keys_for_org(
                acting_user
                    .current_org_id
                    .ok_or_else(|| ServiceError::Forbidden("No active organization".to_string()))?,
            )
            .await?;
        let key = keys
            .into_iter()
            .find(|k| k.id == key_id)
            .ok_or_else(|| ServiceError::NotFound("API key not found".to_string()))?;

        if key.user_id != acting_user.id && !acting_user.is_admin() {
            return Err(ServiceError::Forbidden(
                "Only the key creator or an admin can revoke it".to_string(),
            ));
        }

        self.store.revoke_api_key(key.id).await?;
        emit(
            &self.audit,
            AuditEvent::success("api_key_revoked", Some(acting_user.id), "-"),
        );
        Ok(())
    }
}
