//! Credential store boundary.
//!
//! Persistent storage is an external collaborator: the engine only talks
//! to this trait. Operations with correctness requirements under
//! concurrency (code consumption, passkey counters) are modeled as atomic
//! conditional updates here, not read-then-write sequences in callers.

pub mod memory;

use crate::models::{
    ApiKey, CeremonyChallenge, CeremonyPurpose, CodePurpose, OneTimeCode, OrgMembership, OrgRole,
    Organization, PasskeyCredential, RefreshTokenRecord, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use memory::InMemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    // Users
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn update_user(&self, user: &User) -> StoreResult<()>;
    async fn count_users(&self) -> StoreResult<u64>;

    // Organizations and memberships
    async fn insert_organization(&self, org: &Organization) -> StoreResult<()>;
    async fn find_organization(&self, id: Uuid) -> StoreResult<Option<Organization>>;
    async fn insert_membership(&self, membership: &OrgMembership) -> StoreResult<()>;
    async fn find_membership(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> StoreResult<Option<OrgMembership>>;
    async fn memberships_for_user(&self, user_id: Uuid) -> StoreResult<Vec<OrgMembership>>;

    // Refresh tokens
    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()>;
    async fn find_refresh_token(&self, id: Uuid) -> StoreResult<Option<RefreshTokenRecord>>;
    /// Stamp a single record revoked. Returns false when no record matched.
    async fn revoke_refresh_token(&self, id: Uuid) -> StoreResult<bool>;
    /// Revoke every live token for a principal. Returns the revoked count.
    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> StoreResult<u64>;

    // One-time codes
    async fn insert_code(&self, code: &OneTimeCode) -> StoreResult<()>;
    async fn find_code_by_id(&self, id: Uuid) -> StoreResult<Option<OneTimeCode>>;
    /// Most recent code for (email, purpose), used or not.
    async fn find_latest_code(
        &self,
        email: &str,
        purpose: CodePurpose,
    ) -> StoreResult<Option<OneTimeCode>>;
    /// Atomically mark a code used iff it is still unused.
    /// Returns true when this caller won the claim.
    async fn claim_code_if_unused(&self, id: Uuid) -> StoreResult<bool>;

    // Ceremony challenges
    async fn insert_challenge(&self, challenge: &CeremonyChallenge) -> StoreResult<()>;
    /// Remove and return the most recent non-expired challenge for
    /// (principal, purpose). Single use by construction.
    async fn take_challenge(
        &self,
        user_id: Option<Uuid>,
        purpose: CeremonyPurpose,
    ) -> StoreResult<Option<CeremonyChallenge>>;

    // Passkey credentials
    async fn insert_passkey(&self, credential: &PasskeyCredential) -> StoreResult<()>;
    async fn find_passkey(&self, credential_id: &str) -> StoreResult<Option<PasskeyCredential>>;
    async fn passkeys_for_user(&self, user_id: Uuid) -> StoreResult<Vec<PasskeyCredential>>;
    /// Compare-and-set on the signature counter: replaces the stored
    /// record iff its counter still equals `expected_counter`. Returns
    /// false when another authentication won the race.
    async fn update_passkey_if_counter(
        &self,
        updated: &PasskeyCredential,
        expected_counter: u32,
    ) -> StoreResult<bool>;

    // API keys
    async fn insert_api_key(&self, key: &ApiKey) -> StoreResult<()>;
    async fn find_api_key_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>>;
    async fn api_keys_for_org(&self, organization_id: Uuid) -> StoreResult<Vec<ApiKey>>;
    async fn touch_api_key(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;
    async fn revoke_api_key(&self, id: Uuid) -> StoreResult<bool>;
}

/// Resolve the membership role a principal holds in an organization,
/// ignoring inactive memberships.
pub async fn active_role(
    store: &dyn CredentialStore,
    user_id: Uuid,
    organization_id: Uuid,
) -> StoreResult<Option<OrgRole>> {
    Ok(store
        .find_membership(user_id, organization_id)
        .await?
        .filter(|m| m.is_active)
        .map(|m| m.role))
}
