//! DashMap-backed store used by tests and development bootstrap.
//!
//! The conditional updates (`claim_code_if_unused`,
//! `update_passkey_if_counter`) rely on DashMap's per-entry locking:
//! `get_mut` holds the shard lock for the duration of the check-and-write,
//! which gives the claim-if-unused semantics the trait requires.

use super::{CredentialStore, StoreError, StoreResult};
use crate::models::{
    ApiKey, CeremonyChallenge, CeremonyPurpose, CodePurpose, OneTimeCode, OrgMembership,
    Organization, PasskeyCredential, RefreshTokenRecord, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryStore {
    users: DashMap<Uuid, User>,
    organizations: DashMap<Uuid, Organization>,
    memberships: DashMap<(Uuid, Uuid), OrgMembership>,
    refresh_tokens: DashMap<Uuid, RefreshTokenRecord>,
    codes: DashMap<Uuid, OneTimeCode>,
    challenges: DashMap<Uuid, CeremonyChallenge>,
    passkeys: DashMap<String, PasskeyCredential>,
    api_keys: DashMap<Uuid, ApiKey>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let email = user.email.to_lowercase();
        if self
            .users
            .iter()
            .any(|u| u.value().email.to_lowercase() == email)
        {
            return Err(StoreError::Conflict(format!(
                "email already registered: {}",
                user.email
            )));
        }
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.to_lowercase();
        Ok(self
            .users
            .iter()
            .find(|u| u.value().email.to_lowercase() == email)
            .map(|u| u.value().clone()))
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        self.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn count_users(&self) -> StoreResult<u64> {
        Ok(self.users.len() as u64)
    }

    async fn insert_organization(&self, org: &Organization) -> StoreResult<()> {
        self.organizations.insert(org.id, org.clone());
        Ok(())
    }

    async fn find_organization(&self, id: Uuid) -> StoreResult<Option<Organization>> {
        Ok(self.organizations.get(&id).map(|o| o.clone()))
    }

    async fn insert_membership(&self, membership: &OrgMembership) -> StoreResult<()> {
        self.memberships.insert(
            (membership.user_id, membership.organization_id),
            membership.clone(),
        );
        Ok(())
    }

    async fn find_membership(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> StoreResult<Option<OrgMembership>> {
        Ok(self
            .memberships
            .get(&(user_id, organization_id))
            .map(|m| m.clone()))
    }

    async fn memberships_for_user(&self, user_id: Uuid) -> StoreResult<Vec<OrgMembership>> {
        let mut out: Vec<OrgMembership> = self
            .memberships
            .iter()
            .filter(|m| m.value().user_id == user_id)
            .map(|m| m.value().clone())
            .collect();
        out.sort_by_key(|m| m.created_at);
        Ok(out)
    }

    async fn insert_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
        self.refresh_tokens.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_refresh_token(&self, id: Uuid) -> StoreResult<Option<RefreshTokenRecord>> {
        Ok(self.refresh_tokens.get(&id).map(|r| r.clone()))
    }

    async fn revoke_refresh_token(&self, id: Uuid) -> StoreResult<bool> {
        match self.refresh_tokens.get_mut(&id) {
            Some(mut record) => {
                if record.revoked_at.is_none() {
                    record.revoked_at = Some(Utc::now());
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_all_refresh_tokens(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut revoked = 0;
        for mut entry in self.refresh_tokens.iter_mut() {
            let record = entry.value_mut();
            if record.user_id == user_id && record.revoked_at.is_none() {
                record.revoked_at = Some(Utc::now());
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn insert_code(&self, code: &OneTimeCode) -> StoreResult<()> {
        self.codes.insert(code.id, code.clone());
        Ok(())
    }

    async fn find_code_by_id(&self, id: Uuid) -> StoreResult<Option<OneTimeCode>> {
        Ok(self.codes.get(&id).map(|c| c.clone()))
    }

    async fn find_latest_code(
        &self,
        email: &str,
        purpose: CodePurpose,
    ) -> StoreResult<Option<OneTimeCode>> {
        let email = email.to_lowercase();
        Ok(self
            .codes
            .iter()
            .filter(|c| {
                c.value().email.to_lowercase() == email && c.value().purpose == purpose
            })
            .max_by_key(|c| c.value().created_at)
            .map(|c| c.value().clone()))
    }

    async fn claim_code_if_unused(&self, id: Uuid) -> StoreResult<bool> {
        match self.codes.get_mut(&id) {
            Some(mut code) if !code.used => {
                code.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_challenge(&self, challenge: &CeremonyChallenge) -> StoreResult<()> {
        self.challenges.insert(challenge.id, challenge.clone());
        Ok(())
    }

    async fn take_challenge(
        &self,
        user_id: Option<Uuid>,
        purpose: CeremonyPurpose,
    ) -> StoreResult<Option<CeremonyChallenge>> {
        let candidate = self
            .challenges
            .iter()
            .filter(|c| {
                c.value().purpose == purpose
                    && c.value().user_id == user_id
                    && !c.value().is_expired()
            })
            .max_by_key(|c| c.value().created_at)
            .map(|c| *c.key());

        Ok(candidate.and_then(|id| self.challenges.remove(&id).map(|(_, c)| c)))
    }

    async fn insert_passkey(&self, credential: &PasskeyCredential) -> StoreResult<()> {
        self.passkeys
            .insert(credential.credential_id.clone(), credential.clone());
        Ok(())
    }

    async fn find_passkey(&self, credential_id: &str) -> StoreResult<Option<PasskeyCredential>> {
        Ok(self.passkeys.get(credential_id).map(|p| p.clone()))
    }

    async fn passkeys_for_user(&self, user_id: Uuid) -> StoreResult<Vec<PasskeyCredential>> {
        Ok(self
            .passkeys
            .iter()
            .filter(|p| p.value().user_id == user_id)
            .map(|p| p.value().clone())
            .collect())
    }

    async fn update_passkey_if_counter(
        &self,
        updated: &PasskeyCredential,
        expected_counter: u32,
    ) -> StoreResult<bool> {
        match self.passkeys.get_mut(&updated.credential_id) {
            Some(mut stored) if stored.counter == expected_counter => {
                *stored = updated.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::Backend(format!(
                "passkey vanished during update: {}",
                updated.credential_id
            ))),
        }
    }

    async fn insert_api_key(&self, key: &ApiKey) -> StoreResult<()> {
        self.api_keys.insert(key.id, key.clone());
        Ok(())
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> StoreResult<Option<ApiKey>> {
        Ok(self
            .api_keys
            .iter()
            .find(|k| k.value().key_hash == key_hash)
            .map(|k| k.value().clone()))
    }

    async fn api_keys_for_org(&self, organization_id: Uuid) -> StoreResult<Vec<ApiKey>> {
        let mut out: Vec<ApiKey> = self
            .api_keys
            .iter()
            .filter(|k| k.value().organization_id == organization_id)
            .map(|k| k.value().clone())
            .collect();
        out.sort_by_key(|k| k.created_at);
        Ok(out)
    }

    async fn touch_api_key(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(mut key) = self.api_keys.get_mut(&id) {
            key.last_used_at = Some(at);
        }
        Ok(())
    }

    async fn revoke_api_key(&self, id: Uuid) -> StoreResult<bool> {
        match self.api_keys.get_mut(&id) {
            Some(mut key) => {
                if key.revoked_at.is_none() {
                    key.revoked_at = Some(Utc::now());
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    fn user(email: &str) -> User {
        User::new(email.to_string(), "$argon2id$x".to_string(), None, UserRole::User)
    }

    // A minimal ES256 passkey assembled through serde; real credentials
    // only come out of a registration ceremony.
    fn stored_passkey(counter: u32) -> PasskeyCredential {
        let passkey: webauthn_rs::prelude::Passkey = serde_json::from_value(serde_json::json!({
            "cred": {
                "cred_id": "dGVzdC1jcmVkZW50aWFs",
                "cred": {
                    "type_": "ES256",
                    "key": {
                        "EC_EC2": {
                            "curve": "SECP256R1",
                            "x": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
                            "y": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"
                        }
                    }
                },
                "counter": counter,
                "transports": null,
                "user_verified": true,
                "backup_eligible": false,
                "backup_state": false,
                "registration_policy": "required",
                "extensions": {},
                "attestation": { "data": "None", "metadata": "None" },
                "attestation_format": "none"
            }
        }))
        .expect("passkey fixture");
        let mut credential =
            PasskeyCredential::new(Uuid::new_v4(), passkey, Some("test key".to_string()));
        credential.counter = counter;
        credential
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = InMemoryStore::new();
        store.insert_user(&user("a@example.com")).await.unwrap();
        let err = store.insert_user(&user("A@Example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_claim_code_is_single_winner() {
        let store = InMemoryStore::new();
        let code = OneTimeCode::new(
            "a@example.com".to_string(),
            None,
            CodePurpose::Login,
            None,
            10,
        );
        store.insert_code(&code).await.unwrap();

        assert!(store.claim_code_if_unused(code.id).await.unwrap());
        assert!(!store.claim_code_if_unused(code.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_take_challenge_is_single_use() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        let challenge = CeremonyChallenge::new(
            CeremonyPurpose::Registration,
            Some(user_id),
            serde_json::Value::Null,
        );
        store.insert_challenge(&challenge).await.unwrap();

        let taken = store
            .take_challenge(Some(user_id), CeremonyPurpose::Registration)
            .await
            .unwrap();
        assert!(taken.is_some());

        let again = store
            .take_challenge(Some(user_id), CeremonyPurpose::Registration)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_take_challenge_skips_expired() {
        let store = InMemoryStore::new();
        let mut challenge = CeremonyChallenge::new(
            CeremonyPurpose::AuthenticationDiscoverable,
            None,
            serde_json::Value::Null,
        );
        challenge.expires_at = Utc::now() - chrono::Duration::seconds(1);
        store.insert_challenge(&challenge).await.unwrap();

        let taken = store
            .take_challenge(None, CeremonyPurpose::AuthenticationDiscoverable)
            .await
            .unwrap();
        assert!(taken.is_none());
    }

    #[tokio::test]
    async fn test_revoke_all_refresh_tokens_counts() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        for i in 0..3 {
            let record = RefreshTokenRecord::new_with_id(
                Uuid::new_v4(),
                user_id,
                &format!("tok-{i}"),
                7,
            );
            store.insert_refresh_token(&record).await.unwrap();
        }

        assert_eq!(store.revoke_all_refresh_tokens(user_id).await.unwrap(), 3);
        // Second pass revokes nothing new
        assert_eq!(store.revoke_all_refresh_tokens(user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_passkey_counter_update_rejects_stale_expectation() {
        let store = InMemoryStore::new();
        let credential = stored_passkey(5);
        store.insert_passkey(&credential).await.unwrap();

        let mut updated = credential.clone();
        updated.counter = 6;

        // A stale expected counter loses and leaves the record untouched
        assert!(!store.update_passkey_if_counter(&updated, 4).await.unwrap());
        let stored = store
            .find_passkey(&credential.credential_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.counter, 5);

        assert!(store.update_passkey_if_counter(&updated, 5).await.unwrap());
        let stored = store
            .find_passkey(&credential.credential_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.counter, 6);
    }

    #[tokio::test]
    async fn test_passkey_counter_update_is_single_winner() {
        let store = InMemoryStore::new();
        let credential = stored_passkey(3);
        store.insert_passkey(&credential).await.unwrap();

        let mut updated = credential.clone();
        updated.counter = 4;

        // Two authentications settling from the same observed counter:
        // only the first wins
        assert!(store.update_passkey_if_counter(&updated, 3).await.unwrap());
        assert!(!store.update_passkey_if_counter(&updated, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_passkey_counter_update_missing_credential_errors() {
        let store = InMemoryStore::new();
        let credential = stored_passkey(0);
        let err = store
            .update_passkey_if_counter(&credential, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
