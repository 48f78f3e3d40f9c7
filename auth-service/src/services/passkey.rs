//! WebAuthn passkey registration and authentication.
//!
//! Ceremony state is serialized into a stored challenge between the start
//! and finish calls; the store removes it on first use, so a challenge
//! cannot verify twice. Signature counters are enforced with a
//! compare-and-set update so concurrent assertions cannot both land.

use crate::models::{
    AuditEvent, CeremonyChallenge, CeremonyPurpose, PasskeyCredential, SanitizedUser, User,
};
use crate::models::passkey::encode_credential_id;
use crate::services::audit::{emit, AuditSink};
use crate::services::error::ServiceError;
use crate::services::rate_limit::AttemptLimiter;
use crate::services::tokens::{SessionOptions, TokenIssuer, TokenResponse};
use crate::store::CredentialStore;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use webauthn_rs::prelude::{
    CreationChallengeResponse, DiscoverableAuthentication, DiscoverableKey, PasskeyAuthentication,
    PasskeyRegistration, PublicKeyCredential, RegisterPublicKeyCredential,
    RequestChallengeResponse, Url, Webauthn, WebauthnBuilder,
};

#[derive(Debug, Clone)]
pub struct WebauthnConfig {
    pub rp_id: String,
    pub rp_origin: String,
    pub rp_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PasskeySummary {
    pub credential_id: String,
    pub device_name: Option<String>,
    pub backup_eligible: bool,
    pub last_used_at: Option<chrono::DateTime<Utc>>,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<&PasskeyCredential> for PasskeySummary {
    fn from(cred: &PasskeyCredential) -> Self {
        Self {
            credential_id: cred.credential_id.clone(),
            device_name: cred.device_name.clone(),
            backup_eligible: cred.backup_eligible,
            last_used_at: cred.last_used_at,
            created_at: cred.created_at,
        }
    }
}

#[derive(Clone)]
pub struct PasskeyService {
    store: Arc<dyn CredentialStore>,
    issuer: TokenIssuer,
    webauthn: Arc<Webauthn>,
    limiter: Arc<dyn AttemptLimiter>,
    audit: Arc<dyn AuditSink>,
}

impl PasskeyService {
    pub fn new(
        config: &WebauthnConfig,
        store: Arc<dyn CredentialStore>,
        issuer: TokenIssuer,
        limiter: Arc<dyn AttemptLimiter>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ServiceError> {
        let origin = Url::parse(&config.rp_origin).map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Invalid relying-party origin: {}", e))
        })?;
        let webauthn = WebauthnBuilder::new(&config.rp_id, &origin)
            .map_err(|e| {
                ServiceError::Internal(anyhow::anyhow!("Webauthn setup failed: {:?}", e))
            })?
            .rp_name(&config.rp_name)
            .build()
            .map_err(|e| {
                ServiceError::Internal(anyhow::anyhow!("Webauthn setup failed: {:?}", e))
            })?;

        Ok(Self {
            store,
            issuer,
            webauthn: Arc::new(webauthn),
            limiter,
            audit,
        })
    }

    /// Begin registration for an authenticated principal. Already
    /// registered credential ids are excluded from the challenge.
    #[tracing::instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn start_registration(
        &self,
        user: &User,
    ) -> Result<CreationChallengeResponse, ServiceError> {
        let existing = self.store.passkeys_for_user(user.id).await?;
        let exclude = if existing.is_empty() {
            None
        } else {
            Some(
                existing
                    .iter()
                    .map(|c| c.passkey.cred_id().clone())
                    .collect(),
            )
        };

        let display = user.name.clone().unwrap_or_else(|| user.email.clone());
        let (challenge, state) = self
            .webauthn
            .start_passkey_registration(user.id, &user.email, &display, exclude)
            .map_err(|e| {
                ServiceError::Internal(anyhow::anyhow!("Registration start failed: {:?}", e))
            })?;

        self.stash_state(CeremonyPurpose::Registration, Some(user.id), &state)
            .await?;
        Ok(challenge)
    }

    #[tracing::instrument(skip(self, user, credential), fields(user_id = %user.id))]
    pub async fn finish_registration(
        &self,
        user: &User,
        credential: RegisterPublicKeyCredential,
        device_name: Option<String>,
        client_id: &str,
    ) -> Result<PasskeySummary, ServiceError> {
        let challenge = self
            .store
            .take_challenge(Some(user.id), CeremonyPurpose::Registration)
            .await?
            .ok_or(ServiceError::ChallengeExpiredOrMissing)?;
        let state: PasskeyRegistration = serde_json::from_value(challenge.state)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Corrupt ceremony state: {}", e)))?;

        let passkey = self
            .webauthn
            .finish_passkey_registration(&credential, &state)
            .map_err(|e| {
                tracing::debug!(error = ?e, "passkey registration rejected");
                ServiceError::VerificationFailed
            })?;

        let record = PasskeyCredential::new(user.id, passkey, device_name);
        self.store.insert_passkey(&record).await?;

        emit(
            &self.audit,
            AuditEvent::success("passkey_registered", Some(user.id), client_id),
        );
        Ok(PasskeySummary::from(&record))
    }

    /// Begin authentication for a known email. Unknown addresses and
    /// principals without passkeys both map to the same generic failure.
    #[tracing::instrument(skip(self), fields(email = %email))]
    pub async fn start_authentication(
        &self,
        email: &str,
    ) -> Result<RequestChallengeResponse, ServiceError> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;
        let credentials = self.store.passkeys_for_user(user.id).await?;
        if credentials.is_empty() {
            return Err(ServiceError::InvalidCredentials);
        }

        let passkeys: Vec<_> = credentials.iter().map(|c| c.passkey.clone()).collect();
        let (challenge, state) = self
            .webauthn
            .start_passkey_authentication(&passkeys)
            .map_err(|e| {
                ServiceError::Internal(anyhow::anyhow!("Authentication start failed: {:?}", e))
            })?;

        self.stash_state(CeremonyPurpose::Authentication, Some(user.id), &state)
            .await?;
        Ok(challenge)
    }

    #[tracing::instrument(skip(self, credential_json), fields(email = %email))]
    pub async fn finish_authentication(
        &self,
        email: &str,
        credential_json: serde_json::Value,
        remember_me: bool,
        client_id: &str,
    ) -> Result<(SanitizedUser, TokenResponse), ServiceError> {
        self.limiter.check(client_id).await?;

        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;
        let challenge = self
            .store
            .take_challenge(Some(user.id), CeremonyPurpose::Authentication)
            .await?
            .ok_or(ServiceError::ChallengeExpiredOrMissing)?;
        let state: PasskeyAuthentication = serde_json::from_value(challenge.state)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Corrupt ceremony state: {}", e)))?;

        let credential: PublicKeyCredential =
            serde_json::from_value(credential_json).map_err(|e| {
                tracing::debug!(error = %e, "malformed credential payload");
                ServiceError::VerificationFailed
            })?;

        let result = self
            .webauthn
            .finish_passkey_authentication(&credential, &state)
            .map_err(|e| {
                emit(
                    &self.audit,
                    AuditEvent::failure("passkey_login_failed", Some(user.id), client_id),
                );
                tracing::debug!(error = ?e, "passkey assertion rejected");
                ServiceError::VerificationFailed
            })?;

        self.settle_authentication(user, &result, remember_me, client_id)
            .await
    }

    /// Begin a usernameless ceremony; the authenticator picks the
    /// credential and tells us who is signing in.
    pub async fn start_discoverable(&self) -> Result<RequestChallengeResponse, ServiceError> {
        let (challenge, state) = self
            .webauthn
            .start_discoverable_authentication()
            .map_err(|e| {
                ServiceError::Internal(anyhow::anyhow!("Discoverable start failed: {:?}", e))
            })?;

        self.stash_state(CeremonyPurpose::AuthenticationDiscoverable, None, &state)
            .await?;
        Ok(challenge)
    }

    #[tracing::instrument(skip(self, credential_json))]
    pub async fn finish_discoverable(
        &self,
        mut credential_json: serde_json::Value,
        remember_me: bool,
        client_id: &str,
    ) -> Result<(SanitizedUser, TokenResponse), ServiceError> {
        self.limiter.check(client_id).await?;

        normalize_user_handle(&mut credential_json)?;
        let credential: PublicKeyCredential =
            serde_json::from_value(credential_json).map_err(|e| {
                tracing::debug!(error = %e, "malformed credential payload");
                ServiceError::VerificationFailed
            })?;

        let challenge = self
            .store
            .take_challenge(None, CeremonyPurpose::AuthenticationDiscoverable)
            .await?
            .ok_or(ServiceError::ChallengeExpiredOrMissing)?;
        let state: DiscoverableAuthentication = serde_json::from_value(challenge.state)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Corrupt ceremony state: {}", e)))?;

        let (user_id, _cred_id) = self
            .webauthn
            .identify_discoverable_authentication(&credential)
            .map_err(|e| {
                tracing::debug!(error = ?e, "discoverable identify failed");
                ServiceError::VerificationFailed
            })?;

        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::CredentialNotFound)?;
        let credentials = self.store.passkeys_for_user(user.id).await?;
        if credentials.is_empty() {
            return Err(ServiceError::CredentialNotFound);
        }
        let keys: Vec<DiscoverableKey> = credentials.iter().map(|c| (&c.passkey).into()).collect();

        let result = self
            .webauthn
            .finish_discoverable_authentication(&credential, state, &keys)
            .map_err(|e| {
                emit(
                    &self.audit,
                    AuditEvent::failure("passkey_login_failed", Some(user.id), client_id),
                );
                tracing::debug!(error = ?e, "discoverable assertion rejected");
                ServiceError::VerificationFailed
            })?;

        self.settle_authentication(user, &result, remember_me, client_id)
            .await
    }

    pub async fn list_credentials(&self, user_id: Uuid) -> Result<Vec<PasskeySummary>, ServiceError> {
        let credentials = self.store.passkeys_for_user(user_id).await?;
        Ok(credentials.iter().map(PasskeySummary::from).collect())
    }

    /// Shared tail of both authentication flows: enforce the counter,
    /// persist the updated credential, issue tokens.
    async fn settle_authentication(
        &self,
        user: User,
        result: &webauthn_rs::prelude::AuthenticationResult,
        remember_me: bool,
        client_id: &str,
    ) -> Result<(SanitizedUser, TokenResponse), ServiceError> {
        if !user.is_active {
            return Err(ServiceError::AccountDisabled);
        }

        let credential_id = encode_credential_id(result.cred_id().as_ref());
        let mut stored = self
            .store
            .find_passkey(&credential_id)
            .await?
            .filter(|c| c.user_id == user.id)
            .ok_or(ServiceError::CredentialNotFound)?;

        // Zero stays zero for authenticators without a counter; any other
        // non-increase is a cloned-credential signal.
        let previous = stored.counter;
        let observed = result.counter();
        if observed <= previous && !(observed == 0 && previous == 0) {
            emit(
                &self.audit,
                AuditEvent::failure("passkey_counter_regression", Some(user.id), client_id),
            );
            tracing::warn!(
                credential_id = %credential_id,
                previous,
                observed,
                "passkey signature counter did not increase"
            );
            return Err(ServiceError::CounterRegression);
        }

        stored.passkey.update_credential(result);
        stored.counter = observed;
        stored.backup_eligible = result.backup_eligible();
        stored.last_used_at = Some(Utc::now());
        if !self
            .store
            .update_passkey_if_counter(&stored, previous)
            .await?
        {
            // Another assertion with this credential won the race.
            return Err(ServiceError::CounterRegression);
        }

        let tokens = self
            .issuer
            .issue(&user, SessionOptions::long(remember_me))
            .await?;
        emit(
            &self.audit,
            AuditEvent::success("passkey_login", Some(user.id), client_id),
        );
        Ok((user.sanitized(), tokens))
    }

    async fn stash_state<S: serde::Serialize>(
        &self,
        purpose: CeremonyPurpose,
        user_id: Option<Uuid>,
        state: &S,
    ) -> Result<(), ServiceError> {
        let state = serde_json::to_value(state).map_err(|e| {
            ServiceError::Internal(anyhow::anyhow!("Ceremony state serialization failed: {}", e))
        })?;
        let challenge = CeremonyChallenge::new(purpose, user_id, state);
        self.store.insert_challenge(&challenge).await?;
        Ok(())
    }
}

/// Some clients send `response.userHandle` as a raw byte array instead of
/// the base64url string the wire format requires. Convert the array form
/// in place; reject anything else that is not a string or null.
pub(crate) fn normalize_user_handle(
    credential: &mut serde_json::Value,
) -> Result<(), ServiceError> {
    let Some(handle) = credential
        .get_mut("response")
        .and_then(|r| r.get_mut("userHandle"))
    else {
        return Ok(());
    };

    match handle {
        serde_json::Value::Null | serde_json::Value::String(_) => Ok(()),
        serde_json::Value::Array(items) => {
            let mut bytes = Vec::with_capacity(items.len());
            for item in items.iter() {
                let byte = item
                    .as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or(ServiceError::VerificationFailed)?;
                bytes.push(byte);
            }
            *handle = serde_json::Value::String(URL_SAFE_NO_PAD.encode(bytes));
            Ok(())
        }
        _ => Err(ServiceError::VerificationFailed),
    }
}
