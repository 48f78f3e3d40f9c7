//! Password-based authentication and account lifecycle.
//!
//! Failure responses from login and reset never reveal whether an email is
//! registered: every verification failure is the same `InvalidCredentials`
//! and forgot-password always reports success.

use crate::models::{AuditEvent, CodePurpose, OneTimeCode, OrgMembership, SanitizedUser, User};
use crate::services::audit::{emit, AuditSink};
use crate::services::email::EmailProvider;
use crate::services::error::ServiceError;
use crate::services::provision::create_principal;
use crate::services::rate_limit::AttemptLimiter;
use crate::services::tokens::{SessionOptions, TokenIssuer, TokenResponse};
use crate::utils::password::{hash_password, verify_password, Password, PasswordHashString};
use crate::store::CredentialStore;
use std::sync::Arc;
use uuid::Uuid;

const RESET_CODE_EXPIRY_MINUTES: i64 = 15;

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    issuer: TokenIssuer,
    email: Arc<dyn EmailProvider>,
    limiter: Arc<dyn AttemptLimiter>,
    audit: Arc<dyn AuditSink>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        issuer: TokenIssuer,
        email: Arc<dyn EmailProvider>,
        limiter: Arc<dyn AttemptLimiter>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            issuer,
            email,
            limiter,
            audit,
        }
    }

    #[tracing::instrument(skip(self, password), fields(email = %email))]
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<String>,
        client_id: &str,
    ) -> Result<(SanitizedUser, TokenResponse), ServiceError> {
        if self.store.find_user_by_email(email).await?.is_some() {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        let password = Password::new(password.to_string());
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Hash task failed: {}", e)))??;

        let user =
            create_principal(self.store.as_ref(), email, name, password_hash.into_string(), false)
                .await?;

        let tokens = self.issuer.issue(&user, SessionOptions::default()).await?;
        emit(&self.audit, AuditEvent::success("register", Some(user.id), client_id));
        Ok((user.sanitized(), tokens))
    }

    #[tracing::instrument(skip(self, password), fields(email = %email))]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        remember_me: bool,
        client_id: &str,
    ) -> Result<(SanitizedUser, TokenResponse), ServiceError> {
        self.limiter.check(client_id).await?;

        let mut user = match self.store.find_user_by_email(email).await? {
            Some(user) => user,
            None => {
                emit(&self.audit, AuditEvent::failure("login_failed", None, client_id));
                return Err(ServiceError::InvalidCredentials);
            }
        };

        let candidate = Password::new(password.to_string());
        let stored = PasswordHashString::new(user.password_hash.clone());
        let verified =
            tokio::task::spawn_blocking(move || verify_password(&candidate, &stored).is_ok())
                .await
                .map_err(|e| {
                    ServiceError::Internal(anyhow::anyhow!("Verify task failed: {}", e))
                })?;
        if !verified {
            emit(
                &self.audit,
                AuditEvent::failure("login_failed", Some(user.id), client_id),
            );
            return Err(ServiceError::InvalidCredentials);
        }

        if !user.is_active {
            emit(
                &self.audit,
                AuditEvent::failure("login_disabled", Some(user.id), client_id),
            );
            return Err(ServiceError::AccountDisabled);
        }

        let is_admin = user.is_admin();
        self.repair_active_org(&mut user, is_admin).await?;

        let tokens = self
            .issuer
            .issue(&user, SessionOptions::remembered(remember_me))
            .await?;
        emit(&self.audit, AuditEvent::success("login", Some(user.id), client_id));
        Ok((user.sanitized(), tokens))
    }

    /// Idempotent: succeeds whether or not the token was live.
    pub async fn logout(&self, refresh_token: &str, client_id: &str) -> Result<(), ServiceError> {
        self.issuer.revoke(refresh_token).await?;
        emit(&self.audit, AuditEvent::success("logout", None, client_id));
        Ok(())
    }

    pub async fn refresh(
        &self,
        refresh_token: &str,
    ) -> Result<(SanitizedUser, TokenResponse), ServiceError> {
        let (user, tokens) = self.issuer.refresh(refresh_token).await?;
        Ok((user.sanitized(), tokens))
    }

    pub async fn me(
        &self,
        user_id: Uuid,
    ) -> Result<(SanitizedUser, Vec<OrgMembership>), ServiceError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;
        let memberships = self.store.memberships_for_user(user_id).await?;
        Ok((user.sanitized(), memberships))
    }

    /// Changing the password ends every other session.
    #[tracing::instrument(skip(self, current_password, new_password))]
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
        client_id: &str,
    ) -> Result<(), ServiceError> {
        self.limiter.check(client_id).await?;

        let mut user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        let candidate = Password::new(current_password.to_string());
        let stored = PasswordHashString::new(user.password_hash.clone());
        let verified =
            tokio::task::spawn_blocking(move || verify_password(&candidate, &stored).is_ok())
                .await
                .map_err(|e| {
                    ServiceError::Internal(anyhow::anyhow!("Verify task failed: {}", e))
                })?;
        if !verified {
            emit(
                &self.audit,
                AuditEvent::failure("password_change_failed", Some(user.id), client_id),
            );
            return Err(ServiceError::InvalidCredentials);
        }

        let new_password = Password::new(new_password.to_string());
        let new_hash = tokio::task::spawn_blocking(move || hash_password(&new_password))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Hash task failed: {}", e)))??;

        user.password_hash = new_hash.into_string();
        user.updated_at = chrono::Utc::now();
        self.store.update_user(&user).await?;
        self.issuer.revoke_all(user.id).await?;

        emit(
            &self.audit,
            AuditEvent::success("password_change", Some(user.id), client_id),
        );
        Ok(())
    }

    /// Switch the active organization and reissue tokens carrying the new
    /// org claims. Requires an active membership in an active org.
    pub async fn switch_organization(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<(SanitizedUser, TokenResponse), ServiceError> {
        let mut user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        let membership = self
            .store
            .find_membership(user_id, organization_id)
            .await?
            .filter(|m| m.is_active)
            .ok_or_else(|| {
                ServiceError::Forbidden("No active membership in that organization".to_string())
            })?;
        let org = self
            .store
            .find_organization(membership.organization_id)
            .await?
            .filter(|o| o.is_active)
            .ok_or_else(|| {
                ServiceError::Forbidden("Organization is not active".to_string())
            })?;

        user.current_org_id = Some(org.id);
        user.updated_at = chrono::Utc::now();
        self.store.update_user(&user).await?;

        let tokens = self.issuer.issue(&user, SessionOptions::default()).await?;
        Ok((user.sanitized(), tokens))
    }

    /// Always reports success so the endpoint cannot be used to discover
    /// which addresses are registered.
    #[tracing::instrument(skip(self), fields(email = %email))]
    pub async fn forgot_password(&self, email: &str, client_id: &str) -> Result<(), ServiceError> {
        if let Some(user) = self.store.find_user_by_email(email).await? {
            let code = OneTimeCode::new(
                user.email.clone(),
                Some(user.id),
                CodePurpose::PasswordReset,
                None,
                RESET_CODE_EXPIRY_MINUTES,
            );
            self.store.insert_code(&code).await?;
            self.email
                .send_password_reset_code(&user.email, &code.code)
                .await?;
            emit(
                &self.audit,
                AuditEvent::success("password_reset_requested", Some(user.id), client_id),
            );
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, code, new_password), fields(email = %email))]
    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
        client_id: &str,
    ) -> Result<(), ServiceError> {
        self.limiter.check(client_id).await?;

        let latest = self
            .store
            .find_latest_code(email, CodePurpose::PasswordReset)
            .await?
            .ok_or_else(|| self.reset_failure(None, client_id))?;
        if latest.code != code || !latest.is_valid() {
            return Err(self.reset_failure(latest.user_id, client_id));
        }
        if !self.store.claim_code_if_unused(latest.id).await? {
            return Err(self.reset_failure(latest.user_id, client_id));
        }

        let mut user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(ServiceError::InvalidCode)?;

        let new_password = Password::new(new_password.to_string());
        let new_hash = tokio::task::spawn_blocking(move || hash_password(&new_password))
            .await
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Hash task failed: {}", e)))??;

        user.password_hash = new_hash.into_string();
        user.updated_at = chrono::Utc::now();
        self.store.update_user(&user).await?;
        self.issuer.revoke_all(user.id).await?;

        emit(
            &self.audit,
            AuditEvent::success("password_reset", Some(user.id), client_id),
        );
        Ok(())
    }

    pub async fn complete_onboarding(&self, user_id: Uuid) -> Result<SanitizedUser, ServiceError> {
        let mut user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        let memberships = self.store.memberships_for_user(user_id).await?;
        if memberships.iter().filter(|m| m.is_active).count() == 0 {
            return Err(ServiceError::ValidationError(
                "Onboarding requires at least one organization membership".to_string(),
            ));
        }

        user.onboarding_completed = true;
        user.updated_at = chrono::Utc::now();
        self.store.update_user(&user).await?;
        Ok(user.sanitized())
    }

    fn reset_failure(&self, user_id: Option<Uuid>, client_id: &str) -> ServiceError {
        emit(
            &self.audit,
            AuditEvent::failure("password_reset_failed", user_id, client_id),
        );
        ServiceError::InvalidCode
    }

    /// Backfill a missing active org from the first active membership.
    /// Applied on every login for elevated principals and on magic-link
    /// logins for everyone.
    pub(crate) async fn repair_active_org(
        &self,
        user: &mut User,
        apply: bool,
    ) -> Result<(), ServiceError> {
        if !apply || user.current_org_id.is_some() {
            return Ok(());
        }
        if let Some(membership) = self
            .store
            .memberships_for_user(user.id)
            .await?
            .into_iter()
            .find(|m| m.is_active)
        {
            user.current_org_id = Some(membership.organization_id);
            user.updated_at = chrono::Utc::now();
            self.store.update_user(user).await?;
        }
        Ok(())
    }
}
