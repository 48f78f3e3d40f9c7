//! Email one-time-code flows: signup, login, and magic links.
//!
//! Requesting a login code for an unknown address silently issues a
//! signup code instead and returns the same response, so the request
//! endpoints never reveal whether an email is registered. Magic-link
//! tokens only reference a stored code; the stored code's used/expired
//! state stays authoritative no matter how the code reaches us.

use crate::models::{AuditEvent, CodePurpose, OneTimeCode, SanitizedUser, User};
use crate::services::audit::{emit, AuditSink};
use crate::services::auth::AuthService;
use crate::services::email::EmailProvider;
use crate::services::error::ServiceError;
use crate::services::provision::create_principal;
use crate::services::rate_limit::AttemptLimiter;
use crate::services::tokens::{SessionOptions, TokenIssuer, TokenResponse};
use crate::store::CredentialStore;
use crate::utils::password::random_password_hash;
use std::sync::Arc;

const CODE_EXPIRY_MINUTES: i64 = 10;

#[derive(Clone)]
pub struct OtpService {
    store: Arc<dyn CredentialStore>,
    issuer: TokenIssuer,
    auth: AuthService,
    email: Arc<dyn EmailProvider>,
    limiter: Arc<dyn AttemptLimiter>,
    audit: Arc<dyn AuditSink>,
    frontend_url: String,
    /// Operator bypass code for login verification; never consumes a
    /// stored code. Unset in production unless explicitly configured.
    recovery_code: Option<String>,
}

impl OtpService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        issuer: TokenIssuer,
        auth: AuthService,
        email: Arc<dyn EmailProvider>,
        limiter: Arc<dyn AttemptLimiter>,
        audit: Arc<dyn AuditSink>,
        frontend_url: String,
        recovery_code: Option<String>,
    ) -> Self {
        Self {
            store,
            issuer,
            auth,
            email,
            limiter,
            audit,
            frontend_url,
            recovery_code,
        }
    }

    #[tracing::instrument(skip(self), fields(email = %email))]
    pub async fn request_signup_code(
        &self,
        email: &str,
        name: Option<String>,
    ) -> Result<(), ServiceError> {
        if self.store.find_user_by_email(email).await?.is_some() {
            return Err(ServiceError::EmailAlreadyRegistered);
        }
        self.issue_code(email, None, CodePurpose::Signup, name).await
    }

    /// Unknown addresses get a signup code with an identical response.
    #[tracing::instrument(skip(self), fields(email = %email))]
    pub async fn request_login_code(&self, email: &str) -> Result<(), ServiceError> {
        match self.store.find_user_by_email(email).await? {
            Some(user) => {
                self.issue_code(&user.email, Some(user.id), CodePurpose::Login, None)
                    .await
            }
            None => self.issue_code(email, None, CodePurpose::Signup, None).await,
        }
    }

    #[tracing::instrument(skip(self, code), fields(email = %email))]
    pub async fn verify_signup_code(
        &self,
        email: &str,
        code: &str,
        client_id: &str,
    ) -> Result<(SanitizedUser, TokenResponse), ServiceError> {
        self.limiter.check(client_id).await?;

        let latest = self.claim_matching_code(email, code, CodePurpose::Signup, client_id).await?;
        let user = self.create_from_signup_code(&latest).await?;

        let tokens = self.issuer.issue(&user, SessionOptions::long(true)).await?;
        emit(&self.audit, AuditEvent::success("signup_otp", Some(user.id), client_id));
        Ok((user.sanitized(), tokens))
    }

    #[tracing::instrument(skip(self, code), fields(email = %email))]
    pub async fn verify_login_code(
        &self,
        email: &str,
        code: &str,
        remember_me: bool,
        client_id: &str,
    ) -> Result<(SanitizedUser, TokenResponse), ServiceError> {
        self.limiter.check(client_id).await?;

        if let Some(recovery) = &self.recovery_code {
            if !recovery.is_empty() && recovery == code {
                return self.recovery_login(email, client_id).await;
            }
        }

        // A user who was sent a signup fallback code verifies here too.
        let purpose = if self.store.find_user_by_email(email).await?.is_some() {
            CodePurpose::Login
        } else {
            CodePurpose::Signup
        };
        let latest = self.claim_matching_code(email, code, purpose, client_id).await?;

        let mut user = match self.store.find_user_by_email(email).await? {
            Some(user) => user,
            None => self.create_from_signup_code(&latest).await?,
        };
        if !user.is_active {
            return Err(ServiceError::AccountDisabled);
        }
        self.auth.repair_active_org(&mut user, true).await?;

        let tokens = self
            .issuer
            .issue(&user, SessionOptions::long(remember_me))
            .await?;
        emit(&self.audit, AuditEvent::success("login_otp", Some(user.id), client_id));
        Ok((user.sanitized(), tokens))
    }

    /// Verify a magic-link token. The token names a stored code by id;
    /// validity is decided by claiming that code, so a link and its code
    /// cannot both be redeemed.
    #[tracing::instrument(skip(self, token))]
    pub async fn verify_magic_link(
        &self,
        token: &str,
        client_id: &str,
    ) -> Result<(SanitizedUser, TokenResponse), ServiceError> {
        self.limiter.check(client_id).await?;

        let claims = self
            .issuer
            .jwt()
            .validate_magic_link_token(token)
            .map_err(|_| self.verify_failure(client_id))?;

        let record = self
            .store
            .find_code_by_id(claims.code_id)
            .await?
            .ok_or_else(|| self.verify_failure(client_id))?;
        if !record.is_valid() || !record.email.eq_ignore_ascii_case(&claims.email) {
            return Err(self.verify_failure(client_id));
        }
        if !self.store.claim_code_if_unused(record.id).await? {
            return Err(self.verify_failure(client_id));
        }

        let mut user = match self.store.find_user_by_email(&record.email).await? {
            Some(user) => user,
            None if record.purpose == CodePurpose::Signup => {
                self.create_from_signup_code(&record).await?
            }
            None => return Err(ServiceError::InvalidCode),
        };
        if !user.is_active {
            return Err(ServiceError::AccountDisabled);
        }
        self.auth.repair_active_org(&mut user, true).await?;

        let tokens = self.issuer.issue(&user, SessionOptions::long(true)).await?;
        emit(
            &self.audit,
            AuditEvent::success("magic_link_login", Some(user.id), client_id),
        );
        Ok((user.sanitized(), tokens))
    }

    async fn issue_code(
        &self,
        email: &str,
        user_id: Option<uuid::Uuid>,
        purpose: CodePurpose,
        name: Option<String>,
    ) -> Result<(), ServiceError> {
        let code = OneTimeCode::new(
            email.to_lowercase(),
            user_id,
            purpose,
            name.clone(),
            CODE_EXPIRY_MINUTES,
        );
        self.store.insert_code(&code).await?;

        let link_token = self
            .issuer
            .jwt()
            .generate_magic_link_token(&code.email, code.id, purpose, name)?;
        let link = format!(
            "{}/auth/verify?token={}",
            self.frontend_url.trim_end_matches('/'),
            urlencoding::encode(&link_token)
        );
        self.email
            .send_one_time_code(&code.email, &code.code, &link, purpose)
            .await
    }

    async fn claim_matching_code(
        &self,
        email: &str,
        code: &str,
        purpose: CodePurpose,
        client_id: &str,
    ) -> Result<OneTimeCode, ServiceError> {
        let latest = self
            .store
            .find_latest_code(email, purpose)
            .await?
            .ok_or_else(|| self.verify_failure(client_id))?;
        if latest.code != code || !latest.is_valid() {
            return Err(self.verify_failure(client_id));
        }
        if !self.store.claim_code_if_unused(latest.id).await? {
            return Err(self.verify_failure(client_id));
        }
        Ok(latest)
    }

    async fn create_from_signup_code(&self, code: &OneTimeCode) -> Result<User, ServiceError> {
        let hash = random_password_hash()?;
        create_principal(
            self.store.as_ref(),
            &code.email,
            code.pending_name.clone(),
            hash.into_string(),
            true,
        )
        .await
    }

    async fn recovery_login(
        &self,
        email: &str,
        client_id: &str,
    ) -> Result<(SanitizedUser, TokenResponse), ServiceError> {
        let mut user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or_else(|| self.verify_failure(client_id))?;
        if !user.is_active {
            return Err(ServiceError::AccountDisabled);
        }
        self.auth.repair_active_org(&mut user, true).await?;

        tracing::warn!(user_id = %user.id, "recovery code used for login");
        emit(
            &self.audit,
            AuditEvent::success("recovery_code_login", Some(user.id), client_id),
        );

        let tokens = self.issuer.issue(&user, SessionOptions::long(false)).await?;
        Ok((user.sanitized(), tokens))
    }

    fn verify_failure(&self, client_id: &str) -> ServiceError {
        emit(
            &self.audit,
            AuditEvent::failure("otp_verify_failed", None, client_id),
        );
        ServiceError::InvalidCode
    }
}
