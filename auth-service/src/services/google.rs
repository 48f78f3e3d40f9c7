//! Google OAuth sign-in.
//!
//! The remote access token is exchanged for a profile and dropped; only
//! the verified email and display name survive. First login provisions a
//! principal exactly like code-verified signup does.

use crate::models::{AuditEvent, SanitizedUser};
use crate::services::audit::{emit, AuditSink};
use crate::services::error::ServiceError;
use crate::services::provision::create_principal;
use crate::services::tokens::{SessionOptions, TokenIssuer, TokenResponse};
use crate::store::CredentialStore;
use crate::utils::password::random_password_hash;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Debug, Clone)]
pub struct RemoteProfile {
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
}

/// Upstream identity provider boundary; swapped for a stub in tests.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorize_url(&self, state: &str) -> String;
    async fn exchange_code(&self, code: &str) -> Result<RemoteProfile, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

pub struct GoogleIdentityProvider {
    http: reqwest::Client,
    config: GoogleConfig,
}

#[derive(Deserialize)]
struct TokenExchangeResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct UserInfoResponse {
    email: String,
    #[serde(default)]
    verified_email: bool,
    #[serde(default)]
    name: Option<String>,
}

impl GoogleIdentityProvider {
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn authorize_url(&self, state: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
            AUTH_ENDPOINT,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode("openid email profile"),
            urlencoding::encode(state),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<RemoteProfile, ServiceError> {
        let token: TokenExchangeResponse = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| ServiceError::ProviderError(format!("Token exchange failed: {}", e)))?
            .error_for_status()
            .map_err(|e| ServiceError::ProviderError(format!("Token exchange rejected: {}", e)))?
            .json()
            .await
            .map_err(|e| ServiceError::ProviderError(format!("Bad token response: {}", e)))?;

        let info: UserInfoResponse = self
            .http
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| ServiceError::ProviderError(format!("Userinfo fetch failed: {}", e)))?
            .error_for_status()
            .map_err(|e| ServiceError::ProviderError(format!("Userinfo rejected: {}", e)))?
            .json()
            .await
            .map_err(|e| ServiceError::ProviderError(format!("Bad userinfo response: {}", e)))?;

        Ok(RemoteProfile {
            email: info.email,
            email_verified: info.verified_email,
            name: info.name,
        })
    }
}

#[derive(Clone)]
pub struct GoogleAuthService {
    store: Arc<dyn CredentialStore>,
    issuer: TokenIssuer,
    provider: Arc<dyn IdentityProvider>,
    audit: Arc<dyn AuditSink>,
}

impl GoogleAuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        issuer: TokenIssuer,
        provider: Arc<dyn IdentityProvider>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            issuer,
            provider,
            audit,
        }
    }

    pub fn login_url(&self) -> String {
        self.provider.authorize_url(&uuid::Uuid::new_v4().to_string())
    }

    #[tracing::instrument(skip(self, code))]
    pub async fn handle_callback(
        &self,
        code: &str,
        client_id: &str,
    ) -> Result<(SanitizedUser, TokenResponse, bool), ServiceError> {
        let profile = self.provider.exchange_code(code).await?;
        if !profile.email_verified {
            return Err(ServiceError::ValidationError(
                "Provider has not verified this email address".to_string(),
            ));
        }

        let (user, is_new) = match self.store.find_user_by_email(&profile.email).await? {
            Some(user) => (user, false),
            None => {
                let hash = random_password_hash()?;
                let user = create_principal(
                    self.store.as_ref(),
                    &profile.email,
                    profile.name.clone(),
                    hash.into_string(),
                    true,
                )
                .await?;
                (user, true)
            }
        };
        if !user.is_active {
            return Err(ServiceError::AccountDisabled);
        }

        let tokens = self.issuer.issue(&user, SessionOptions::long(true)).await?;
        let action = if is_new { "google_signup" } else { "google_login" };
        emit(&self.audit, AuditEvent::success(action, Some(user.id), client_id));
        Ok((user.sanitized(), tokens, is_new))
    }
}
