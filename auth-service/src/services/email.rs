//! Outbound email boundary.
//!
//! Delivery is a capability trait so handlers and tests can swap the SMTP
//! transport for a mock. Sending happens off the async runtime via
//! `spawn_blocking` since lettre's SMTP transport here is synchronous.

use crate::models::CodePurpose;
use crate::services::error::ServiceError;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub from_email: String,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Deliver a one-time code together with its magic-link URL.
    async fn send_one_time_code(
        &self,
        to: &str,
        code: &str,
        link: &str,
        purpose: CodePurpose,
    ) -> Result<(), ServiceError>;

    async fn send_password_reset_code(&self, to: &str, code: &str) -> Result<(), ServiceError>;

    async fn send_welcome(&self, to: &str, name: &str) -> Result<(), ServiceError>;
}

pub struct SmtpEmailService {
    transport: Arc<SmtpTransport>,
    from_email: String,
}

impl SmtpEmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, ServiceError> {
        let credentials =
            Credentials::new(config.username.clone(), config.password.clone());
        let transport = SmtpTransport::relay(&config.host)
            .map_err(|e| ServiceError::EmailError(format!("SMTP relay setup failed: {}", e)))?
            .credentials(credentials)
            .build();

        Ok(Self {
            transport: Arc::new(transport),
            from_email: config.from_email.clone(),
        })
    }

    async fn deliver(&self, to: &str, subject: &str, body: String) -> Result<(), ServiceError> {
        let message = Message::builder()
            .from(
                self.from_email
                    .parse()
                    .map_err(|e| ServiceError::EmailError(format!("Invalid from address: {}", e)))?,
            )
            .to(to
                .parse()
                .map_err(|e| ServiceError::EmailError(format!("Invalid to address: {}", e)))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body)
            .map_err(|e| ServiceError::EmailError(format!("Message build failed: {}", e)))?;

        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| ServiceError::EmailError(format!("Send task failed: {}", e)))?
            .map_err(|e| ServiceError::EmailError(format!("SMTP send failed: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl EmailProvider for SmtpEmailService {
    async fn send_one_time_code(
        &self,
        to: &str,
        code: &str,
        link: &str,
        purpose: CodePurpose,
    ) -> Result<(), ServiceError> {
        let subject = match purpose {
            CodePurpose::Signup => "Confirm your email",
            CodePurpose::Login => "Your login code",
            CodePurpose::PasswordReset => "Your password reset code",
        };
        let body = format!(
            "<p>Your verification code is <strong>{code}</strong>.</p>\
             <p>Or use this link: <a href=\"{link}\">{link}</a></p>\
             <p>The code expires shortly. If you did not request it, ignore this email.</p>"
        );
        self.deliver(to, subject, body).await
    }

    async fn send_password_reset_code(&self, to: &str, code: &str) -> Result<(), ServiceError> {
        let body = format!(
            "<p>Your password reset code is <strong>{code}</strong>.</p>\
             <p>If you did not request a reset, you can ignore this email.</p>"
        );
        self.deliver(to, "Reset your password", body).await
    }

    async fn send_welcome(&self, to: &str, name: &str) -> Result<(), ServiceError> {
        let body = format!("<p>Welcome, {name}! Your account is ready.</p>");
        self.deliver(to, "Welcome", body).await
    }
}

/// No-op provider for development without SMTP credentials; logs instead
/// of sending.
pub struct MockEmailService;

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_one_time_code(
        &self,
        to: &str,
        code: &str,
        link: &str,
        purpose: CodePurpose,
    ) -> Result<(), ServiceError> {
        tracing::info!(to, code, link, ?purpose, "mock email: one-time code");
        Ok(())
    }

    async fn send_password_reset_code(&self, to: &str, code: &str) -> Result<(), ServiceError> {
        tracing::info!(to, code, "mock email: password reset code");
        Ok(())
    }

    async fn send_welcome(&self, to: &str, name: &str) -> Result<(), ServiceError> {
        tracing::info!(to, name, "mock email: welcome");
        Ok(())
    }
}
