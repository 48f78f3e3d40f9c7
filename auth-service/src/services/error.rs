use crate::store::StoreError;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account disabled")]
    AccountDisabled,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid or expired code")]
    InvalidCode,

    #[error("Challenge expired or missing")]
    ChallengeExpiredOrMissing,

    #[error("Credential not found")]
    CredentialNotFound,

    #[error("Verification failed")]
    VerificationFailed,

    #[error("Credential counter regression")]
    CounterRegression,

    #[error("User not found")]
    UserNotFound,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many attempts")]
    RateLimited { retry_after: Option<u64> },

    #[error("Email error: {0}")]
    EmailError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Identity provider error: {0}")]
    ProviderError(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Store(e) => AppError::InternalError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            // Verification failures stay generic toward the caller;
            // the specific cause is logged and audited server-side.
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::AccountDisabled => {
                AppError::Forbidden(anyhow::anyhow!("Account is disabled"))
            }
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::InvalidToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
            }
            ServiceError::InvalidCode => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired code"))
            }
            ServiceError::ChallengeExpiredOrMissing => {
                AppError::Unauthorized(anyhow::anyhow!("Challenge expired or missing"))
            }
            ServiceError::CredentialNotFound => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::VerificationFailed => {
                AppError::Unauthorized(anyhow::anyhow!("Verification failed"))
            }
            ServiceError::CounterRegression => {
                AppError::Unauthorized(anyhow::anyhow!("Verification failed"))
            }
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::NotFound(what) => AppError::NotFound(anyhow::anyhow!(what)),
            ServiceError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            ServiceError::RateLimited { retry_after } => AppError::TooManyRequests(
                "Too many attempts. Please try again later.".to_string(),
                retry_after,
            ),
            ServiceError::EmailError(e) => {
                AppError::InternalError(anyhow::anyhow!("Email error: {}", e))
            }
            ServiceError::ValidationError(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::ProviderError(e) => AppError::BadGateway(e),
        }
    }
}
