pub mod api_key;
pub mod audit;
pub mod auth;
pub mod email;
pub mod error;
pub mod google;
pub mod jwt;
pub mod otp;
pub mod passkey;
mod provision;
pub mod rate_limit;
pub mod tokens;

pub use api_key::ApiKeyService;
pub use audit::{emit, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use auth::AuthService;
pub use email::{EmailProvider, MockEmailService, SmtpConfig, SmtpEmailService};
pub use error::ServiceError;
pub use google::{
    GoogleAuthService, GoogleConfig, GoogleIdentityProvider, IdentityProvider, RemoteProfile,
};
pub use jwt::JwtService;
pub use otp::OtpService;
pub use passkey::{PasskeyService, PasskeySummary, WebauthnConfig};
pub use rate_limit::{AttemptLimiter, KeyedAttemptLimiter, UnlimitedAttempts};
pub use tokens::{SessionOptions, TokenIssuer, TokenResponse};
