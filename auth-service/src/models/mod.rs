pub mod api_key;
pub mod audit_event;
pub mod one_time_code;
pub mod organization;
pub mod passkey;
pub mod refresh_token;
pub mod user;

pub use api_key::{ApiKey, ApiKeySummary, API_KEY_PREFIX};
pub use audit_event::{AuditEvent, AuditOutcome};
pub use one_time_code::{generate_code, CodePurpose, OneTimeCode};
pub use organization::{OrgMembership, OrgRole, Organization};
pub use passkey::{CeremonyChallenge, CeremonyPurpose, PasskeyCredential};
pub use refresh_token::RefreshTokenRecord;
pub use user::{SanitizedUser, User, UserRole};
