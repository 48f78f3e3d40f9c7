//! One-time code model - numeric codes bound to an email and purpose.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodePurpose {
    Signup,
    Login,
    PasswordReset,
}

impl CodePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePurpose::Signup => "signup",
            CodePurpose::Login => "login",
            CodePurpose::PasswordReset => "password_reset",
        }
    }
}

/// One-time code entity. Single use; consumption must be an atomic
/// claim at the store so concurrent verifies cannot both succeed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneTimeCode {
    pub id: Uuid,
    pub email: String,
    pub user_id: Option<Uuid>,
    pub purpose: CodePurpose,
    pub code: String,
    /// Display name carried by signup codes until the principal exists
    pub pending_name: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl OneTimeCode {
    pub fn new(
        email: String,
        user_id: Option<Uuid>,
        purpose: CodePurpose,
        pending_name: Option<String>,
        expiry_minutes: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            user_id,
            purpose,
            code: generate_code(),
            pending_name,
            expires_at: Utc::now() + Duration::minutes(expiry_minutes),
            used: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        !self.used && !self.is_expired()
    }
}

/// Uniform random draw over the full six-digit space.
pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_is_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_fresh_code_is_valid() {
        let code = OneTimeCode::new(
            "a@example.com".to_string(),
            None,
            CodePurpose::Signup,
            Some("A".to_string()),
            10,
        );
        assert!(code.is_valid());
        assert!(!code.is_expired());
    }

    #[test]
    fn test_used_code_is_invalid() {
        let mut code =
            OneTimeCode::new("a@example.com".to_string(), None, CodePurpose::Login, None, 10);
        code.used = true;
        assert!(!code.is_valid());
    }

    #[test]
    fn test_expired_code_is_invalid() {
        let mut code =
            OneTimeCode::new("a@example.com".to_string(), None, CodePurpose::Login, None, 10);
        code.expires_at = Utc::now() - Duration::seconds(1);
        assert!(code.is_expired());
        assert!(!code.is_valid());
    }
}
