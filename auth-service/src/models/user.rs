//! User model - principal accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Platform-level role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::User => "user",
        }
    }
}

/// Principal entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub current_org_id: Option<Uuid>,
    pub onboarding_completed: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: String, password_hash: String, name: Option<String>, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            name,
            role,
            is_active: true,
            current_org_id: None,
            onboarding_completed: false,
            email_verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Convert to a response without sensitive fields.
    pub fn sanitized(&self) -> SanitizedUser {
        SanitizedUser {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role,
            is_active: self.is_active,
            current_org_id: self.current_org_id,
            onboarding_completed: self.onboarding_completed,
            email_verified: self.email_verified_at.is_some(),
            created_at: self.created_at,
        }
    }
}

/// User response for the API (no password hash).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SanitizedUser {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub current_org_id: Option<Uuid>,
    pub onboarding_completed: bool,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_defaults() {
        let user = User::new(
            "a@example.com".to_string(),
            "$argon2id$fake".to_string(),
            Some("A".to_string()),
            UserRole::User,
        );

        assert!(user.is_active);
        assert!(!user.onboarding_completed);
        assert!(user.email_verified_at.is_none());
        assert!(user.current_org_id.is_none());
        assert!(!user.is_admin());
    }

    #[test]
    fn test_sanitized_drops_password_hash() {
        let user = User::new(
            "a@example.com".to_string(),
            "$argon2id$fake".to_string(),
            None,
            UserRole::Admin,
        );
        let sanitized = user.sanitized();

        assert_eq!(sanitized.id, user.id);
        assert_eq!(sanitized.email, user.email);
        assert!(!sanitized.email_verified);
        // SanitizedUser has no password field by construction; serialize to be sure
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("password"));
    }
}
