//! Organization and membership models.
//!
//! Organization CRUD is owned elsewhere; this service only creates the
//! personal organization on signup and reads memberships at issuance time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Organization {
    pub fn new(name: String) -> Self {
        let slug = slugify(&name);
        Self {
            id: Uuid::new_v4(),
            name,
            slug,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// The personal organization created for a fresh signup.
    pub fn personal_for(display_name: &str) -> Self {
        Self::new(format!("{}'s Organization", display_name))
    }
}

/// Organization-scoped role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    Master,
    Manager,
    User,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Master => "master",
            OrgRole::Manager => "manager",
            OrgRole::User => "user",
        }
    }
}

impl std::str::FromStr for OrgRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "master" => Ok(OrgRole::Master),
            "manager" => Ok(OrgRole::Manager),
            "user" => Ok(OrgRole::User),
            other => Err(format!("Invalid organization role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgMembership {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub role: OrgRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl OrgMembership {
    pub fn new(user_id: Uuid, organization_id: Uuid, role: OrgRole) -> Self {
        Self {
            user_id,
            organization_id,
            role,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

fn slugify(name: &str) -> String {
    let base: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let trimmed = base.trim_matches('-').to_string();
    // Short random suffix keeps slugs unique without a registry lookup
    let suffix = &Uuid::new_v4().simple().to_string()[..6];
    format!("{}-{}", trimmed, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_personal_org_name() {
        let org = Organization::personal_for("Ada");
        assert_eq!(org.name, "Ada's Organization");
        assert!(org.slug.starts_with("ada-s-organization-"));
        assert!(org.is_active);
    }

    #[test]
    fn test_slugs_are_unique() {
        let a = Organization::new("Same Name".to_string());
        let b = Organization::new("Same Name".to_string());
        assert_ne!(a.slug, b.slug);
    }

    #[test]
    fn test_org_role_round_trip() {
        for role in [OrgRole::Master, OrgRole::Manager, OrgRole::User] {
            assert_eq!(role.as_str().parse::<OrgRole>().unwrap(), role);
        }
        assert!("owner".parse::<OrgRole>().is_err());
    }
}
