//! Principal provisioning shared by signup paths.
//!
//! Direct registration, code-verified signup, and OAuth first-login all
//! create the same shape: a user, a personal organization, and a master
//! membership, with the new org set active on the user. The first account
//! ever created gets the platform admin role.

use crate::models::{OrgMembership, OrgRole, Organization, User, UserRole};
use crate::services::error::ServiceError;
use crate::store::{CredentialStore, StoreError};

pub(crate) async fn create_principal(
    store: &dyn CredentialStore,
    email: &str,
    name: Option<String>,
    password_hash: String,
    email_verified: bool,
) -> Result<User, ServiceError> {
    let role = if store.count_users().await? == 0 {
        UserRole::Admin
    } else {
        UserRole::User
    };

    let display = name
        .clone()
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string());

    let mut user = User::new(email.to_lowercase(), password_hash, name, role);
    if email_verified {
        user.email_verified_at = Some(chrono::Utc::now());
    }

    let org = Organization::personal_for(&display);
    user.current_org_id = Some(org.id);

    store.insert_user(&user).await.map_err(|e| match e {
        StoreError::Conflict(_) => ServiceError::EmailAlreadyRegistered,
        other => ServiceError::Store(other),
    })?;
    store.insert_organization(&org).await?;
    store
        .insert_membership(&OrgMembership::new(user.id, org.id, OrgRole::Master))
        .await?;

    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn test_first_principal_is_admin() {
        let store = InMemoryStore::new();
        let first = create_principal(&store, "first@example.com", None, "$h".into(), false)
            .await
            .unwrap();
        let second = create_principal(&store, "second@example.com", None, "$h".into(), false)
            .await
            .unwrap();

        assert_eq!(first.role, UserRole::Admin);
        assert_eq!(second.role, UserRole::User);
    }

    #[tokio::test]
    async fn test_principal_gets_personal_org_and_master_membership() {
        let store = InMemoryStore::new();
        let user = create_principal(
            &store,
            "org@example.com",
            Some("Orla".to_string()),
            "$h".into(),
            true,
        )
        .await
        .unwrap();

        let org_id = user.current_org_id.expect("active org set");
        let org = store.find_organization(org_id).await.unwrap().unwrap();
        assert_eq!(org.name, "Orla's Organization");

        let membership = store
            .find_membership(user.id, org_id)
            .await
            .unwrap()
            .expect("membership exists");
        assert_eq!(membership.role, OrgRole::Master);
        assert!(user.email_verified_at.is_some());
    }
}
