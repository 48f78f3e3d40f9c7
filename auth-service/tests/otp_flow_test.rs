//! Email one-time-code and magic-link flows.

mod common;

use auth_service::models::CodePurpose;
use auth_service::store::CredentialStore;
use axum::http::StatusCode;
use common::{drain_background_tasks, read_json, spawn_app, TEST_RECOVERY_CODE};
use serde_json::json;

#[tokio::test]
async fn test_signup_code_creates_account() {
    let app = spawn_app().await;

    let res = app
        .post_json(
            "/auth/otp/signup/request",
            json!({"email": "nia@example.com", "name": "Nia"}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let code = app
        .store
        .find_latest_code("nia@example.com", CodePurpose::Signup)
        .await
        .expect("store")
        .expect("signup code issued");

    let res = app
        .post_json(
            "/auth/otp/signup/verify",
            json!({"email": "nia@example.com", "code": code.code}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = read_json(res).await;
    assert_eq!(body["user"]["email"], "nia@example.com");
    assert_eq!(body["user"]["name"], "Nia");
    // Email is verified by construction of the flow
    assert_eq!(body["user"]["email_verified"], true);
    assert!(body["access_token"].as_str().is_some());

    // Personal organization was provisioned alongside the account
    let user_id = body["user"]["id"].as_str().expect("id").parse().expect("uuid");
    let memberships = app
        .store
        .memberships_for_user(user_id)
        .await
        .expect("store");
    assert_eq!(memberships.len(), 1);
    assert_eq!(
        memberships[0].role,
        auth_service::models::OrgRole::Master
    );
}

#[tokio::test]
async fn test_signup_request_for_registered_email_conflicts() {
    let app = spawn_app().await;
    app.register_user("orla@example.com", "correct horse 1").await;

    let res = app
        .post_json(
            "/auth/otp/signup/request",
            json!({"email": "orla@example.com"}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_otp_code_is_single_use() {
    let app = spawn_app().await;
    app.register_user("orla@example.com", "correct horse 1").await;

    let res = app
        .post_json("/auth/otp/login/request", json!({"email": "orla@example.com"}))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let code = app
        .store
        .find_latest_code("orla@example.com", CodePurpose::Login)
        .await
        .expect("store")
        .expect("login code issued");

    let res = app
        .post_json(
            "/auth/otp/login/verify",
            json!({"email": "orla@example.com", "code": code.code}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    // Second redemption of the same code fails
    let res = app
        .post_json(
            "/auth/otp/login/verify",
            json!({"email": "orla@example.com", "code": code.code}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_request_for_unknown_email_is_silent() {
    let app = spawn_app().await;
    app.register_user("orla@example.com", "correct horse 1").await;

    let known = app
        .post_json("/auth/otp/login/request", json!({"email": "orla@example.com"}))
        .await;
    let unknown = app
        .post_json("/auth/otp/login/request", json!({"email": "nobody@example.com"}))
        .await;

    // Identical responses, no account-existence signal
    assert_eq!(known.status(), StatusCode::OK);
    assert_eq!(unknown.status(), StatusCode::OK);
    assert_eq!(read_json(known).await, read_json(unknown).await);

    // The unknown address got a signup code behind the scenes; verifying
    // it through the login endpoint creates the account.
    let code = app
        .store
        .find_latest_code("nobody@example.com", CodePurpose::Signup)
        .await
        .expect("store")
        .expect("signup fallback code");

    let res = app
        .post_json(
            "/auth/otp/login/verify",
            json!({"email": "nobody@example.com", "code": code.code}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["user"]["email"], "nobody@example.com");
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    use auth_service::models::OneTimeCode;

    let app = spawn_app().await;
    app.register_user("orla@example.com", "correct horse 1").await;

    // Insert an already-expired code directly
    let mut code = OneTimeCode::new(
        "orla@example.com".to_string(),
        None,
        CodePurpose::Login,
        None,
        10,
    );
    code.expires_at = chrono::Utc::now() - chrono::Duration::seconds(1);
    app.store.insert_code(&code).await.expect("store");

    let res = app
        .post_json(
            "/auth/otp/login/verify",
            json!({"email": "orla@example.com", "code": code.code}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_recovery_code_login() {
    let app = spawn_app().await;
    app.register_user("orla@example.com", "correct horse 1").await;

    // No stored code exists, the configured recovery code still verifies
    let res = app
        .post_json(
            "/auth/otp/login/verify",
            json!({"email": "orla@example.com", "code": TEST_RECOVERY_CODE}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    drain_background_tasks().await;
    let events = app.audit.events();
    assert!(events.iter().any(|e| e.action == "recovery_code_login"));

    // Recovery code never works for unknown accounts
    let res = app
        .post_json(
            "/auth/otp/login/verify",
            json!({"email": "nobody@example.com", "code": TEST_RECOVERY_CODE}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_magic_link_single_redemption() {
    let app = spawn_app().await;

    let res = app
        .post_json(
            "/auth/otp/signup/request",
            json!({"email": "nia@example.com", "name": "Nia"}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let code = app
        .store
        .find_latest_code("nia@example.com", CodePurpose::Signup)
        .await
        .expect("store")
        .expect("signup code issued");

    // Reconstruct the emailed link token from the stored code
    let token = app
        .state
        .jwt
        .generate_magic_link_token(&code.email, code.id, code.purpose, code.pending_name.clone())
        .expect("magic link token");

    let res = app
        .post_json("/auth/otp/magic-link/verify", json!({"token": token.clone()}))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["user"]["email"], "nia@example.com");

    // The link claimed the code, so neither the link nor the code works again
    let res = app
        .post_json("/auth/otp/magic-link/verify", json!({"token": token}))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .post_json(
            "/auth/otp/signup/verify",
            json!({"email": "nia@example.com", "code": code.code}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_magic_link_rejects_forged_token() {
    let app = spawn_app().await;

    let res = app
        .post_json("/auth/otp/magic-link/verify", json!({"token": "garbage"}))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // A structurally valid token naming a nonexistent code fails too
    let token = app
        .state
        .jwt
        .generate_magic_link_token(
            "ghost@example.com",
            uuid::Uuid::new_v4(),
            CodePurpose::Login,
            None,
        )
        .expect("token");
    let res = app
        .post_json("/auth/otp/magic-link/verify", json!({"token": token}))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}
