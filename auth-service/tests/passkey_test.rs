//! Passkey ceremony endpoints.
//!
//! Full ceremonies need a live authenticator, so these tests cover the
//! HTTP surface: challenge issuance, enumeration behavior, and rejection
//! of malformed or out-of-order finishes.

mod common;

use axum::http::StatusCode;
use common::{read_json, spawn_app};
use serde_json::json;

#[tokio::test]
async fn test_register_start_requires_session() {
    let app = spawn_app().await;

    let res = app
        .request("POST", "/auth/passkeys/register/start", None, None)
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_start_issues_challenge() {
    let app = spawn_app().await;
    let (access, _) = app.register_user("orla@example.com", "correct horse 1").await;

    let res = app
        .request("POST", "/auth/passkeys/register/start", None, Some(&access))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let body = read_json(res).await;
    assert!(body["publicKey"]["challenge"].as_str().is_some());
    assert_eq!(body["publicKey"]["rp"]["id"], "localhost");
}

#[tokio::test]
async fn test_login_start_does_not_reveal_account_existence() {
    let app = spawn_app().await;
    app.register_user("orla@example.com", "correct horse 1").await;

    // Unknown email and a known email without passkeys fail identically
    let unknown = app
        .post_json(
            "/auth/passkeys/login/start",
            json!({"email": "nobody@example.com"}),
        )
        .await;
    let no_passkeys = app
        .post_json(
            "/auth/passkeys/login/start",
            json!({"email": "orla@example.com"}),
        )
        .await;

    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(no_passkeys.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(unknown).await, read_json(no_passkeys).await);
}

#[tokio::test]
async fn test_discoverable_start_issues_challenge() {
    let app = spawn_app().await;

    let res = app
        .request("POST", "/auth/passkeys/discoverable/start", None, None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let body = read_json(res).await;
    assert!(body["publicKey"]["challenge"].as_str().is_some());
}

#[tokio::test]
async fn test_finish_without_challenge_is_rejected() {
    let app = spawn_app().await;
    app.register_user("orla@example.com", "correct horse 1").await;

    // No start was called, so there is no pending ceremony to finish
    let res = app
        .post_json(
            "/auth/passkeys/login/finish",
            json!({"email": "orla@example.com", "credential": {}}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_finish_rejects_malformed_credential() {
    let app = spawn_app().await;
    let (access, _) = app.register_user("orla@example.com", "correct horse 1").await;

    let res = app
        .request("POST", "/auth/passkeys/register/start", None, Some(&access))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    // A credential that is not even the right shape is a 400, not a 500
    let res = app
        .post_json_auth(
            "/auth/passkeys/register/finish",
            json!({"credential": "not-an-object"}),
            &access,
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_discoverable_finish_rejects_malformed_credential() {
    let app = spawn_app().await;

    let res = app
        .request("POST", "/auth/passkeys/discoverable/start", None, None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .post_json(
            "/auth/passkeys/discoverable/finish",
            json!({"credential": {"nonsense": true}}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_passkey_list_starts_empty() {
    let app = spawn_app().await;
    let (access, _) = app.register_user("orla@example.com", "correct horse 1").await;

    let res = app.get_auth("/auth/passkeys", &access).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body.as_array().map(|v| v.len()), Some(0));
}
