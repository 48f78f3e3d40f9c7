//! API key lifecycle: mint, authenticate, list, revoke.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{read_json, spawn_app, TestApp};
use serde_json::{json, Value};
use tower::util::ServiceExt;

async fn create_key(app: &TestApp, access: &str, name: &str) -> Value {
    let res = app
        .post_json_auth("/auth/api-keys", json!({"name": name}), access)
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    read_json(res).await
}

async fn get_with_api_key(app: &TestApp, path: &str, key: &str) -> axum::response::Response {
    let req = Request::builder()
        .method("GET")
        .uri(path)
        .header("x-forwarded-for", "10.9.8.7")
        .header("x-api-key", key)
        .body(Body::empty())
        .expect("request");
    app.router.clone().oneshot(req).await.expect("response")
}

#[tokio::test]
async fn test_create_and_use_api_key() {
    let app = spawn_app().await;
    let (access, _) = app.register_user("orla@example.com", "correct horse 1").await;

    let body = create_key(&app, &access, "ci key").await;
    let key = body["key"].as_str().expect("full key");
    assert!(key.starts_with("qk_live_"));
    // Listing entries only ever show the display prefix
    assert!(key.starts_with(body["api_key"]["prefix"].as_str().expect("prefix")));

    // The key authenticates requests via the x-api-key header
    let res = get_with_api_key(&app, "/auth/me", key).await;
    assert_eq!(res.status(), StatusCode::OK);
    let me = read_json(res).await;
    assert_eq!(me["user"]["email"], "orla@example.com");
}

#[tokio::test]
async fn test_api_key_works_as_bearer_token() {
    let app = spawn_app().await;
    let (access, _) = app.register_user("orla@example.com", "correct horse 1").await;

    let body = create_key(&app, &access, "ci key").await;
    let key = body["key"].as_str().expect("full key");

    // The qk_ prefix routes a bearer value down the API-key path
    let res = app.get_auth("/auth/me", key).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_list_is_scoped_to_organization() {
    let app = spawn_app().await;
    let (access_a, _) = app.register_user("a@example.com", "password aaaa").await;
    let (access_b, _) = app.register_user("b@example.com", "password bbbb").await;

    create_key(&app, &access_a, "key a1").await;
    create_key(&app, &access_a, "key a2").await;
    create_key(&app, &access_b, "key b1").await;

    let body = read_json(app.get_auth("/auth/api-keys", &access_a).await).await;
    let keys = body["api_keys"].as_array().expect("list");
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| k["key"].is_null()));

    let body = read_json(app.get_auth("/auth/api-keys", &access_b).await).await;
    assert_eq!(body["api_keys"].as_array().map(|k| k.len()), Some(1));
}

#[tokio::test]
async fn test_revoked_key_stops_authenticating() {
    let app = spawn_app().await;
    let (access, _) = app.register_user("orla@example.com", "correct horse 1").await;

    let body = create_key(&app, &access, "ci key").await;
    let key = body["key"].as_str().expect("full key");
    let id = body["api_key"]["id"].as_str().expect("id");

    let res = get_with_api_key(&app, "/auth/me", key).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .request("DELETE", &format!("/auth/api-keys/{id}"), None, Some(&access))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = get_with_api_key(&app, "/auth/me", key).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revoke_is_scoped_to_active_organization() {
    let app = spawn_app().await;
    let (owner_access, _) = app.register_user("owner@example.com", "password aaaa").await;
    let (other_access, _) = app.register_user("other@example.com", "password bbbb").await;

    let body = create_key(&app, &owner_access, "owned key").await;
    let id = body["api_key"]["id"].as_str().expect("id").to_string();

    // A user in a different organization cannot even see the key
    let res = app
        .request("DELETE", &format!("/auth/api-keys/{id}"), None, Some(&other_access))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    // The creator can revoke it
    let res = app
        .request("DELETE", &format!("/auth/api-keys/{id}"), None, Some(&owner_access))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    // Revoking an already-revoked key is a no-op
    let res = app
        .request("DELETE", &format!("/auth/api-keys/{id}"), None, Some(&owner_access))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_key_never_authenticates() {
    let app = spawn_app().await;
    app.register_user("orla@example.com", "correct horse 1").await;

    let res = get_with_api_key(&app, "/auth/me", "qk_live_definitely-not-real").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}
