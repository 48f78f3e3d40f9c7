//! Attempt limiting and audit trail behavior.

mod common;

use auth_service::models::AuditOutcome;
use axum::http::StatusCode;
use common::{drain_background_tasks, read_json, spawn_app, spawn_app_with_limiter, CountingLimiter};
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_verification_attempts_are_limited_per_client() {
    let limiter = Arc::new(CountingLimiter::new(3, 60));
    let app = spawn_app_with_limiter(limiter.clone()).await;
    app.register_user("orla@example.com", "correct horse 1").await;

    // Three failed attempts fit the budget
    for _ in 0..3 {
        let res = app
            .post_json(
                "/auth/login",
                json!({"email": "orla@example.com", "password": "wrong password"}),
            )
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    // The fourth attempt is refused before any credential check
    let res = app
        .post_json(
            "/auth/login",
            json!({"email": "orla@example.com", "password": "correct horse 1"}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(res.headers().get(axum::http::header::RETRY_AFTER).is_some());

    // The limiter was consulted on every attempt
    assert_eq!(limiter.checks(), 4);
}

#[tokio::test]
async fn test_limit_applies_across_verification_routes() {
    let app = spawn_app_with_limiter(Arc::new(CountingLimiter::new(3, 60))).await;
    app.register_user("orla@example.com", "correct horse 1").await;

    // Burn the budget on password login, then try an OTP verify: the
    // same per-client budget covers both routes.
    for _ in 0..3 {
        app.post_json(
            "/auth/login",
            json!({"email": "orla@example.com", "password": "wrong password"}),
        )
        .await;
    }

    let res = app
        .post_json(
            "/auth/otp/login/verify",
            json!({"email": "orla@example.com", "code": "123456"}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_login_attempts_leave_an_audit_trail() {
    let app = spawn_app().await;
    app.register_user("orla@example.com", "correct horse 1").await;

    for _ in 0..3 {
        let res = app
            .post_json(
                "/auth/login",
                json!({"email": "orla@example.com", "password": "wrong password"}),
            )
            .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    let res = app
        .post_json(
            "/auth/login",
            json!({"email": "orla@example.com", "password": "correct horse 1"}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let user_id = read_json(res).await["user"]["id"]
        .as_str()
        .expect("id")
        .parse()
        .expect("uuid");

    drain_background_tasks().await;
    let events = app.audit.events();

    let failures: Vec<_> = events.iter().filter(|e| e.action == "login_failed").collect();
    assert_eq!(failures.len(), 3);
    for failure in &failures {
        assert_eq!(failure.outcome, AuditOutcome::Failure);
        // Client id comes from the forwarded-for header
        assert_eq!(failure.client_id, "10.9.8.7");
    }

    let success = events
        .iter()
        .find(|e| e.action == "login")
        .expect("login success recorded");
    assert_eq!(success.outcome, AuditOutcome::Success);
    assert_eq!(success.user_id, Some(user_id));
}

#[tokio::test]
async fn test_failed_otp_verify_is_audited() {
    let app = spawn_app().await;
    app.register_user("orla@example.com", "correct horse 1").await;

    let res = app
        .post_json(
            "/auth/otp/login/verify",
            json!({"email": "orla@example.com", "code": "000000"}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    drain_background_tasks().await;
    let events = app.audit.events();
    assert!(events.iter().any(|e| e.action == "otp_verify_failed"));
}
