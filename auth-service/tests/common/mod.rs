//! Shared setup for auth-service integration tests.

#![allow(dead_code)]

use auth_service::{
    build_router,
    config::{
        AuthConfig, Environment, GoogleOAuthConfig, JwtConfig, RateLimitConfig, SecurityConfig,
        SmtpSettings, SwaggerConfig, SwaggerMode, WebauthnSettings,
    },
    services::{
        ApiKeyService, AttemptLimiter, AuthService, GoogleAuthService, IdentityProvider,
        JwtService, KeyedAttemptLimiter, MemoryAuditSink, MockEmailService, OtpService,
        PasskeyService, RemoteProfile, ServiceError, TokenIssuer, UnlimitedAttempts,
        WebauthnConfig,
    },
    store::InMemoryStore,
    AppState,
};
use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    Router,
};
use serde_json::{json, Value};
use service_core::middleware::create_ip_rate_limiter;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tower::util::ServiceExt;

pub const TEST_JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const TEST_RECOVERY_CODE: &str = "424242";

/// Attempt limiter that counts consults and delegates to a real keyed
/// limiter, so tests can assert the limiter runs before verification.
pub struct CountingLimiter {
    inner: KeyedAttemptLimiter,
    checks: AtomicUsize,
}

impl CountingLimiter {
    pub fn new(max_attempts: u32, window_seconds: u64) -> Self {
        Self {
            inner: KeyedAttemptLimiter::new(max_attempts, window_seconds),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl AttemptLimiter for CountingLimiter {
    async fn check(&self, client_id: &str) -> Result<(), ServiceError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.inner.check(client_id).await
    }
}

/// Identity provider stub returning a fixed profile.
pub struct StubIdentityProvider {
    pub profile: RemoteProfile,
}

#[async_trait::async_trait]
impl IdentityProvider for StubIdentityProvider {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://provider.test/authorize?state={state}")
    }

    async fn exchange_code(&self, _code: &str) -> Result<RemoteProfile, ServiceError> {
        Ok(self.profile.clone())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub audit: Arc<MemoryAuditSink>,
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        common: service_core::config::Config {
            port: 0,
            log_level: "error".to_string(),
            log_json: false,
        },
        environment: Environment::Dev,
        service_name: "auth-service-test".to_string(),
        log_level: "error".to_string(),
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            access_token_expiry_minutes: 15,
            long_session_expiry_hours: 24,
            refresh_token_expiry_days: 7,
            remember_me_expiry_days: 30,
            magic_link_expiry_minutes: 10,
        },
        webauthn: WebauthnSettings {
            rp_id: "localhost".to_string(),
            rp_origin: "http://localhost:3000".to_string(),
            rp_name: "Auth Service Tests".to_string(),
        },
        google: GoogleOAuthConfig {
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            redirect_uri: "http://localhost:8080/auth/google/callback".to_string(),
        },
        smtp: SmtpSettings {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            from_email: "no-reply@localhost".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            frontend_url: "http://localhost:3000".to_string(),
            recovery_login_code: Some(TEST_RECOVERY_CODE.to_string()),
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        rate_limit: RateLimitConfig {
            verify_attempts: 100,
            verify_window_seconds: 60,
            login_route_limit: 1000,
            login_route_window_seconds: 60,
            code_request_limit: 1000,
            code_request_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_limiter(Arc::new(UnlimitedAttempts)).await
}

pub async fn spawn_app_with_limiter(limiter: Arc<dyn AttemptLimiter>) -> TestApp {
    let config = test_config();
    let store = Arc::new(InMemoryStore::new());
    let store_dyn: Arc<dyn auth_service::store::CredentialStore> = store.clone();
    let audit = Arc::new(MemoryAuditSink::new());
    let audit_dyn: Arc<dyn auth_service::services::AuditSink> = audit.clone();
    let email: Arc<dyn auth_service::services::EmailProvider> = Arc::new(MockEmailService);

    let jwt = JwtService::new(
        &config.jwt.secret,
        config.jwt.access_token_expiry_minutes,
        config.jwt.long_session_expiry_hours,
        config.jwt.refresh_token_expiry_days,
        config.jwt.remember_me_expiry_days,
        config.jwt.magic_link_expiry_minutes,
    );
    let issuer = TokenIssuer::new(store_dyn.clone(), jwt.clone());

    let auth = AuthService::new(
        store_dyn.clone(),
        issuer.clone(),
        email.clone(),
        limiter.clone(),
        audit_dyn.clone(),
    );
    let otp = OtpService::new(
        store_dyn.clone(),
        issuer.clone(),
        auth.clone(),
        email.clone(),
        limiter.clone(),
        audit_dyn.clone(),
        config.security.frontend_url.clone(),
        config.security.recovery_login_code.clone(),
    );
    let passkeys = PasskeyService::new(
        &WebauthnConfig {
            rp_id: config.webauthn.rp_id.clone(),
            rp_origin: config.webauthn.rp_origin.clone(),
            rp_name: config.webauthn.rp_name.clone(),
        },
        store_dyn.clone(),
        issuer.clone(),
        limiter.clone(),
        audit_dyn.clone(),
    )
    .expect("webauthn setup");
    let google = GoogleAuthService::new(
        store_dyn.clone(),
        issuer.clone(),
        Arc::new(StubIdentityProvider {
            profile: RemoteProfile {
                email: "oauth-user@example.com".to_string(),
                email_verified: true,
                name: Some("OAuth User".to_string()),
            },
        }),
        audit_dyn.clone(),
    );
    let api_keys = ApiKeyService::new(store_dyn.clone(), audit_dyn.clone());

    let state = AppState {
        config: config.clone(),
        store: store_dyn,
        email,
        jwt,
        auth,
        otp,
        passkeys,
        google,
        api_keys,
        audit: audit_dyn,
        login_rate_limiter: create_ip_rate_limiter(
            config.rate_limit.login_route_limit,
            config.rate_limit.login_route_window_seconds,
        ),
        code_request_rate_limiter: create_ip_rate_limiter(
            config.rate_limit.code_request_limit,
            config.rate_limit.code_request_window_seconds,
        ),
        ip_rate_limiter: create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        ),
    };

    let router = build_router(state.clone()).await.expect("router");

    TestApp {
        router,
        state,
        store,
        audit,
    }
}

impl TestApp {
    pub async fn post_json(&self, path: &str, body: Value) -> Response<Body> {
        self.request("POST", path, Some(body), None).await
    }

    pub async fn post_json_auth(&self, path: &str, body: Value, token: &str) -> Response<Body> {
        self.request("POST", path, Some(body), Some(token)).await
    }

    pub async fn get_auth(&self, path: &str, token: &str) -> Response<Body> {
        self.request("GET", path, None, Some(token)).await
    }

    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("x-forwarded-for", "10.9.8.7")
            .header("content-type", "application/json");
        if let Some(token) = bearer {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => Body::from(value.to_string()),
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response")
    }

    /// Register a user through the API and return (access, refresh).
    pub async fn register_user(&self, email: &str, password: &str) -> (String, String) {
        let res = self
            .post_json(
                "/auth/register",
                json!({"email": email, "password": password, "name": "Test User"}),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body = read_json(res).await;
        (
            body["access_token"].as_str().expect("access").to_string(),
            body["refresh_token"].as_str().expect("refresh").to_string(),
        )
    }
}

pub async fn read_json(res: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), 1024 * 1024)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Give spawned fire-and-forget tasks (audit emission) a chance to run.
pub async fn drain_background_tasks() {
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
}
