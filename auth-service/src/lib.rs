pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use service_core::axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post},
    Router,
};
use service_core::middleware::{
    ip_rate_limit_middleware, request_id_middleware, security_headers_middleware,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{openapi::security::SecurityScheme, Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AuthConfig;
use crate::services::{
    ApiKeyService, AuditSink, AuthService, EmailProvider, GoogleAuthService, JwtService,
    OtpService, PasskeyService,
};
use crate::store::CredentialStore;
use service_core::error::AppError;
use std::sync::Arc;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::me,
        handlers::auth::change_password,
        handlers::auth::switch_organization,
        handlers::auth::forgot_password,
        handlers::auth::reset_password,
        handlers::auth::complete_onboarding,
        handlers::api_keys::create,
        handlers::api_keys::list,
        handlers::api_keys::revoke,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::LoginRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::LogoutRequest,
            dtos::auth::ChangePasswordRequest,
            dtos::auth::SwitchOrganizationRequest,
            dtos::auth::ForgotPasswordRequest,
            dtos::auth::ResetPasswordRequest,
            dtos::auth::CreateApiKeyRequest,
            dtos::auth::AuthResponse,
            dtos::auth::MessageResponse,
            dtos::auth::MeResponse,
            dtos::auth::MembershipInfo,
            dtos::auth::ApiKeyCreatedResponse,
            dtos::auth::ApiKeyListResponse,
            services::tokens::TokenResponse,
            models::SanitizedUser,
            models::UserRole,
            models::OrgRole,
            models::ApiKeySummary,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "User authentication and session issuance"),
        (name = "API Keys", description = "Programmatic access keys"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(utoipa::openapi::security::ApiKey::Header(
                    utoipa::openapi::security::ApiKeyValue::new("x-api-key"),
                )),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub store: Arc<dyn CredentialStore>,
    pub email: Arc<dyn EmailProvider>,
    pub jwt: JwtService,
    pub auth: AuthService,
    pub otp: OtpService,
    pub passkeys: PasskeyService,
    pub google: GoogleAuthService,
    pub api_keys: ApiKeyService,
    pub audit: Arc<dyn AuditSink>,
    pub login_rate_limiter: service_core::middleware::IpRateLimiter,
    pub code_request_rate_limiter: service_core::middleware::IpRateLimiter,
    pub ip_rate_limiter: service_core::middleware::IpRateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Credential-presenting routes get a tighter route-level IP limit on
    // top of the in-service attempt limiter.
    let login_limiter = state.login_rate_limiter.clone();
    let login_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route(
            "/auth/otp/login/verify",
            post(handlers::otp::verify_login_code),
        )
        .route(
            "/auth/otp/signup/verify",
            post(handlers::otp::verify_signup_code),
        )
        .route(
            "/auth/otp/magic-link/verify",
            post(handlers::otp::verify_magic_link),
        )
        .route(
            "/auth/passkeys/login/finish",
            post(handlers::passkey::login_finish),
        )
        .route(
            "/auth/passkeys/discoverable/finish",
            post(handlers::passkey::discoverable_finish),
        )
        .route("/auth/reset-password", post(handlers::auth::reset_password))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    // Code issuance costs an email per request; rate limit it harder.
    let code_request_limiter = state.code_request_rate_limiter.clone();
    let code_request_routes = Router::new()
        .route(
            "/auth/otp/signup/request",
            post(handlers::otp::request_signup_code),
        )
        .route(
            "/auth/otp/login/request",
            post(handlers::otp::request_login_code),
        )
        .route(
            "/auth/forgot-password",
            post(handlers::auth::forgot_password),
        )
        .layer(from_fn_with_state(
            code_request_limiter,
            ip_rate_limit_middleware,
        ));

    let session_routes = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .route(
            "/auth/change-password",
            post(handlers::auth::change_password),
        )
        .route(
            "/auth/switch-organization",
            post(handlers::auth::switch_organization),
        )
        .route(
            "/auth/onboarding/complete",
            post(handlers::auth::complete_onboarding),
        )
        .route("/auth/passkeys", get(handlers::passkey::list))
        .route(
            "/auth/passkeys/register/start",
            post(handlers::passkey::register_start),
        )
        .route(
            "/auth/passkeys/register/finish",
            post(handlers::passkey::register_finish),
        )
        .route(
            "/auth/api-keys",
            post(handlers::api_keys::create).get(handlers::api_keys::list),
        )
        .route("/auth/api-keys/:id", delete(handlers::api_keys::revoke))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();

    let mut app = Router::new().route("/health", get(health_check));

    let swagger_enabled = match state.config.environment {
        config::Environment::Dev => true,
        config::Environment::Prod => state.config.swagger.enabled == config::SwaggerMode::Public,
    };
    if swagger_enabled {
        app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/api-docs/openapi.json",
            get(|| async { service_core::axum::Json(ApiDoc::openapi()) }),
        );
    }

    let app = app
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/google", get(handlers::oauth::google_login))
        .route(
            "/auth/google/callback",
            get(handlers::oauth::google_callback),
        )
        .route(
            "/auth/passkeys/login/start",
            post(handlers::passkey::login_start),
        )
        .route(
            "/auth/passkeys/discoverable/start",
            post(handlers::passkey::discoverable_start),
        )
        .merge(login_routes)
        .merge(code_request_routes)
        .merge(session_routes)
        .with_state(state.clone())
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .filter_map(|o| {
                            o.parse::<service_core::axum::http::HeaderValue>()
                                .map_err(|e| {
                                    tracing::error!("Invalid CORS origin '{}': {}", o, e);
                                    e
                                })
                                .ok()
                        })
                        .collect::<Vec<service_core::axum::http::HeaderValue>>(),
                )
                .allow_credentials(true)
                .allow_methods([
                    service_core::axum::http::Method::GET,
                    service_core::axum::http::Method::POST,
                    service_core::axum::http::Method::DELETE,
                    service_core::axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    service_core::axum::http::header::AUTHORIZATION,
                    service_core::axum::http::header::CONTENT_TYPE,
                    service_core::axum::http::header::HeaderName::from_static("x-api-key"),
                    service_core::axum::http::header::HeaderName::from_static("x-request-id"),
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy")
    ),
    tag = "Observability"
)]
pub async fn health_check() -> service_core::axum::Json<serde_json::Value> {
    service_core::axum::Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
