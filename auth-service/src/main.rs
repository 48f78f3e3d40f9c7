use auth_service::{
    build_router,
    config::AuthConfig,
    services::{
        ApiKeyService, AuthService, GoogleAuthService, GoogleConfig, GoogleIdentityProvider,
        JwtService, KeyedAttemptLimiter, MockEmailService, OtpService, PasskeyService, SmtpConfig,
        SmtpEmailService, TokenIssuer, TracingAuditSink, WebauthnConfig,
    },
    store::InMemoryStore,
    AppState,
};
use service_core::middleware::create_ip_rate_limiter;
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = AuthConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level, config.common.log_json);

    tracing::info!(
        service = %config.service_name,
        environment = ?config.environment,
        "Starting authentication service"
    );

    let store: Arc<dyn auth_service::store::CredentialStore> = Arc::new(InMemoryStore::new());

    let email: Arc<dyn auth_service::services::EmailProvider> = if config.smtp.host.is_empty() {
        tracing::warn!("SMTP not configured; email delivery is mocked");
        Arc::new(MockEmailService)
    } else {
        Arc::new(SmtpEmailService::new(&SmtpConfig {
            host: config.smtp.host.clone(),
            username: config.smtp.username.clone(),
            password: config.smtp.password.clone(),
            from_email: config.smtp.from_email.clone(),
        })?)
    };

    let jwt = JwtService::new(
        &config.jwt.secret,
        config.jwt.access_token_expiry_minutes,
        config.jwt.long_session_expiry_hours,
        config.jwt.refresh_token_expiry_days,
        config.jwt.remember_me_expiry_days,
        config.jwt.magic_link_expiry_minutes,
    );
    let issuer = TokenIssuer::new(store.clone(), jwt.clone());

    let audit: Arc<dyn auth_service::services::AuditSink> = Arc::new(TracingAuditSink);
    let attempt_limiter: Arc<dyn auth_service::services::AttemptLimiter> =
        Arc::new(KeyedAttemptLimiter::new(
            config.rate_limit.verify_attempts,
            config.rate_limit.verify_window_seconds,
        ));

    let auth = AuthService::new(
        store.clone(),
        issuer.clone(),
        email.clone(),
        attempt_limiter.clone(),
        audit.clone(),
    );
    let otp = OtpService::new(
        store.clone(),
        issuer.clone(),
        auth.clone(),
        email.clone(),
        attempt_limiter.clone(),
        audit.clone(),
        config.security.frontend_url.clone(),
        config.security.recovery_login_code.clone(),
    );
    let passkeys = PasskeyService::new(
        &WebauthnConfig {
            rp_id: config.webauthn.rp_id.clone(),
            rp_origin: config.webauthn.rp_origin.clone(),
            rp_name: config.webauthn.rp_name.clone(),
        },
        store.clone(),
        issuer.clone(),
        attempt_limiter.clone(),
        audit.clone(),
    )?;
    let google = GoogleAuthService::new(
        store.clone(),
        issuer.clone(),
        Arc::new(GoogleIdentityProvider::new(GoogleConfig {
            client_id: config.google.client_id.clone(),
            client_secret: config.google.client_secret.clone(),
            redirect_uri: config.google.redirect_uri.clone(),
        })),
        audit.clone(),
    );
    let api_keys = ApiKeyService::new(store.clone(), audit.clone());

    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_route_limit,
        config.rate_limit.login_route_window_seconds,
    );
    let code_request_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.code_request_limit,
        config.rate_limit.code_request_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );

    let state = AppState {
        config: config.clone(),
        store,
        email,
        jwt,
        auth,
        otp,
        passkeys,
        google,
        api_keys,
        audit,
        login_rate_limiter,
        code_request_rate_limiter,
        ip_rate_limiter,
    };

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
