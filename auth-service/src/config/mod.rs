//! Service configuration from environment variables.
//!
//! In dev, most settings fall back to local defaults; in prod, anything
//! without a safe default is required.

use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub jwt: JwtConfig,
    pub webauthn: WebauthnSettings,
    pub google: GoogleOAuthConfig,
    pub smtp: SmtpSettings,
    pub security: SecurityConfig,
    pub swagger: SwaggerConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expiry_minutes: i64,
    pub long_session_expiry_hours: i64,
    pub refresh_token_expiry_days: i64,
    pub remember_me_expiry_days: i64,
    pub magic_link_expiry_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebauthnSettings {
    pub rp_id: String,
    pub rp_origin: String,
    pub rp_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpSettings {
    pub host: String,
    pub username: String,
    pub password: String,
    pub from_email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
    pub frontend_url: String,
    /// Operator bypass code for OTP login verification; empty disables it.
    pub recovery_login_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerConfig {
    pub enabled: SwaggerMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum SwaggerMode {
    Public,
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub verify_attempts: u32,
    pub verify_window_seconds: u64,
    pub login_route_limit: u32,
    pub login_route_window_seconds: u64,
    pub code_request_limit: u32,
    pub code_request_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("auth-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", Some("dev-secret-change-me-in-production"), is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "15",
                    is_prod,
                )?,
                long_session_expiry_hours: parse_env(
                    "JWT_LONG_SESSION_EXPIRY_HOURS",
                    "24",
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env(
                    "JWT_REFRESH_TOKEN_EXPIRY_DAYS",
                    "7",
                    is_prod,
                )?,
                remember_me_expiry_days: parse_env("JWT_REMEMBER_ME_EXPIRY_DAYS", "30", is_prod)?,
                magic_link_expiry_minutes: parse_env(
                    "JWT_MAGIC_LINK_EXPIRY_MINUTES",
                    "10",
                    is_prod,
                )?,
            },
            webauthn: WebauthnSettings {
                rp_id: get_env("WEBAUTHN_RP_ID", Some("localhost"), is_prod)?,
                rp_origin: get_env("WEBAUTHN_RP_ORIGIN", Some("http://localhost:3000"), is_prod)?,
                rp_name: get_env("WEBAUTHN_RP_NAME", Some("Auth Service"), is_prod)?,
            },
            google: GoogleOAuthConfig {
                client_id: get_env("GOOGLE_CLIENT_ID", Some(""), is_prod)?,
                client_secret: get_env("GOOGLE_CLIENT_SECRET", Some(""), is_prod)?,
                redirect_uri: get_env(
                    "GOOGLE_REDIRECT_URI",
                    Some("http://localhost:8080/auth/google/callback"),
                    is_prod,
                )?,
            },
            smtp: SmtpSettings {
                host: get_env("SMTP_HOST", Some(""), is_prod)?,
                username: get_env("SMTP_USERNAME", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from_email: get_env("SMTP_FROM_EMAIL", Some("no-reply@localhost"), is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
                frontend_url: get_env("FRONTEND_URL", Some("http://localhost:3000"), is_prod)?,
                recovery_login_code: env::var("RECOVERY_LOGIN_CODE")
                    .ok()
                    .filter(|v| !v.is_empty()),
            },
            swagger: SwaggerConfig {
                enabled: get_env("ENABLE_SWAGGER", Some("public"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            rate_limit: RateLimitConfig {
                verify_attempts: parse_env("RATE_LIMIT_VERIFY_ATTEMPTS", "5", is_prod)?,
                verify_window_seconds: parse_env(
                    "RATE_LIMIT_VERIFY_WINDOW_SECONDS",
                    "900",
                    is_prod,
                )?,
                login_route_limit: parse_env("RATE_LIMIT_LOGIN_ROUTE_LIMIT", "10", is_prod)?,
                login_route_window_seconds: parse_env(
                    "RATE_LIMIT_LOGIN_ROUTE_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
                code_request_limit: parse_env("RATE_LIMIT_CODE_REQUEST_LIMIT", "3", is_prod)?,
                code_request_window_seconds: parse_env(
                    "RATE_LIMIT_CODE_REQUEST_WINDOW_SECONDS",
                    "3600",
                    is_prod,
                )?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "100", is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.environment == Environment::Prod {
            if self.jwt.secret == "dev-secret-change-me-in-production" {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be set in production"
                )));
            }

            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.security.recovery_login_code.is_some() {
                tracing::warn!("recovery login code is enabled in production");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e))
        })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(SwaggerMode::Public),
            "disabled" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}
