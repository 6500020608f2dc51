//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use english_coach_core::quota::DEFAULT_DAILY_LIMIT;
use std::net::SocketAddr;
use tracing::Level;

const DEFAULT_MODEL: &str = "google/gemini-2.5-flash-lite-preview-09-2025";
const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
const DEFAULT_CLIENT_URL: &str = "http://localhost:5173";
const DEVELOPMENT_TOKEN_SECRET: &str = "development-only-token-secret";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which kind of deployment is running. Governs error detail exposure,
/// panic handling and startup fallbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        *self == Environment::Development
    }
}

/// Client credentials for the Google sign-in flow.
#[derive(Clone, Debug)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: Option<String>,
    pub log_level: Level,
    pub environment: Environment,
    pub llm_api_key: Option<String>,
    pub llm_api_base: String,
    pub llm_model: String,
    pub token_secret: String,
    pub google: Option<GoogleOAuthConfig>,
    pub client_url: String,
    pub allowed_origins: Vec<String>,
    pub daily_quota: u32,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let environment = match var("APP_ENV").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("development") | Some("dev") => Environment::Development,
            Some("production") | Some("prod") => Environment::Production,
            Some(other) => {
                return Err(ConfigError::InvalidValue(
                    "APP_ENV".to_string(),
                    format!("'{}' is not one of development, production", other),
                ))
            }
        };

        // --- Server and Database Settings ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| {
            let port = var("PORT").unwrap_or_else(|| "5000".to_string());
            format!("0.0.0.0:{}", port)
        });
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = var("DATABASE_URL");
        if database_url.is_none() && environment == Environment::Production {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- LLM Settings (the key is optional: calls fail per request without it) ---
        let llm_api_key = var("OPENROUTER_API_KEY").or_else(|| var("GEMINI_API_KEY"));
        let llm_api_base = var("LLM_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let llm_model = var("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        // --- Auth Settings ---
        let token_secret = match var("TOKEN_SECRET").or_else(|| var("JWT_SECRET")) {
            Some(secret) => secret,
            None if environment.is_development() => DEVELOPMENT_TOKEN_SECRET.to_string(),
            None => return Err(ConfigError::MissingVar("TOKEN_SECRET".to_string())),
        };

        let google = match (var("GOOGLE_CLIENT_ID"), var("GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret,
                callback_url: var("GOOGLE_CALLBACK_URL").unwrap_or_else(|| {
                    format!("http://localhost:{}/api/auth/google/callback", bind_address.port())
                }),
            }),
            _ => None,
        };

        // --- Browser Settings ---
        let client_url = var("CLIENT_URL").unwrap_or_else(|| DEFAULT_CLIENT_URL.to_string());
        let allowed_origins = match var("ALLOWED_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            None => vec![client_url.clone(), "http://localhost:3000".to_string()],
        };

        let daily_quota = match var("DAILY_QUOTA") {
            Some(raw) => raw.parse::<u32>().map_err(|e| {
                ConfigError::InvalidValue("DAILY_QUOTA".to_string(), e.to_string())
            })?,
            None => DEFAULT_DAILY_LIMIT,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            environment,
            llm_api_key,
            llm_api_base,
            llm_model,
            token_secret,
            google,
            client_url,
            allowed_origins,
            daily_quota,
        })
    }

    /// A development configuration with no external services, used by tests.
    pub fn for_tests() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url: None,
            log_level: Level::DEBUG,
            environment: Environment::Development,
            llm_api_key: None,
            llm_api_base: DEFAULT_API_BASE.to_string(),
            llm_model: DEFAULT_MODEL.to_string(),
            token_secret: DEVELOPMENT_TOKEN_SECRET.to_string(),
            google: None,
            client_url: DEFAULT_CLIENT_URL.to_string(),
            allowed_origins: vec![DEFAULT_CLIENT_URL.to_string()],
            daily_quota: DEFAULT_DAILY_LIMIT,
        }
    }
}
