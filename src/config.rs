//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;

use chrono::Duration;

use crate::services::DEFAULT_SESSION_TTL_MINUTES;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Administrator created on first start when no admin exists
#[derive(Clone)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSeed")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL; the in-memory store is used when absent
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    pub log_format: LogFormat,

    /// Lifetime of a login session
    pub session_ttl: Duration,

    pub admin: AdminSeed,
}

const DEFAULT_ADMIN_PASSWORD: &str = "admin";

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let database_max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PORT"))?;

        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(_) => return Err(ConfigError::InvalidValue("LOG_FORMAT")),
        };

        let session_ttl = match lookup("SESSION_TTL_MINUTES") {
            None => Duration::minutes(DEFAULT_SESSION_TTL_MINUTES),
            Some(raw) => match raw.parse::<i64>() {
                Ok(minutes) if minutes > 0 => Duration::minutes(minutes),
                _ => return Err(ConfigError::InvalidValue("SESSION_TTL_MINUTES")),
            },
        };

        let password = match lookup("ADMIN_PASSWORD") {
            Some(password) if !password.is_empty() => password,
            _ if environment == "production" => {
                return Err(ConfigError::MissingEnv("ADMIN_PASSWORD"))
            }
            _ => DEFAULT_ADMIN_PASSWORD.to_string(),
        };
        let admin = AdminSeed {
            name: lookup("ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string()),
            email: lookup("ADMIN_EMAIL").unwrap_or_else(|| "admin@localhost".to_string()),
            password,
        };

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            log_format,
            session_ttl,
            admin,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
