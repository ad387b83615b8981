//! API server configuration.

use tally_core::auth::AuthConfig;
use tally_core::auth::password::DEFAULT_BCRYPT_COST;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3100";
const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/tally";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set to a non-empty value")]
    MissingJwtSecret,

    #[error("invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    pub db_max_connections: u32,
    /// Token signing and password hashing settings.
    pub auth: AuthConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable             | Default                            |
    /// |----------------------|------------------------------------|
    /// | `BIND_ADDR`          | `127.0.0.1:3100`                   |
    /// | `DATABASE_URL`       | `postgres://localhost:5432/tally`  |
    /// | `DB_MAX_CONNECTIONS` | `10`                               |
    /// | `BCRYPT_COST`        | `10`                               |
    /// | `JWT_SECRET`         | required                           |
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingJwtSecret)?;

        let bcrypt_cost = parse_var("BCRYPT_COST", DEFAULT_BCRYPT_COST)?;
        let db_max_connections = parse_var("DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?;

        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.into()),
            db_max_connections,
            auth: AuthConfig::new(jwt_secret).with_bcrypt_cost(bcrypt_cost),
        })
    }
}

fn parse_var(var: &'static str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}
