//! Process configuration read from the environment.

use std::net::SocketAddr;

use thiserror::Error;

use orderflow_observability::LogFormat;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Runtime settings for the API binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// Postgres connection string. `None` selects the in-memory backend.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub log_format: LogFormat,
    pub default_low_stock_threshold: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            db_max_connections: 10,
            log_format: LogFormat::Json,
            default_low_stock_threshold: 10,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset or blank variables keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(raw) = get("ORDERFLOW_BIND_ADDR") {
            config.bind_addr = parse("ORDERFLOW_BIND_ADDR", &raw)?;
        }
        config.database_url = get("DATABASE_URL");
        if let Some(raw) = get("ORDERFLOW_DB_MAX_CONNECTIONS") {
            config.db_max_connections = parse("ORDERFLOW_DB_MAX_CONNECTIONS", &raw)?;
            if config.db_max_connections == 0 {
                return Err(invalid("ORDERFLOW_DB_MAX_CONNECTIONS", "must be at least 1"));
            }
        }
        if let Some(raw) = get("ORDERFLOW_LOG_FORMAT") {
            config.log_format = parse("ORDERFLOW_LOG_FORMAT", &raw)?;
        }
        if let Some(raw) = get("ORDERFLOW_DEFAULT_LOW_STOCK_THRESHOLD") {
            config.default_low_stock_threshold = parse("ORDERFLOW_DEFAULT_LOW_STOCK_THRESHOLD", &raw)?;
            if config.default_low_stock_threshold < 0 {
                return Err(invalid("ORDERFLOW_DEFAULT_LOW_STOCK_THRESHOLD", "cannot be negative"));
            }
        }
        Ok(config)
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| invalid(name, e.to_string()))
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.into(),
    }
}
