//! Application configuration loaded from environment variables.

use std::time::Duration;

use stockroom_observability::LogFormat;
use thiserror::Error;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid value for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub reason: String,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `8080`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` or `pretty` (default: `json`)
/// - `DATABASE_URL`: Postgres connection string; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size, positive (default: `10`)
/// - `LOCK_TIMEOUT_MS`: per-transaction lock wait, positive (default: `5000`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub lock_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults for
    /// unset keys. Set but unparseable values are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: parse(&var, "PORT")?.unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT") {
                Some(v) => v.parse().map_err(|e: stockroom_observability::UnknownLogFormat| {
                    ConfigError {
                        key: "LOG_FORMAT",
                        reason: e.to_string(),
                    }
                })?,
                None => defaults.log_format,
            },
            database_url: var("DATABASE_URL"),
            database_max_connections: positive(
                parse::<u32, _>(&var, "DATABASE_MAX_CONNECTIONS")?,
                "DATABASE_MAX_CONNECTIONS",
            )?
            .unwrap_or(defaults.database_max_connections),
            lock_timeout: positive(parse::<u64, _>(&var, "LOCK_TIMEOUT_MS")?, "LOCK_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T, F>(var: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|v| {
            v.trim().parse::<T>().map_err(|e| ConfigError {
                key,
                reason: format!("`{v}`: {e}"),
            })
        })
        .transpose()
}

/// Rejects a zero value for `key`.
fn positive<T>(value: Option<T>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: Default + PartialEq,
{
    match value {
        Some(v) if v == T::default() => Err(ConfigError {
            key,
            reason: "must be greater than zero".to_string(),
        }),
        other => Ok(other),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::Json,
            database_url: None,
            database_max_connections: DEFAULT_MAX_CONNECTIONS,
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
        }
    }
}
