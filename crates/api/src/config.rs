use std::env;
use std::str::FromStr;
use std::time::Duration;

use doclake_core::store::ConnectionSettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// PostgreSQL connection URL.
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_connect_timeout: Duration,
    /// Collection the watcher writes history entries to.
    pub history_collection: String,
    /// Collections whose changes are recorded.
    pub watch_collections: Vec<String>,
    /// Log level used when `RUST_LOG` is not set.
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let watch_collections: Vec<String> = required(&lookup, "WATCH_COLLECTIONS")?
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        if watch_collections.is_empty() {
            return Err(ConfigError::Missing("WATCH_COLLECTIONS"));
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed(&lookup, "PORT", 3030)?,
            database_url: required(&lookup, "DATABASE_URL")?,
            db_max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS", 20)?,
            db_min_connections: parsed(&lookup, "DB_MIN_CONNECTIONS", 5)?,
            db_connect_timeout: Duration::from_secs(parsed(
                &lookup,
                "DB_CONNECT_TIMEOUT_SECS",
                30,
            )?),
            history_collection: lookup("HISTORY_COLLECTION")
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "history".to_string()),
            watch_collections,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Build the socket address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings::new(&self.database_url)
            .max_connections(self.db_max_connections)
            .min_connections(self.db_min_connections)
            .connect_timeout(self.db_connect_timeout)
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parsed<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
