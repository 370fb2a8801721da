//! Configuration loading and representation.
//!
//! Defaults, optionally overlaid by a TOML file, then by environment variables.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_CONFIG_FILE: &str = "STOCKLEDGER_CONFIG";
pub const ENV_BIND_ADDR: &str = "STOCKLEDGER_BIND_ADDR";
pub const ENV_LOG_FORMAT: &str = "STOCKLEDGER_LOG_FORMAT";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_DB_MAX_CONNECTIONS: &str = "STOCKLEDGER_DB_MAX_CONNECTIONS";
pub const ENV_RUN_MIGRATIONS: &str = "STOCKLEDGER_RUN_MIGRATIONS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listen address.
    pub bind_addr: String,

    /// `json` or `pretty`.
    pub log_format: String,

    /// Postgres settings. Without them the service runs on the in-memory store.
    pub database: Option<DatabaseConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            log_format: "json".to_string(),
            database: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "DatabaseConfig::default_max_connections")]
    pub max_connections: u32,

    /// Apply bundled migrations at startup.
    #[serde(default = "DatabaseConfig::default_run_migrations")]
    pub run_migrations: bool,
}

impl DatabaseConfig {
    fn default_max_connections() -> u32 {
        10
    }

    fn default_run_migrations() -> bool {
        true
    }

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: Self::default_max_connections(),
            run_migrations: Self::default_run_migrations(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the process environment, starting from the file named by
    /// `STOCKLEDGER_CONFIG` when it is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = match std::env::var(ENV_CONFIG_FILE) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values found through `lookup` (environment-style keys).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            self.bind_addr = addr;
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.log_format = format;
        }
        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|u| !u.trim().is_empty()) {
            let existing = self.database.take();
            self.database = Some(match existing {
                Some(db) => DatabaseConfig { url, ..db },
                None => DatabaseConfig::new(url),
            });
        }
        if let Some(db) = self.database.as_mut() {
            if let Some(raw) = lookup(ENV_DB_MAX_CONNECTIONS) {
                db.max_connections = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                    key: ENV_DB_MAX_CONNECTIONS,
                    message: format!("{e}"),
                })?;
            }
            if let Some(raw) = lookup(ENV_RUN_MIGRATIONS) {
                db.run_migrations = parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                    key: ENV_RUN_MIGRATIONS,
                    message: format!("expected true/false, got {raw:?}"),
                })?;
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Invalid {
                key: "bind_addr",
                message: format!("not a socket address: {:?}", self.bind_addr),
            });
        }
        if let Some(db) = &self.database {
            if db.max_connections == 0 {
                return Err(ConfigError::Invalid {
                    key: "database.max_connections",
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_run_in_memory_on_port_5000() {
        let config = AppConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert!(config.database.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn database_url_enables_postgres_with_defaults() {
        let config = AppConfig::default()
            .with_overrides(env(&[(ENV_DATABASE_URL, "postgres://localhost/stock")]))
            .unwrap();
        let db = config.database.unwrap();
        assert_eq!(db.url, "postgres://localhost/stock");
        assert_eq!(db.max_connections, 10);
        assert!(db.run_migrations);
    }

    #[test]
    fn invalid_overrides_are_rejected() {
        let zero = AppConfig::default().with_overrides(env(&[
            (ENV_DATABASE_URL, "postgres://localhost/stock"),
            (ENV_DB_MAX_CONNECTIONS, "0"),
        ]));
        assert!(matches!(zero, Err(ConfigError::Invalid { .. })));

        let flag = AppConfig::default().with_overrides(env(&[
            (ENV_DATABASE_URL, "postgres://localhost/stock"),
            (ENV_RUN_MIGRATIONS, "maybe"),
        ]));
        assert!(matches!(flag, Err(ConfigError::Invalid { .. })));

        let addr = AppConfig::default().with_overrides(env(&[(ENV_BIND_ADDR, "nowhere")]));
        assert!(matches!(addr, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn file_values_are_overridden_by_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
bind_addr = "127.0.0.1:7000"

[database]
url = "postgres://file/stock"
max_connections = 4
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path())
            .unwrap()
            .with_overrides(env(&[(ENV_DB_MAX_CONNECTIONS, "8")]))
            .unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:7000");
        let db = config.database.unwrap();
        assert_eq!(db.url, "postgres://file/stock");
        assert_eq!(db.max_connections, 8);
        assert!(db.run_migrations);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_addr = [").unwrap();
        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
