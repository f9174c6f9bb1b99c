//! Bootstrap configuration loading
//!
//! Settings are resolved once at startup with the priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: a warning is logged and defaults are
//! used. A config file that exists but cannot be parsed is an error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

pub const ENV_CONFIG: &str = "CIFRA_CONFIG";
pub const ENV_DATABASE: &str = "CIFRA_DATABASE";
pub const ENV_HOST: &str = "CIFRA_HOST";
pub const ENV_PORT: &str = "CIFRA_PORT";
pub const ENV_ENVIRONMENT: &str = "CIFRA_ENV";
pub const ENV_LOG: &str = "CIFRA_LOG";

/// Deployment environment
///
/// Controls whether diagnostic details are exposed in error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(Error::Config(format!("Unknown environment: {}", other))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration loaded from the TOML file
///
/// Every field has a compiled default, so an empty file is valid.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Path to SQLite database file (relative or absolute)
    pub database_path: Option<PathBuf>,

    /// HTTP bind address
    pub host: String,

    /// HTTP server port
    pub port: u16,

    pub environment: Environment,

    /// Version segment of the API prefix (`/api/{version}/...`)
    pub api_version: String,

    /// Allowed CORS origins (empty allows any origin)
    pub cors_origins: Vec<String>,

    /// Maximum accepted request body size
    pub max_body_bytes: usize,

    pub logging: LoggingConfig,

    pub database: DatabaseConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            host: "127.0.0.1".to_string(),
            port: 3000,
            environment: Environment::default(),
            api_version: "v1".to_string(),
            cors_origins: Vec::new(),
            max_body_bytes: 10 * 1024 * 1024,
            logging: LoggingConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Connection pool settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            busy_timeout_ms: 5000,
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{} ({})", e, path.display())))
    }
}

/// Values supplied on the command line
///
/// `None` means "not given", letting lower-priority sources decide.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub environment: Option<Environment>,
    pub log_level: Option<String>,
}

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub api_version: String,
    pub cors_origins: Vec<String>,
    pub max_body_bytes: usize,
    pub log_level: String,
    pub database: DatabaseConfig,
}

impl ServerConfig {
    /// `host:port` string for binding the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Resolves [`ServerConfig`] from CLI overrides, environment, TOML file and defaults
pub struct ConfigResolver {
    overrides: ConfigOverrides,
}

impl ConfigResolver {
    pub fn new(overrides: ConfigOverrides) -> Self {
        Self { overrides }
    }

    /// Config file location: CLI argument, then `CIFRA_CONFIG`, then the platform default
    pub fn config_file_path(&self) -> Option<PathBuf> {
        self.overrides
            .config_file
            .clone()
            .or_else(|| std::env::var(ENV_CONFIG).ok().map(PathBuf::from))
            .or_else(default_config_file)
    }

    /// Log filter from the command line or `CIFRA_LOG`, read without touching the config file
    pub fn log_level_override(&self) -> Option<String> {
        self.overrides
            .log_level
            .clone()
            .or_else(|| std::env::var(ENV_LOG).ok())
    }

    pub fn resolve(&self) -> Result<ServerConfig> {
        let file = match self.config_file_path() {
            Some(path) if path.exists() => {
                info!("Loading configuration from {}", path.display());
                TomlConfig::load(&path)?
            }
            Some(path) => {
                warn!(
                    "Config file not found at {}, using defaults",
                    path.display()
                );
                TomlConfig::default()
            }
            None => {
                warn!("No config directory available on this platform, using defaults");
                TomlConfig::default()
            }
        };

        let env_port = match std::env::var(ENV_PORT) {
            Ok(value) => Some(value.trim().parse::<u16>().map_err(|_| {
                Error::Config(format!("{} must be a port number, got '{}'", ENV_PORT, value))
            })?),
            Err(_) => None,
        };
        let env_environment = match std::env::var(ENV_ENVIRONMENT) {
            Ok(value) => Some(value.parse::<Environment>()?),
            Err(_) => None,
        };

        let database_path = self
            .overrides
            .database_path
            .clone()
            .or_else(|| std::env::var(ENV_DATABASE).ok().map(PathBuf::from))
            .or(file.database_path)
            .unwrap_or_else(default_database_path);

        let host = self
            .overrides
            .host
            .clone()
            .or_else(|| std::env::var(ENV_HOST).ok())
            .unwrap_or(file.host);

        let port = self.overrides.port.or(env_port).unwrap_or(file.port);

        let environment = self
            .overrides
            .environment
            .or(env_environment)
            .unwrap_or(file.environment);

        let log_level = self.log_level_override().unwrap_or(file.logging.level);

        if file.api_version.is_empty() || file.api_version.contains('/') {
            return Err(Error::Config(format!(
                "api_version must be a single path segment, got '{}'",
                file.api_version
            )));
        }

        Ok(ServerConfig {
            database_path,
            host,
            port,
            environment,
            api_version: file.api_version,
            cors_origins: file.cors_origins,
            max_body_bytes: file.max_body_bytes,
            log_level,
            database: file.database,
        })
    }
}

/// Platform config file location (`~/.config/cifra/config.toml` on Linux)
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cifra").join("config.toml"))
}

/// OS-dependent default database location
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("cifra").join("cifra.db"))
        .unwrap_or_else(|| PathBuf::from("./cifra_data/cifra.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.api_version, "v1");
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.database, DatabaseConfig::default());
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_remaining_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            port = 8080
            environment = "production"

            [logging]
            level = "debug"

            [database]
            max_connections = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 8080);
        assert!(config.environment.is_production());
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.database.busy_timeout_ms, 5000);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let result = TomlConfig::from_toml_str("port = \"not a number\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!(" Development ".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("test".parse::<Environment>().unwrap(), Environment::Test);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn test_bind_address() {
        let config = ServerConfig {
            database_path: PathBuf::from("/tmp/cifra.db"),
            host: "0.0.0.0".to_string(),
            port: 4100,
            environment: Environment::Test,
            api_version: "v1".to_string(),
            cors_origins: Vec::new(),
            max_body_bytes: 1024,
            log_level: "info".to_string(),
            database: DatabaseConfig::default(),
        };
        assert_eq!(config.bind_address(), "0.0.0.0:4100");
    }
}
