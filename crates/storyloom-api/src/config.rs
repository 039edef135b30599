//! Server configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SESSIONS_FILE: &str = "storyloom-sessions.json";
const DEFAULT_GENERATOR_TIMEOUT_SECS: u64 = 120;

/// Where the session library is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// A `PostgreSQL` database.
    Postgres {
        /// Connection string.
        database_url: String,
    },
    /// A JSON file on local disk.
    File {
        /// Library file path.
        path: PathBuf,
    },
}

/// Settings for the HTTP generator provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Endpoint that accepts generation requests.
    pub url: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Complete server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Session persistence backend.
    pub store: StoreConfig,
    /// Generator provider.
    pub generator: GeneratorConfig,
    /// OTLP/gRPC collector endpoint; span export is disabled when unset.
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value cannot be parsed.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a required variable is missing or a
    /// value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let host = var("HOST").unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let port = match var("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?,
            None => DEFAULT_PORT,
        };

        let store = match var("DATABASE_URL") {
            Some(database_url) => StoreConfig::Postgres { database_url },
            None => StoreConfig::File {
                path: var("SESSIONS_FILE")
                    .unwrap_or_else(|| DEFAULT_SESSIONS_FILE.to_owned())
                    .into(),
            },
        };

        let url = var("GENERATOR_URL").ok_or_else(|| {
            AppError::Config("GENERATOR_URL environment variable must be set".to_owned())
        })?;
        let timeout_secs = match var("GENERATOR_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                AppError::Config(format!("GENERATOR_TIMEOUT_SECS must be a whole number: {e}"))
            })?,
            None => DEFAULT_GENERATOR_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            return Err(AppError::Config(
                "GENERATOR_TIMEOUT_SECS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            host,
            port,
            store,
            generator: GeneratorConfig {
                url,
                api_key: var("GENERATOR_API_KEY"),
                timeout: Duration::from_secs(timeout_secs),
            },
            otlp_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT"),
        })
    }

    /// The address to bind.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if host and port do not form an address.
    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_use_file_store() {
        // Arrange
        let vars = [("GENERATOR_URL", "http://localhost:8088/generate")];

        // Act
        let config = config_from(&vars).unwrap();

        // Assert
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(
            config.store,
            StoreConfig::File {
                path: PathBuf::from("storyloom-sessions.json")
            }
        );
        assert_eq!(config.generator.timeout, Duration::from_secs(120));
        assert!(config.generator.api_key.is_none());
        assert!(config.otlp_endpoint.is_none());
    }

    #[test]
    fn test_database_url_selects_postgres_store() {
        let config = config_from(&[
            ("GENERATOR_URL", "http://gen"),
            ("DATABASE_URL", "postgres://localhost/storyloom"),
            ("SESSIONS_FILE", "/tmp/ignored.json"),
        ])
        .unwrap();

        assert_eq!(
            config.store,
            StoreConfig::Postgres {
                database_url: "postgres://localhost/storyloom".to_owned()
            }
        );
    }

    #[test]
    fn test_missing_generator_url_is_a_config_error() {
        let err = config_from(&[("PORT", "8080")]).unwrap_err();

        assert!(matches!(err, AppError::Config(message) if message.contains("GENERATOR_URL")));
    }

    #[test]
    fn test_invalid_numbers_are_config_errors() {
        assert!(matches!(
            config_from(&[("GENERATOR_URL", "http://gen"), ("PORT", "eighty")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            config_from(&[
                ("GENERATOR_URL", "http://gen"),
                ("GENERATOR_TIMEOUT_SECS", "0")
            ]),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let config = config_from(&[
            ("GENERATOR_URL", "http://gen"),
            ("GENERATOR_API_KEY", "  "),
            ("OTEL_EXPORTER_OTLP_ENDPOINT", ""),
            ("HOST", "127.0.0.1"),
        ])
        .unwrap();

        assert!(config.generator.api_key.is_none());
        assert!(config.otlp_endpoint.is_none());
        assert_eq!(
            config.socket_addr().unwrap(),
            "127.0.0.1:3000".parse::<SocketAddr>().unwrap()
        );
    }
}
