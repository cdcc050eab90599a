//! Session configuration via `esorm.toml`
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration pointing at `http://localhost:9200`. `ES_HOST` and
//! `ES_PORT` in the environment override the file.

use crate::visibility::VisibilityConfig;
use esorm_core::{Error, Result};
use esorm_storage::{HttpStoreConfig, DEFAULT_BULK_CHUNK_SIZE, DEFAULT_SEARCH_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "esorm.toml";

/// Environment variable overriding `host`
pub const ENV_HOST: &str = "ES_HOST";
/// Environment variable overriding `port`
pub const ENV_PORT: &str = "ES_PORT";

/// Session configuration loaded from `esorm.toml`.
///
/// # Example
///
/// ```toml
/// host = "localhost"
/// port = 9200
/// primary_index = "orm"
/// version_index = "version"
///
/// [visibility]
/// deadline_ms = 5000
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EsormConfig {
    /// `http` or `https`
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Store host name
    #[serde(default = "default_host")]
    pub host: String,
    /// Store port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Collection holding one document per uid
    #[serde(default = "default_primary_index")]
    pub primary_index: String,
    /// Collection holding version records
    #[serde(default = "default_version_index")]
    pub version_index: String,
    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Basic-auth user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Basic-auth password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Conditional-write attempts per insert before giving up
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: usize,
    /// Actions per bulk round trip
    #[serde(default = "default_bulk_chunk_size")]
    pub bulk_chunk_size: usize,
    /// Hits requested per search
    #[serde(default = "default_search_size")]
    pub search_size: usize,
    /// Read-after-write polling
    #[serde(default)]
    pub visibility: VisibilityConfig,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    9200
}

fn default_primary_index() -> String {
    "orm".to_string()
}

fn default_version_index() -> String {
    "version".to_string()
}

fn default_timeout_ms() -> u64 {
    3_000_000
}

fn default_max_write_attempts() -> usize {
    3
}

fn default_bulk_chunk_size() -> usize {
    DEFAULT_BULK_CHUNK_SIZE
}

fn default_search_size() -> usize {
    DEFAULT_SEARCH_SIZE
}

impl Default for EsormConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            host: default_host(),
            port: default_port(),
            primary_index: default_primary_index(),
            version_index: default_version_index(),
            timeout_ms: default_timeout_ms(),
            username: None,
            password: None,
            max_write_attempts: default_max_write_attempts(),
            bulk_chunk_size: default_bulk_chunk_size(),
            search_size: default_search_size(),
            visibility: VisibilityConfig::default(),
        }
    }
}

impl EsormConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# esorm configuration
#
# Store endpoint. ES_HOST / ES_PORT in the environment take precedence.
scheme = "http"
host = "localhost"
port = 9200

# Collections: one document per uid, and one record per version
primary_index = "orm"
version_index = "version"

# Per-request timeout in milliseconds
timeout_ms = 3000000

# Basic auth (optional)
# username = "elastic"
# password = "changeme"

# Conditional-write attempts per insert before reporting a conflict
max_write_attempts = 3

# Actions per bulk round trip
bulk_chunk_size = 1000

# Hits requested per search
search_size = 10000

# Read-after-write polling after save
[visibility]
base_delay_ms = 25
max_delay_ms = 500
deadline_ms = 5000
"#
    }

    /// Parse a config from TOML text and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EsormConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{} ({})", msg, path.display())),
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Apply `ES_HOST` / `ES_PORT` from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply host/port overrides from an arbitrary variable source.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} is not a valid port: '{}'", ENV_PORT, port)))?;
        }
        Ok(self)
    }

    /// Reject settings the session cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.scheme != "http" && self.scheme != "https" {
            return Err(Error::Config(format!(
                "scheme must be \"http\" or \"https\", got '{}'",
                self.scheme
            )));
        }
        if self.primary_index.is_empty() || self.version_index.is_empty() {
            return Err(Error::Config("index names must not be empty".to_string()));
        }
        if self.primary_index == self.version_index {
            return Err(Error::Config(format!(
                "primary and version index must differ, both are '{}'",
                self.primary_index
            )));
        }
        if self.max_write_attempts == 0 {
            return Err(Error::Config("max_write_attempts must be at least 1".to_string()));
        }
        if self.bulk_chunk_size == 0 {
            return Err(Error::Config("bulk_chunk_size must be at least 1".to_string()));
        }
        if self.search_size == 0 {
            return Err(Error::Config("search_size must be at least 1".to_string()));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(Error::Config(
                "username and password must be set together".to_string(),
            ));
        }
        Ok(())
    }

    /// `scheme://host:port`
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// Connection settings for the HTTP backend
    pub fn http_store_config(&self) -> HttpStoreConfig {
        let mut http = HttpStoreConfig::new(self.base_url());
        http.timeout = Duration::from_millis(self.timeout_ms);
        http.search_size = self.search_size;
        if let (Some(user), Some(password)) = (&self.username, &self.password) {
            http.credentials = Some((user.clone(), password.clone()));
        }
        http
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn default_config_points_at_localhost() {
        let config = EsormConfig::default();
        assert_eq!(config.base_url(), "http://localhost:9200");
        assert_eq!(config.primary_index, "orm");
        assert_eq!(config.version_index, "version");
        assert_eq!(config.bulk_chunk_size, 1000);
        config.validate().unwrap();
    }

    #[test]
    fn empty_toml_is_default() {
        let config = EsormConfig::from_toml_str("").unwrap();
        assert_eq!(config, EsormConfig::default());
    }

    #[test]
    fn default_toml_parses_to_default() {
        let config = EsormConfig::from_toml_str(EsormConfig::default_toml()).unwrap();
        assert_eq!(config, EsormConfig::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = EsormConfig::from_toml_str(
            "host = \"es.internal\"\n[visibility]\ndeadline_ms = 100\n",
        )
        .unwrap();
        assert_eq!(config.host, "es.internal");
        assert_eq!(config.port, 9200);
        assert_eq!(config.visibility.deadline_ms, 100);
        assert_eq!(config.visibility.base_delay_ms, VisibilityConfig::default().base_delay_ms);
    }

    #[test]
    fn invalid_settings_rejected() {
        for toml in [
            "max_write_attempts = 0",
            "bulk_chunk_size = 0",
            "primary_index = \"same\"\nversion_index = \"same\"",
            "scheme = \"ftp\"",
            "username = \"elastic\"",
            "port = \"not a number\"",
        ] {
            let err = EsormConfig::from_toml_str(toml).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{} -> {:?}", toml, err);
        }
    }

    #[test]
    fn env_overrides_host_and_port() {
        let env: HashMap<&str, &str> = [(ENV_HOST, "search-1"), (ENV_PORT, "9300")].into();
        let config = EsormConfig::default()
            .with_overrides_from(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.base_url(), "http://search-1:9300");
    }

    #[test]
    fn env_bad_port_is_config_error() {
        let err = EsormConfig::default()
            .with_overrides_from(|k| (k == ENV_PORT).then(|| "ninety".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn http_store_config_carries_credentials() {
        let config = EsormConfig {
            username: Some("elastic".into()),
            password: Some("changeme".into()),
            timeout_ms: 1500,
            ..EsormConfig::default()
        };
        let http = config.http_store_config();
        assert_eq!(http.base_url, "http://localhost:9200");
        assert_eq!(http.timeout, Duration::from_millis(1500));
        assert_eq!(
            http.credentials,
            Some(("elastic".to_string(), "changeme".to_string()))
        );
    }

    #[test]
    fn write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        EsormConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());

        let config = EsormConfig::from_file(&path).unwrap();
        assert_eq!(config, EsormConfig::default());
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "host = \"custom\"\n").unwrap();
        EsormConfig::write_default_if_missing(&path).unwrap();

        let config = EsormConfig::from_file(&path).unwrap();
        assert_eq!(config.host, "custom");
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = EsormConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
