//! Configuration file handling

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::paths::{config_path, default_socket_path};
use super::Result;
use crate::ipc::ClientOptions;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Underlying IPC client settings
    #[serde(default)]
    pub client: ClientConfig,
}

/// Provider settings
#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
    /// IPC socket of the node; falls back to the platform default
    #[serde(default)]
    pub socket_path: Option<String>,

    /// Time to wait for a response, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    20_000
}

/// IPC client settings
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Maximum size of a single buffered response
    #[serde(default = "default_max_message_mb")]
    pub max_message_mb: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_message_mb: default_max_message_mb(),
        }
    }
}

fn default_max_message_mb() -> usize {
    10
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Resolve the socket path, preferring an explicit override
    pub fn socket_path(&self, explicit: Option<String>) -> String {
        explicit
            .or_else(|| self.provider.socket_path.clone())
            .unwrap_or_else(default_socket_path)
    }

    /// Provider timeout, preferring an explicit override in milliseconds
    pub fn timeout(&self, explicit_ms: Option<u64>) -> Duration {
        Duration::from_millis(explicit_ms.unwrap_or(self.provider.timeout_ms))
    }

    /// Options for IPC clients created under this configuration
    ///
    /// Auto-reconnect is always disabled for provider-owned clients.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            auto_reconnect: false,
            max_message_size: self.client.max_message_mb * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.provider.timeout_ms, 20_000);
        assert!(config.provider.socket_path.is_none());
        assert_eq!(config.client.max_message_mb, 10);
    }

    #[test]
    fn test_parse_provider_section() {
        let config = Config::parse(
            r#"
            [provider]
            socket_path = "/tmp/node.ipc"
            timeout_ms = 500

            [client]
            max_message_mb = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.socket_path(None), "/tmp/node.ipc");
        assert_eq!(config.timeout(None), Duration::from_millis(500));
        assert_eq!(config.client_options().max_message_size, 1024 * 1024);
        assert!(!config.client_options().auto_reconnect);
    }

    #[test]
    fn test_explicit_values_override_config() {
        let config = Config::parse("[provider]\nsocket_path = \"/tmp/a.ipc\"\n").unwrap();
        assert_eq!(
            config.socket_path(Some("/tmp/b.ipc".to_string())),
            "/tmp/b.ipc"
        );
        assert_eq!(config.timeout(Some(42)), Duration::from_millis(42));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = Config::parse("[provider]\ntimeout_ms = \"soon\"\n").unwrap_err();
        assert!(matches!(err, crate::Error::ConfigParse(_)));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.provider.timeout_ms, 20_000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[provider]\ntimeout_ms = 1234\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.provider.timeout_ms, 1234);
    }
}
