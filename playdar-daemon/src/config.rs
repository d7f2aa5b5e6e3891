//! # Configuration Management Module
//!
//! Loads the daemon's JSON configuration file and validates it before the
//! server starts. Fields mirror spec.md §6 (`name`, `httpbase`, `db`,
//! `www_root`, `disableauth`, `authdb`, `plugins`) plus the ambient server,
//! registry and logging settings the teacher always carries alongside its
//! domain config (`ultrafast-gateway/src/config.rs`'s `Config` /
//! `ServerConfig` / `CorsConfig` shape) — adapted from the teacher's TOML
//! file to the JSON file spec.md mandates.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Display name for this daemon instance.
    pub name: String,
    /// Externally visible base URL, used when building absolute links.
    pub httpbase: String,
    /// Persistent store path. Opaque to the resolution engine; carried
    /// through only so a concrete plugin implementation can find it.
    #[serde(default)]
    pub db: String,
    /// Static-file root for `www_root`-served assets.
    #[serde(default)]
    pub www_root: String,
    /// When true, `AuthGate` accepts every request regardless of origin.
    #[serde(default)]
    pub disableauth: bool,
    /// Auth-token store path (opaque; the store itself is out of scope).
    #[serde(default)]
    pub authdb: String,
    /// Per-plugin configuration subtrees, keyed by plugin name.
    #[serde(default)]
    pub plugins: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub registry: RegistryFileConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "playdar".to_string(),
            httpbase: "http://localhost:60210/".to_string(),
            db: String::new(),
            www_root: String::new(),
            disableauth: false,
            authdb: String::new(),
            plugins: HashMap::new(),
            server: ServerConfig::default(),
            registry: RegistryFileConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// HTTP server binding and middleware settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 60210,
            timeout_secs: 30,
            cors: CorsConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// `QueryRegistry` settings sourced from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryFileConfig {
    pub retention_window_secs: u64,
    pub sweep_interval_secs: u64,
    pub plugin_queue_capacity: usize,
}

impl Default for RegistryFileConfig {
    fn default() -> Self {
        Self {
            retention_window_secs: 3600,
            sweep_interval_secs: 60,
            plugin_queue_capacity: 64,
        }
    }
}

impl RegistryFileConfig {
    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(self.retention_window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Load and validate a JSON config file from `path`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_string(),
            source: e,
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.is_empty() {
            return Err(ConfigError::Invalid("server.host cannot be empty".to_string()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port cannot be 0".to_string()));
        }
        if self.registry.retention_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "registry.retention_window_secs cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn parses_minimal_json() {
        let json = r#"{"name": "home", "httpbase": "http://localhost:60210/"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.name, "home");
        assert_eq!(config.server.port, 60210);
        assert_eq!(config.registry.retention_window_secs, 3600);
    }

    #[test]
    fn rejects_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load("/nonexistent/playdar.json").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
