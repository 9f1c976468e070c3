//! Configuration system for Trellis.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $TRELLIS_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/trellis/config.toml
//!   3. ~/.config/trellis/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::wire::CLUSTER_TYPE_URL;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrellisConfig {
    pub network: NetworkConfig,
    pub discovery: DiscoveryConfig,
    pub graph: GraphConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the discovery listener binds to.
    pub bind: String,
    /// TCP port proxies open discovery streams on.
    pub discovery_port: u16,
    /// Address the debug HTTP surface binds to.
    pub api_bind: String,
    /// TCP port for the debug HTTP surface.
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Log every request, ack and push. Can be flipped at runtime via /debug/cdsz.
    pub verbose: bool,
    /// Type URL stamped on responses.
    pub type_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Service graph file (TOML).
    pub path: PathBuf,
    /// How often the file is checked for changes. 0 = never.
    pub poll_interval_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            discovery_port: 15010,
            api_bind: "127.0.0.1".to_string(),
            api_port: 9093,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            verbose: true,
            type_url: CLUSTER_TYPE_URL.to_string(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            path: config_dir().join("graph.toml"),
            poll_interval_secs: 2,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("trellis")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl TrellisConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_file(&Self::file_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load a specific file without env overrides. A missing file yields defaults.
    pub fn load_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(TrellisConfig::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("TRELLIS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&TrellisConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply TRELLIS_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("TRELLIS_NETWORK__BIND") {
            self.network.bind = v;
        }
        if let Some(p) = var("TRELLIS_NETWORK__DISCOVERY_PORT").and_then(|v| v.parse().ok()) {
            self.network.discovery_port = p;
        }
        if let Some(p) = var("TRELLIS_NETWORK__API_PORT").and_then(|v| v.parse().ok()) {
            self.network.api_port = p;
        }
        if let Some(v) = var("TRELLIS_GRAPH__PATH") {
            self.graph.path = PathBuf::from(v);
        }
        if let Some(v) = var("TRELLIS_DEBUG") {
            self.discovery.verbose = v != "0";
        }
    }
}
