//! Mount configuration, loaded from an optional `config.toml`.

use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    Ttl,
    None,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub strategy: CacheStrategy,
    pub attr_ttl_seconds: u64,
    pub dir_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            strategy: CacheStrategy::Ttl,
            attr_ttl_seconds: 2,
            dir_ttl_seconds: 1,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub attr_timeout_seconds: u64,
    pub entry_timeout_seconds: u64,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            attr_timeout_seconds: 2,
            entry_timeout_seconds: 2,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RemoteConfig {
    pub server_url: String,
    pub connect_timeout_seconds: u64,
    pub retry_max_attempts: u32,
    pub retry_budget_seconds: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            connect_timeout_seconds: 10,
            retry_max_attempts: 3,
            retry_budget_seconds: 10,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MountConfig {
    pub mountpoint: String,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            mountpoint: "~/mnt/remote-fs".to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub kernel: KernelConfig,
    pub remote: RemoteConfig,
    pub mount: MountConfig,
}

impl Config {
    /// Loads `config.toml` from `path` (or the current directory if
    /// `None`), falling back to defaults on any error.
    pub fn load(path: Option<&Path>) -> Config {
        let default_path = Path::new("config.toml");
        let path = path.unwrap_or(default_path);
        if !path.exists() {
            tracing::info!("{} not found, using default configuration", path.display());
            return Config::default();
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("failed to read {}: {e}, using defaults", path.display());
                return Config::default();
            }
        };

        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("failed to parse {}: {e}, using defaults", path.display());
                Config::default()
            }
        }
    }
}