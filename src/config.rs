//! Mount configuration: display names, the attribute validity window and
//! the store endpoint, loadable from a YAML file with sensible defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Filesystem display name reported to the kernel.
    #[serde(default = "default_fs_name")]
    pub fs_name: String,

    /// Mount subtype tag.
    #[serde(default = "default_subtype")]
    pub subtype: String,

    /// Volume display name, on hosts that surface one.
    #[serde(default = "default_volume_name")]
    pub volume_name: String,

    /// Mark the mount as a local volume, on hosts that support it.
    #[serde(default)]
    pub local_volume: bool,

    /// How long the kernel may cache reported attributes, in seconds.
    #[serde(default = "default_attr_ttl_secs")]
    pub attr_ttl_secs: u64,

    /// Backing store endpoint.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

fn default_fs_name() -> String {
    "rsfs".to_string()
}

fn default_subtype() -> String {
    "streamfs".to_string()
}

fn default_volume_name() -> String {
    "Redis Streams".to_string()
}

fn default_attr_ttl_secs() -> u64 {
    1
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fs_name: default_fs_name(),
            subtype: default_subtype(),
            volume_name: default_volume_name(),
            local_volume: false,
            attr_ttl_secs: default_attr_ttl_secs(),
            redis_url: default_redis_url(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Load configuration from the default search path, falling back to
    /// built-in defaults when no file is present.
    pub fn from_default_path() -> Result<Self, ConfigError> {
        let possible_paths = ["streamfs.yml", "streamfs.yaml", "/etc/streamfs/config.yml"];
        for path in &possible_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }
        Ok(Self::default())
    }

    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: Config = serde_yaml::from_str("redis_url: redis://store:6379\n").unwrap();
        assert_eq!(config.redis_url, "redis://store:6379");
        assert_eq!(config.fs_name, "rsfs");
        assert_eq!(config.subtype, "streamfs");
        assert_eq!(config.attr_ttl(), Duration::from_secs(1));
        assert!(!config.local_volume);
    }
}
