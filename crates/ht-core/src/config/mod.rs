//! Configuration management for hopterm

mod console;
mod host;
pub mod serde_utils;

pub use console::{ConsoleConfig, HostKeyPolicy, AGENT_SOCKET_ENV};
pub use host::{log_file_name, HostEntry};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hopterm")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    tracing::debug!("Wrote configuration to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load_config::<ConsoleConfig>(&dir.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = ConsoleConfig {
            username: "ops".to_string(),
            host_key_policy: HostKeyPolicy::AcceptAny,
            hosts: vec![HostEntry::new("bastion/web-1")],
            ..Default::default()
        };
        save_config(&path, &config).unwrap();

        let loaded: ConsoleConfig = load_config(&path).unwrap();
        assert_eq!(loaded.username, "ops");
        assert_eq!(loaded.host_key_policy, HostKeyPolicy::AcceptAny);
        assert_eq!(loaded.hosts, config.hosts);
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "username = [").unwrap();
        assert!(matches!(
            load_config::<ConsoleConfig>(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
