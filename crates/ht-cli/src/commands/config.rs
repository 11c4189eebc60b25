//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success};
use ht_core::config::{self, ConsoleConfig};
use ht_core::error::ConfigError;

/// Config file to use: the explicit one, else the default location
pub fn resolve_config_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path)
}

/// Load the console configuration.
///
/// A missing file at the default location yields the defaults; a missing
/// file that was asked for explicitly is an error.
pub fn load_console_config(config_path: Option<&Path>) -> Result<ConsoleConfig> {
    let path = resolve_config_path(config_path);

    let config = match config::load_config::<ConsoleConfig>(&path) {
        Ok(config) => config,
        Err(ConfigError::NotFound(_)) if config_path.is_none() => {
            tracing::debug!("No config at {:?}, using defaults", path);
            ConsoleConfig::default()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to load config {:?}", path));
        }
    };

    config
        .validate()
        .with_context(|| format!("Invalid config {:?}", path))?;
    Ok(config)
}

/// Print the effective configuration as TOML
pub fn config_show(config_path: Option<&Path>) -> Result<()> {
    let path = resolve_config_path(config_path);
    let config = load_console_config(config_path)?;

    if path.exists() {
        print_info(&format!("Configuration file: {:?}", path));
    } else {
        print_info(&format!("No configuration file at {:?}; showing defaults", path));
    }

    let content = toml::to_string_pretty(&config).context("Failed to serialize config")?;
    println!("{}", content);
    Ok(())
}

/// Print the configuration file path
pub fn config_path(config_path: Option<&Path>) -> Result<()> {
    println!("{}", resolve_config_path(config_path).display());
    Ok(())
}

/// Write a default configuration file
pub fn config_init(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = resolve_config_path(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        anyhow::bail!("refusing to overwrite {:?}", path);
    }

    config::save_config(&path, &ConsoleConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    print_success(&format!("Created configuration file: {:?}", path));
    print_info("Add hosts as [[hosts]] entries with a `chain` and optional `title` and `tags`");
    Ok(())
}
