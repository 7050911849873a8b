//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use ct_core::config::{self, ClientConfig};
use ct_core::ConfigError;

fn resolve_path(config_path: Option<&PathBuf>) -> PathBuf {
    config_path.cloned().unwrap_or_else(config::default_config_path)
}

/// Load the client config, falling back to defaults when the file is absent
pub fn load_client_config(config_path: Option<&PathBuf>) -> Result<ClientConfig> {
    let path = resolve_path(config_path);
    match config::load_config::<ClientConfig>(&path) {
        Ok(config) => {
            tracing::debug!(path = %path.display(), "Loaded configuration");
            Ok(config)
        }
        Err(ConfigError::NotFound(_)) => {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");
            Ok(ClientConfig::default())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to load config file: {:?}", path)),
    }
}

/// Print the config file path
pub fn config_path(config_path: Option<&PathBuf>) -> Result<()> {
    println!("{}", resolve_path(config_path).display());
    Ok(())
}

/// Show current configuration
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve_path(config_path);

    if !path.exists() {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Run 'cluster-term config init' to create one. Defaults in effect:");
        println!();
        println!("{}", toml::to_string_pretty(&ClientConfig::default())?);
        return Ok(());
    }

    print_info(&format!("Configuration file: {:?}", path));
    println!();

    let content =
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read config file: {:?}", path))?;
    println!("{}", content);

    Ok(())
}

/// Write a default configuration file
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = resolve_path(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    write_default(&path)?;
    print_success(&format!("Created configuration file: {:?}", path));
    Ok(())
}

fn write_default(path: &Path) -> Result<()> {
    config::save_config(path, &ClientConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))
}
