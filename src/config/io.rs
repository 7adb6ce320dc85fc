//! Configuration I/O - Loading and saving configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;

use super::types::Config;
use crate::error::{Error, Result};

/// A snapshot of the configuration file
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// Path to the config file
    pub path: std::path::PathBuf,
    /// Whether the file exists
    pub exists: bool,
    /// Raw file content
    pub raw: Option<String>,
    /// Parsed configuration
    pub config: Option<Config>,
    /// Validation issues
    pub issues: Vec<String>,
}

/// Load configuration from the default path
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    if config_path.exists() {
        load_config_from_path(&config_path)
    } else {
        // Try to load from environment variables
        load_config_from_env()
    }
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    // Detect format by extension
    let config: Config = if path.extension().map_or(false, |ext| ext == "json") {
        // Parse as JSON5 (more lenient than strict JSON)
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().map_or(false, |ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try JSON5 first, then TOML
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Load configuration from environment variables
pub fn load_config_from_env() -> Result<Config> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    let mut config = Config::default();

    if let Ok(model) = std::env::var("DEFAULT_MODEL") {
        config.agent.model = model;
    }

    // Load sandbox config
    if let Ok(env_str) = std::env::var("EXECUTION_ENV") {
        if let Ok(exec_env) = env_str.parse() {
            config.sandbox.execution_env = exec_env;
        }
    }
    if let Ok(allowed_dir) = std::env::var("ALLOWED_DIR") {
        config.sandbox.allowed_dir = std::path::PathBuf::from(allowed_dir);
    }

    // Load gateway config
    if let Ok(port) = std::env::var("GATEWAY_PORT") {
        if let Ok(port) = port.parse() {
            config.gateway.port = port;
        }
    }

    Ok(config)
}

/// Save configuration to a file
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = if path.extension().map_or(false, |ext| ext == "toml") {
        toml::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_json::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, content)?;
    Ok(())
}

/// Read a configuration file into a snapshot
#[allow(dead_code)]
pub fn read_config_snapshot(path: &Path) -> ConfigSnapshot {
    if !path.exists() {
        return ConfigSnapshot {
            path: path.to_path_buf(),
            exists: false,
            raw: None,
            config: None,
            issues: vec!["Configuration file does not exist".to_string()],
        };
    }

    let raw = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            return ConfigSnapshot {
                path: path.to_path_buf(),
                exists: true,
                raw: None,
                config: None,
                issues: vec![format!("Failed to read file: {}", e)],
            };
        }
    };

    let config = match load_config_from_path(path) {
        Ok(config) => Some(config),
        Err(e) => {
            return ConfigSnapshot {
                path: path.to_path_buf(),
                exists: true,
                raw: Some(raw),
                config: None,
                issues: vec![format!("Failed to parse config: {}", e)],
            };
        }
    };

    ConfigSnapshot {
        path: path.to_path_buf(),
        exists: true,
        raw: Some(raw),
        config,
        issues: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_config.json");

        let config = Config::default();
        save_config(&config, &path).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.agent.model, config.agent.model);
    }
}
