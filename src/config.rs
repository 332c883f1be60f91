//! Configuration loading and persistence.
//!
//! Handles reading and writing the boatlink configuration file. The file
//! lives in the platform config directory and holds only the boat address;
//! environment variables override it per invocation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::{fs, path::PathBuf};

/// Default control-channel port used by the boat firmware.
pub const DEFAULT_PORT: u16 = 5050;

/// Configuration for the boatlink CLI.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Hostname or IP address of the boat.
    pub host: String,
    /// TCP port of the control channel.
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "192.168.4.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `BOATLINK_CONFIG_DIR` env var: explicit override (tests, CI)
    /// 2. Default: platform config dir (macOS: ~/Library/Application Support/boatlink)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("BOATLINK_CONFIG_DIR") {
            PathBuf::from(dir)
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("boatlink")
        };
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    /// Falls back to defaults when no config file exists.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file().unwrap_or_else(|_| Self::default());
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            anyhow::bail!("Config file not found")
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("BOATLINK_HOST") {
            self.host = host;
        }

        if let Ok(port) = std::env::var("BOATLINK_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.port = port;
            }
        }
    }

    /// Persists the current configuration to disk.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;

        // Set restrictive permissions (owner read/write only)
        #[cfg(unix)]
        fs::set_permissions(&config_path, fs::Permissions::from_mode(0o600))?;

        Ok(())
    }
}
