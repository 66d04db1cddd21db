//! Configuration handling for the xfer tool.
//!
//! Values come from the `services.xfer` section of the shared config file and
//! can be overridden through environment variables.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};
use xfer_session::{NegotiatorConfig, DEFAULT_PROGRESS_CAPACITY, MAX_PROGRESS_CAPACITY};

/// xfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XferConfig {
    /// Unread progress updates buffered per transfer
    pub progress_capacity: usize,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Drain mechanism settings
    pub drain: DrainConfig,
}

/// Drain mechanism configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainConfig {
    /// Bytes read per chunk
    pub chunk_size: usize,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self { chunk_size: 4096 }
    }
}

impl Default for XferConfig {
    fn default() -> Self {
        Self {
            progress_capacity: DEFAULT_PROGRESS_CAPACITY,
            log_level: "info".to_string(),
            drain: DrainConfig::default(),
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    services: Option<ServicesConfig>,
}

#[derive(Debug, Deserialize)]
struct ServicesConfig {
    xfer: Option<ServiceConfig>,
}

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    config: Option<HashMap<String, String>>,
}

impl XferConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::read_file(config_path.as_ref());
        config.apply_environment_overrides();
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_environment_overrides();
        config
    }

    fn read_file(config_path: &Path) -> Self {
        match std::fs::read_to_string(config_path) {
            Ok(content) => match Self::from_yaml(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file {:?} ({}), using defaults", config_path, e);
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", config_path);
                Self::default()
            }
        }
    }

    /// Parse the shared YAML config, without environment overrides
    pub fn from_yaml(content: &str) -> Result<Self> {
        let root = serde_yaml::from_str::<RootConfig>(content)?;
        let mut config = Self::default();
        config.apply_root_config(root);
        Ok(config)
    }

    fn apply_root_config(&mut self, root: RootConfig) {
        let values = root
            .services
            .and_then(|s| s.xfer)
            .and_then(|x| x.config)
            .unwrap_or_default();

        for (key, value) in values {
            self.apply_value(&key, &value);
        }
    }

    fn apply_value(&mut self, key: &str, value: &str) {
        match key {
            "services.xfer.progress_capacity" => match value.parse::<usize>() {
                Ok(n) if (1..=MAX_PROGRESS_CAPACITY).contains(&n) => self.progress_capacity = n,
                _ => warn!("Ignoring invalid progress_capacity {:?}", value),
            },
            "services.xfer.log_level" => self.log_level = value.to_string(),
            "services.xfer.drain.chunk_size" => match value.parse::<usize>() {
                Ok(n) if n > 0 => self.drain.chunk_size = n,
                _ => warn!("Ignoring invalid drain.chunk_size {:?}", value),
            },
            _ => {
                // Ignore unknown configuration keys
            }
        }
    }

    fn apply_environment_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("XFER_LOG_LEVEL") {
            self.apply_value("services.xfer.log_level", &level);
            info!("Log level overridden by environment: {}", self.log_level);
        }

        if let Some(capacity) = lookup("XFER_PROGRESS_CAPACITY") {
            self.apply_value("services.xfer.progress_capacity", &capacity);
        }

        if let Some(chunk) = lookup("XFER_CHUNK_SIZE") {
            self.apply_value("services.xfer.drain.chunk_size", &chunk);
        }
    }

    /// Library-side negotiator settings
    pub fn negotiator_config(&self) -> NegotiatorConfig {
        NegotiatorConfig {
            progress_capacity: self.progress_capacity,
        }
    }
}
