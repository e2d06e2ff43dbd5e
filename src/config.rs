use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::{AcquisitionConfig, Channel};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScopeConfig {
    pub scope: InstrumentConfig,
    pub acquisition: AcquisitionSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InstrumentConfig {
    pub host: String,
    pub port: u16,
    pub read_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AcquisitionSettings {
    pub channel: Channel,
    pub num_points: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            scope: InstrumentConfig::default(),
            acquisition: AcquisitionSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            read_timeout_ms: 2000,
        }
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            channel: Channel::Ch1,
            num_points: AcquisitionConfig::DEFAULT_NUM_POINTS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Load configuration from file with layered fallbacks
pub fn load_config(config_path: Option<&Path>) -> Result<ScopeConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&ScopeConfig::default())?);

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(File::from(path));
        } else {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    } else {
        // Try common config file locations
        let possible_paths = ["scope.toml", "tekscope.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
                break;
            }
        }
    }

    // Add environment variable overrides with prefix "TEKSCOPE_"
    builder = builder.add_source(
        Environment::with_prefix("TEKSCOPE")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize::<ScopeConfig>()
}

/// Load configuration with better error handling and defaults
pub fn load_config_or_default(config_path: Option<&Path>) -> ScopeConfig {
    match load_config(config_path) {
        Ok(config) => {
            log::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            log::warn!("Failed to load config ({}), using defaults", e);
            ScopeConfig::default()
        }
    }
}
