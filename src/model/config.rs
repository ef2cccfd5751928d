use crate::datasource::{ConfiguredDataSources, DataSourceConfig};
use crate::dialects::ConnectionSpec;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub dialects: DialectsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    /// Connection used when the command line names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionSpec>,

    #[serde(default)]
    pub datasources: BTreeMap<String, DataSourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialectsConfig {
    /// Extra dialect descriptor files registered after the built-ins
    #[serde(default)]
    pub plugin_paths: Vec<String>,

    #[serde(default = "default_vendor")]
    pub default_vendor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_colored")]
    pub colored: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Seconds before a connection test gives up; 0 waits forever
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

// Default values
fn default_vendor() -> String {
    "generic".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_colored() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for DialectsConfig {
    fn default() -> Self {
        Self {
            plugin_paths: Vec::new(),
            default_vendor: default_vendor(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            colored: default_colored(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Override file layered over the base config; only keys present in the file are set
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigOverride {
    #[serde(default)]
    pub dialects: DialectsOverride,

    #[serde(default)]
    pub logging: LoggingOverride,

    #[serde(default)]
    pub probe: ProbeOverride,

    #[serde(default)]
    pub connection: Option<ConnectionSpec>,

    #[serde(default)]
    pub datasources: BTreeMap<String, DataSourceConfig>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DialectsOverride {
    pub plugin_paths: Option<Vec<String>>,
    pub default_vendor: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingOverride {
    pub level: Option<String>,
    pub colored: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProbeOverride {
    pub timeout_secs: Option<u64>,
}

impl ProbeConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Config {
    /// Load configuration from file with environment override support
    pub fn load(config_path: Option<&str>, environment: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Load base configuration file
        if let Some(path) = config_path {
            config = Self::load_from_file(path)?;
        } else {
            // Try loading from standard locations
            for standard_path in Self::standard_config_paths() {
                if standard_path.exists() {
                    debug!("Loading config from: {}", standard_path.display());
                    config = Self::load_from_file(&standard_path)?;
                    break;
                }
            }
        }

        // Load environment-specific overrides
        if let Some(env) = environment {
            if let Some(env_config) = Self::load_override(format!("config/{}.toml", env))? {
                debug!("Applying environment config for: {}", env);
                config = config.merge(env_config);
            }
        }

        // Load local overrides (always last)
        if let Some(local_config) = Self::load_override("config/local.toml")? {
            debug!("Applying local config overrides");
            config = config.merge(local_config);
        }

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.display().to_string(), e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(path.display().to_string(), e.to_string()))
    }

    /// Load an override layer; a missing file is skipped, anything else is an error
    fn load_override(path: impl AsRef<Path>) -> Result<Option<ConfigOverride>, ConfigError> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ConfigError::FileRead(path.display().to_string(), e.to_string())),
        };

        toml::from_str(&content)
            .map(Some)
            .map_err(|e| ConfigError::Parse(path.display().to_string(), e.to_string()))
    }

    /// Get standard configuration file paths in order of precedence
    fn standard_config_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from("config.toml"),
            PathBuf::from("config/default.toml"),
        ]
    }

    /// Merge an override layer into this config; keys absent from the layer keep their value
    pub fn merge(mut self, other: ConfigOverride) -> Self {
        for path in other.dialects.plugin_paths.unwrap_or_default() {
            if !self.dialects.plugin_paths.contains(&path) {
                self.dialects.plugin_paths.push(path);
            }
        }
        if let Some(vendor) = other.dialects.default_vendor {
            self.dialects.default_vendor = vendor;
        }

        if let Some(level) = other.logging.level {
            self.logging.level = level;
        }
        if let Some(colored) = other.logging.colored {
            self.logging.colored = colored;
        }

        if let Some(timeout_secs) = other.probe.timeout_secs {
            self.probe.timeout_secs = timeout_secs;
        }

        if other.connection.is_some() {
            self.connection = other.connection;
        }

        // Data sources merge per name
        self.datasources.extend(other.datasources);

        self
    }

    /// Named data sources declared under `[datasources]`
    pub fn data_sources(&self) -> ConfiguredDataSources {
        ConfiguredDataSources::new(self.datasources.clone())
    }

    /// Generate a default configuration file
    pub fn generate_default_config(path: &str) -> Result<(), ConfigError> {
        let config = Config::default();
        let toml_content =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, toml_content)
            .map_err(|e| ConfigError::FileWrite(path.to_string(), e.to_string()))?;

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}': {1}")]
    FileRead(String, String),

    #[error("Failed to parse config file '{0}': {1}")]
    Parse(String, String),

    #[error("Failed to write config file '{0}': {1}")]
    FileWrite(String, String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),
}
