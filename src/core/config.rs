//! Configuration module
//!
//! Supports loading configuration from a TOML file.
//! Configuration is stored in a standard location:
//! - Windows: %APPDATA%\iphone_media_transfer\config.toml
//! - macOS: ~/Library/Application Support/iphone_media_transfer/config.toml
//! - Linux: ~/.config/iphone_media_transfer/config.toml

use crate::core::transfer::ConflictPolicy;
use crate::device::discovery::RetryPolicy;
use crate::device::verify::DEFAULT_SCAN_LIMIT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config directory
const APP_NAME: &str = "iphone_media_transfer";

/// Default config file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Folder created next to the executable when no destination is configured
pub const DEFAULT_DESTINATION_NAME: &str = "transferred_photos";

/// Bounds for the external command timeout, in seconds
const COMMAND_TIMEOUT_RANGE: (u64, u64) = (5, 15);

/// Get the standard configuration directory for the application.
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME))
}

/// Get the standard configuration file path.
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Ensure the configuration directory exists.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let config_dir = get_config_dir().ok_or(ConfigError::ConfigDirNotFound)?;

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)
            .map_err(|e| ConfigError::WriteError(config_dir.clone(), e.to_string()))?;
    }

    Ok(config_dir)
}

/// Write the default config to the standard location if none exists.
///
/// With `reset`, an existing file is replaced. Returns the path.
pub fn init_config(reset: bool) -> Result<PathBuf, ConfigError> {
    let config_path = ensure_config_dir()?.join(CONFIG_FILE_NAME);

    if reset || !config_path.exists() {
        fs::write(&config_path, Config::generate_default_config())
            .map_err(|e| ConfigError::WriteError(config_path.clone(), e.to_string()))?;
    }

    Ok(config_path)
}

/// `<exe dir>/transferred_photos`, or `./transferred_photos` if the
/// executable location is unknown
pub fn default_destination() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DESTINATION_NAME)
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output settings
    pub output: OutputConfig,

    /// Discovery settings
    pub discovery: DiscoveryConfig,

    /// HEIC conversion settings
    pub conversion: ConversionConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

/// Output directory configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Destination folder (empty = next to the executable)
    pub directory: PathBuf,

    /// What to do when a copied file already exists
    pub on_conflict: ConflictPolicy,

    /// Open the destination in the file manager after a transfer
    pub open_when_done: bool,
}

/// Discovery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Full passes over the strategy table
    pub attempts: u32,

    /// Pause between passes, in milliseconds
    pub retry_delay_ms: u64,

    /// Hard limit for each external OS utility, in seconds (5-15)
    pub command_timeout_secs: u64,

    /// Roots probed before the built-in locations
    pub extra_search_paths: Vec<PathBuf>,

    /// Give up early when the USB bus shows no Apple device
    pub require_usb_signal: bool,

    /// Entries inspected per subfolder when verifying a candidate
    pub verify_scan_limit: usize,
}

/// Conversion configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Convert HEIC files to JPEG after copying
    pub enabled: bool,

    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log to file
    pub log_to_file: bool,

    /// Log file path
    pub log_file: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            on_conflict: ConflictPolicy::Overwrite,
            open_when_done: false,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay_ms: 2000,
            command_timeout_secs: 10,
            extra_search_paths: Vec::new(),
            require_usb_signal: false,
            verify_scan_limit: DEFAULT_SCAN_LIMIT,
        }
    }
}

impl DiscoveryConfig {
    /// Retry policy for the orchestrator; at least one attempt
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts.max(1),
            delay: Duration::from_millis(self.retry_delay_ms),
            require_bus_signal: self.require_usb_signal,
        }
    }

    /// External command timeout, clamped to 5-15 seconds
    pub fn command_timeout(&self) -> Duration {
        let (min, max) = COMMAND_TIMEOUT_RANGE;
        Duration::from_secs(self.command_timeout_secs.clamp(min, max))
    }
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jpeg_quality: crate::core::convert::DEFAULT_JPEG_QUALITY,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_file: PathBuf::from("./iphone_transfer.log"),
        }
    }
}

impl Config {
    /// Destination folder, falling back to the default next to the executable
    pub fn destination(&self) -> PathBuf {
        if self.output.directory.as_os_str().is_empty() {
            default_destination()
        } else {
            self.output.directory.clone()
        }
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;

        Ok(config)
    }

    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./config.toml
    /// 2. ./iphone_transfer.toml
    /// 3. The per-user config directory
    ///
    /// If no config file is found, returns default configuration.
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// First config file that exists in the search order
    pub fn find_config_file() -> Option<PathBuf> {
        let local_paths = [
            PathBuf::from("./config.toml"),
            PathBuf::from("./iphone_transfer.toml"),
        ];

        local_paths
            .into_iter()
            .chain(get_config_path())
            .find(|path| path.exists())
    }

    /// Get the path where the config file is (or would be) located.
    pub fn get_active_config_path() -> PathBuf {
        Self::find_config_file()
            .or_else(get_config_path)
            .unwrap_or_else(|| PathBuf::from("./config.toml"))
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self.to_toml()?;

        fs::write(path.as_ref(), content)
            .map_err(|e| ConfigError::WriteError(path.as_ref().to_path_buf(), e.to_string()))?;

        Ok(())
    }

    /// Serialize to TOML text
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))
    }

    /// Generate a default config file with comments
    pub fn generate_default_config() -> String {
        include_str!("../../config.example.toml").to_string()
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// Configuration file was not found at the specified path
    FileNotFound(PathBuf),
    /// Failed to read the configuration file
    ReadError(PathBuf, String),
    /// Failed to parse the configuration file (invalid TOML)
    ParseError(PathBuf, String),
    /// Failed to serialize configuration to TOML
    SerializeError(String),
    /// Failed to write configuration file
    WriteError(PathBuf, String),
    /// Could not determine config directory
    ConfigDirNotFound,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => {
                write!(f, "Configuration file not found: {}", path.display())
            }
            ConfigError::ReadError(path, err) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), err)
            }
            ConfigError::ParseError(path, err) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), err)
            }
            ConfigError::SerializeError(err) => {
                write!(f, "Failed to serialize configuration: {}", err)
            }
            ConfigError::WriteError(path, err) => {
                write!(f, "Failed to write config file '{}': {}", path.display(), err)
            }
            ConfigError::ConfigDirNotFound => {
                write!(f, "Could not determine configuration directory")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
