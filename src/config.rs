//! gpumemfs daemon configuration

use serde::{Deserialize, Serialize};

/// Default configuration constants
///
/// This module centralizes all default values used throughout gpumemfs.
/// By collecting these constants in one place, we ensure consistency
/// and make it easier to adjust defaults for different deployments.
pub mod defaults {

    /// Default CUDA device ordinal
    ///
    /// The daemon manages a single device; multi-GPU is out of scope.
    pub const DEVICE_ORDINAL: u32 = 0;

    /// Allow other users to access the mount point
    pub const ALLOW_OTHER: bool = false;

    /// Unmount automatically when the daemon exits
    pub const AUTO_UNMOUNT: bool = true;

    /// Default log level
    pub const fn default_log_level() -> &'static str {
        "info"
    }
}

/// gpumemfs daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Daemon-wide settings
    pub daemon: DaemonSection,

    /// GPU device settings
    pub gpu: GpuSection,

    /// Mount settings
    pub mount: MountSection,
}

/// Daemon-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSection {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    defaults::default_log_level().to_string()
}

/// GPU device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuSection {
    /// CUDA device ordinal to allocate on
    #[serde(default)]
    pub device: u32,
}

/// Mount settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountSection {
    /// Allow processes of other users to use the mount point
    ///
    /// Cross-process sharing between different users needs this; FUSE
    /// restricts mounts to the owner by default.
    #[serde(default = "default_allow_other")]
    pub allow_other: bool,

    /// Unmount automatically if the daemon dies
    #[serde(default = "default_auto_unmount")]
    pub auto_unmount: bool,
}

fn default_allow_other() -> bool {
    defaults::ALLOW_OTHER
}

fn default_auto_unmount() -> bool {
    defaults::AUTO_UNMOUNT
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonSection {
                log_level: default_log_level(),
            },
            gpu: GpuSection {
                device: defaults::DEVICE_ORDINAL,
            },
            mount: MountSection {
                allow_other: default_allow_other(),
                auto_unmount: default_auto_unmount(),
            },
        }
    }
}

impl DaemonConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("Failed to read config file: {}", e)))?;

        let config: DaemonConfig = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.daemon.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}",
                    self.daemon.log_level
                )));
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
