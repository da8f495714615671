//! Station configuration file parsing
//!
//! A test station describes its wiring in TOML:
//!
//! ```toml
//! panel = ["/dev/ttyUSB2", "/dev/ttyUSB3", "/dev/ttyUSB4", "/dev/ttyUSB5"]
//!
//! [isp]
//! port = "/dev/ttyUSB0"
//! baud = 115200
//! crystal_khz = 12000
//!
//! [console]
//! port = "/dev/ttyUSB1"
//! timeout_ms = 2000
//! ```
//!
//! Every key is optional; command-line flags override what the file says.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// One serial link
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Device path
    pub port: Option<String>,
    /// Baud rate
    pub baud: u32,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115200,
            timeout_ms: 2000,
        }
    }
}

impl PortConfig {
    /// Read timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// ISP bootloader link
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IspConfig {
    /// Device path
    pub port: Option<String>,
    /// Baud rate
    pub baud: u32,
    /// Crystal frequency reported to the bootloader, in kHz
    pub crystal_khz: u32,
    /// Read timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for IspConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115200,
            crystal_khz: 12000,
            timeout_ms: 2000,
        }
    }
}

impl IspConfig {
    /// Read timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Whole-station configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Programming link
    pub isp: IspConfig,
    /// Firmware console link
    pub console: PortConfig,
    /// SMBus bridge link
    pub gauge: PortConfig,
    /// Bluetooth radio module link
    pub ble: PortConfig,
    /// Ports of a 4-up programming panel, in panel position order
    pub panel: Vec<String>,
}

impl StationConfig {
    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        log::debug!("Loaded station config from {}", path.display());
        Ok(config)
    }
}
