//! Process-wide and per-device configuration
//!
//! [`PvConfig`] holds settings shared by every handle a factory creates
//! (default timeouts, channel checking). [`DeviceConfig`] holds the
//! per-instance name prefix and behavioural flags.
//!
//! Both load from TOML; durations use humantime syntax (`"5s"`, `"250ms"`).
//!
//! ```
//! use pvlink::config::{DeviceConfig, PvConfig};
//! use std::time::Duration;
//!
//! let config = PvConfig::from_toml_str(r#"
//!     default_timeout = "30s"
//!     check_channels = true
//! "#)?;
//! assert_eq!(config.default_timeout, Duration::from_secs(30));
//!
//! let device = DeviceConfig::from_toml_str(r#"
//!     base_name = "BL13I-EA-DET-01:CAM:"
//!     protocol = "start_stop"
//! "#)?;
//! assert_eq!(device.base_name.as_deref(), Some("BL13I-EA-DET-01:CAM:"));
//! # Ok::<(), pvlink::PvError>(())
//! ```

use crate::error::{PvError, Result};
use crate::pv::readback::Convergence;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings shared by every handle created from one factory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvConfig {
    /// Timeout for `put_wait` and converging puts when none is given per call
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,
    /// Re-check interval while waiting for an action to leave BUSY
    #[serde(with = "humantime_serde")]
    pub status_poll_interval: Duration,
    /// Resolve every channel when its handle is created and log failures
    pub check_channels: bool,
}

impl Default for PvConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(5),
            status_poll_interval: Duration::from_secs(1),
            check_channels: false,
        }
    }
}

impl PvConfig {
    /// Parse from a TOML document; missing keys take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PvError::Configuration(format!("invalid pv config: {}", e)))
    }

    /// Override the default timeout
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Override the status poll interval
    pub fn with_status_poll_interval(mut self, interval: Duration) -> Self {
        self.status_poll_interval = interval;
        self
    }
}

/// How an acquisition is driven on the remote end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionProtocol {
    /// Write 1 and let the put completion mark the end of the action
    #[default]
    Trigger,
    /// Write 1 to start; the action ends when 0 is written and read back
    StartStop,
}

/// Per-device naming and behaviour flags
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Prefix prepended to every attribute suffix; required
    pub base_name: Option<String>,
    /// Convergence policy for demand/readback pairs built from this device
    pub convergence: ConvergenceSetting,
    /// Protocol for the acquisition action
    pub protocol: ActionProtocol,
    /// Reject unknown color-mode codes instead of falling back
    pub strict_color_mode: bool,
}

impl DeviceConfig {
    /// Config with only a base name set
    pub fn with_base_name(base_name: impl Into<String>) -> Self {
        Self {
            base_name: Some(base_name.into()),
            ..Default::default()
        }
    }

    /// Parse from a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| PvError::Configuration(format!("invalid device config: {}", e)))
    }

    /// The base name, or a configuration error when it was never supplied
    pub fn require_base_name(&self) -> Result<&str> {
        match self.base_name.as_deref() {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(PvError::Configuration(
                "device base_name must be set before use".to_string(),
            )),
        }
    }
}

/// Serializable form of [`Convergence`]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum ConvergenceSetting {
    /// Do not wait for the readback
    #[default]
    None,
    /// Wait using the default timeout
    WaitUntilEqual,
    /// Wait using the given timeout
    WaitUntilEqualWithin {
        /// How long the readback may take to match
        #[serde(with = "humantime_serde")]
        timeout: Duration,
    },
}

impl From<ConvergenceSetting> for Convergence {
    fn from(setting: ConvergenceSetting) -> Self {
        match setting {
            ConvergenceSetting::None => Convergence::None,
            ConvergenceSetting::WaitUntilEqual => Convergence::WaitUntilEqual,
            ConvergenceSetting::WaitUntilEqualWithin { timeout } => {
                Convergence::WaitUntilEqualWithin(timeout)
            }
        }
    }
}
