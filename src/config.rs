//! # Host Configuration
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration for a three-axis controller on an unspecified port.
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud = 115200
//!
//! [motion]
//! axes = ["Motor1", "Motor2", "Motor3"]
//!
//! [session]
//! discovery_timeout_ms = 5000
//! tool_refresh_interval_ms = 5000
//! idle_poll_interval_ms = 500
//! idle_timeout_ms = 0
//!
//! [calibration]
//! slow_speed = 1.0
//! overshoot = 50000
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Axis selectors are a single digit on the wire.
pub const MAX_AXES: usize = 9;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialConfig {
    #[serde(default)]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "".to_string(),
            baud: default_baud(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotionConfig {
    /// Axis names as the controller reports them, in selector order.
    #[serde(default = "default_axes")]
    pub axes: Vec<String>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self { axes: default_axes() }
    }
}

/// Timing of the session's own waits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_discovery_timeout_ms")]
    pub discovery_timeout_ms: u64,
    #[serde(default = "default_tool_refresh_interval_ms")]
    pub tool_refresh_interval_ms: u64,
    #[serde(default = "default_idle_poll_interval_ms")]
    pub idle_poll_interval_ms: u64,
    /// 0 waits for idle forever.
    #[serde(default)]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            discovery_timeout_ms: default_discovery_timeout_ms(),
            tool_refresh_interval_ms: default_tool_refresh_interval_ms(),
            idle_poll_interval_ms: default_idle_poll_interval_ms(),
            idle_timeout_ms: 0,
            event_capacity: default_event_capacity(),
        }
    }
}

impl SessionConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn tool_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.tool_refresh_interval_ms)
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }
}

/// Speeds and targets used by the calibration run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_slow_speed")]
    pub slow_speed: f64,
    #[serde(default = "default_slow_acceleration")]
    pub slow_acceleration: f64,
    #[serde(default = "default_normal_speed")]
    pub normal_speed: f64,
    #[serde(default = "default_normal_acceleration")]
    pub normal_acceleration: f64,
    /// Distance past any real axis length, driven to in both directions.
    #[serde(default = "default_overshoot")]
    pub overshoot: i64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            slow_speed: default_slow_speed(),
            slow_acceleration: default_slow_acceleration(),
            normal_speed: default_normal_speed(),
            normal_acceleration: default_normal_acceleration(),
            overshoot: default_overshoot(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let axes = &self.motion.axes;
        if axes.is_empty() {
            return Err(ConfigError::Invalid("at least one axis is required".to_string()));
        }
        if axes.len() > MAX_AXES {
            return Err(ConfigError::Invalid(format!(
                "{} axes configured, at most {} are addressable",
                axes.len(),
                MAX_AXES
            )));
        }
        let mut seen = HashSet::new();
        for name in axes {
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate axis name '{}'", name)));
            }
        }
        let s = &self.session;
        for (field, value) in [
            ("discovery_timeout_ms", s.discovery_timeout_ms),
            ("tool_refresh_interval_ms", s.tool_refresh_interval_ms),
            ("idle_poll_interval_ms", s.idle_poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("session.{} must be > 0", field)));
            }
        }
        if self.calibration.overshoot <= 0 {
            return Err(ConfigError::Invalid("calibration.overshoot must be > 0".to_string()));
        }
        Ok(())
    }
}

// Default value functions
fn default_baud() -> u32 { 115200 }
fn default_axes() -> Vec<String> { vec!["Motor1".to_string(), "Motor2".to_string(), "Motor3".to_string()] }
fn default_discovery_timeout_ms() -> u64 { 5000 }
fn default_tool_refresh_interval_ms() -> u64 { 5000 }
fn default_idle_poll_interval_ms() -> u64 { 500 }
fn default_event_capacity() -> usize { 256 }
fn default_slow_speed() -> f64 { 1.0 }
fn default_slow_acceleration() -> f64 { 0.5 }
fn default_normal_speed() -> f64 { 3.0 }
fn default_normal_acceleration() -> f64 { 1.0 }
fn default_overshoot() -> i64 { 50000 }

/// Load and validate configuration from a TOML file at the given path.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            return Err(ConfigError::Io(e));
        }
    };
    let config: Config = match toml::from_str(&contents) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to parse config TOML: {}", e);
            return Err(ConfigError::Toml(e));
        }
    };
    config.validate()?;
    Ok(config)
}
