//! System configuration
//!
//! Queue sizes and input timing, loadable from TOML. Every field has a
//! default so an empty document is a valid configuration.

use serde::Deserialize;
use thiserror::Error;

/// Default per-task queue capacity
pub const MAX_QUEUE_SIZE: usize = 256;

/// Default hardware queue capacity
pub const HARDWARE_QUEUE_SIZE: usize = 120;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),
    #[error("double-click rectangle must be at least 1x1, got {0}x{1}")]
    DoubleClickRect(i32, i32),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemConfig {
    /// Capacity of each task's posted-message queue
    pub queue_size: usize,
    /// Capacity of the shared hardware input queue
    pub hardware_queue_size: usize,
    /// Double-click interval in milliseconds
    pub double_click_time: u32,
    /// Width of the double-click tolerance rectangle
    pub double_click_width: i32,
    /// Height of the double-click tolerance rectangle
    pub double_click_height: i32,
    /// Tick only advances through `System::advance_clock`
    pub manual_clock: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            queue_size: MAX_QUEUE_SIZE,
            hardware_queue_size: HARDWARE_QUEUE_SIZE,
            double_click_time: 500,
            double_click_width: 4,
            double_click_height: 4,
            manual_clock: false,
        }
    }
}

impl SystemConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: SystemConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_size == 0 {
            return Err(ConfigError::ZeroCapacity("queue_size"));
        }
        if self.hardware_queue_size == 0 {
            return Err(ConfigError::ZeroCapacity("hardware_queue_size"));
        }
        if self.double_click_width < 1 || self.double_click_height < 1 {
            return Err(ConfigError::DoubleClickRect(
                self.double_click_width,
                self.double_click_height,
            ));
        }
        Ok(())
    }

    /// Deterministic clock, for tests and replay
    pub fn manual() -> Self {
        SystemConfig { manual_clock: true, ..Default::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = SystemConfig::from_toml("").unwrap();
        assert_eq!(config, SystemConfig::default());
        assert_eq!(config.queue_size, MAX_QUEUE_SIZE);
    }

    #[test]
    fn partial_document_overrides() {
        let config = SystemConfig::from_toml(
            "queue_size = 8\ndouble_click_time = 250\nmanual_clock = true\n",
        )
        .unwrap();
        assert_eq!(config.queue_size, 8);
        assert_eq!(config.double_click_time, 250);
        assert!(config.manual_clock);
        assert_eq!(config.hardware_queue_size, HARDWARE_QUEUE_SIZE);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            SystemConfig::from_toml("queue_size = 0"),
            Err(ConfigError::ZeroCapacity("queue_size"))
        ));
        assert!(matches!(
            SystemConfig::from_toml("double_click_width = 0"),
            Err(ConfigError::DoubleClickRect(0, 4))
        ));
        assert!(matches!(
            SystemConfig::from_toml("queue_size = \"big\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            SystemConfig::from_toml("no_such_key = 1"),
            Err(ConfigError::Parse(_))
        ));
    }
}
