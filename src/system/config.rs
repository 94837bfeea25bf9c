//! Startup configuration. Immutable once the system is built.
//!
//! Loaded from TOML; every key is optional and falls back to the defaults
//! below.
//!
//! ```toml
//! pose_publish_interval_ms = 100
//! frame_timeout_ms = 500
//! max_consecutive_failures = 10
//! reset_ack_timeout_ms = 1000
//! keyframe_queue_capacity = 5
//! keyframe_queue_high_water = 3
//! mapper_idle_wait_ms = 10
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config syntax: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Minimum interval between two pose publications.
    pub pose_publish_interval_ms: u64,

    /// Upper bound on one frame acquisition. Also bounds shutdown latency.
    pub frame_timeout_ms: u64,

    /// Consecutive acquisition failures that stop the run loop (0 = never).
    pub max_consecutive_failures: u32,

    /// How long a reset waits for the map maker to acknowledge its pause.
    pub reset_ack_timeout_ms: u64,

    /// Capacity of the keyframe channel between tracking and mapping.
    pub keyframe_queue_capacity: usize,

    /// Queue length above which the tracker is asked to stop creating keyframes.
    pub keyframe_queue_high_water: usize,

    /// How long the idle map maker waits for a keyframe before refining.
    pub mapper_idle_wait_ms: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            pose_publish_interval_ms: 100,
            frame_timeout_ms: 500,
            max_consecutive_failures: 10,
            reset_ack_timeout_ms: 1000,
            keyframe_queue_capacity: 5,
            keyframe_queue_high_water: 3,
            mapper_idle_wait_ms: 10,
        }
    }
}

impl SystemConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SystemConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_timeout_ms == 0 {
            return Err(ConfigError::Invalid("frame_timeout_ms must be > 0".into()));
        }
        if self.reset_ack_timeout_ms == 0 {
            return Err(ConfigError::Invalid("reset_ack_timeout_ms must be > 0".into()));
        }
        if self.keyframe_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "keyframe_queue_capacity must be > 0".into(),
            ));
        }
        if self.keyframe_queue_high_water >= self.keyframe_queue_capacity {
            return Err(ConfigError::Invalid(format!(
                "keyframe_queue_high_water ({}) must be below keyframe_queue_capacity ({})",
                self.keyframe_queue_high_water, self.keyframe_queue_capacity
            )));
        }
        Ok(())
    }

    pub fn pose_publish_interval(&self) -> Duration {
        Duration::from_millis(self.pose_publish_interval_ms)
    }

    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    pub fn reset_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_ack_timeout_ms)
    }

    pub fn mapper_idle_wait(&self) -> Duration {
        Duration::from_millis(self.mapper_idle_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SystemConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pose_publish_interval(), Duration::from_millis(100));
        assert_eq!(config.max_consecutive_failures, 10);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SystemConfig::from_toml_str(
            "pose_publish_interval_ms = 250\nmax_consecutive_failures = 3\n",
        )
        .unwrap();
        assert_eq!(config.pose_publish_interval_ms, 250);
        assert_eq!(config.max_consecutive_failures, 3);
        assert_eq!(config.frame_timeout_ms, 500);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            SystemConfig::from_toml_str("frame_timeout_ms = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SystemConfig::from_toml_str("keyframe_queue_capacity = 2\nkeyframe_queue_high_water = 2"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SystemConfig::from_toml_str("frame_timeout_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SystemConfig::load(Path::new("/nonexistent/mctrack.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
