//! Controller configuration.
//!
//! Every option has a default; a JSON file may override any subset of them,
//! and the binary applies command-line overrides on top. Durations are
//! written as seconds in the file format.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hardware::ConnectionSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection_adapter::DetectionMode;

/// Errors loading or validating a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Serialize a [`Duration`] as fractional seconds
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Detector selection
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub mode: DetectionMode,
    /// Overrides the mode's built-in confidence threshold
    pub confidence_threshold: Option<f64>,
}

impl DetectionConfig {
    pub fn effective_threshold(&self) -> f64 {
        self.confidence_threshold
            .unwrap_or_else(|| self.mode.default_confidence_threshold())
    }
}

/// Aim, lock and fire parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementConfig {
    /// Aim error below which the turret is on target, as a fraction of the frame
    pub dead_zone: f64,
    /// Gimbal rate per unit of aim error, deg/s
    pub gain: f64,
    /// Time the aim must stay inside the dead zone before firing
    #[serde(with = "secs")]
    pub lock_duration: Duration,
    /// Minimum time between shots
    #[serde(with = "secs")]
    pub fire_cooldown: Duration,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            dead_zone: 0.05,
            gain: 20.0,
            lock_duration: Duration::from_millis(500),
            fire_cooldown: Duration::from_millis(100),
        }
    }
}

/// Manual drive parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Initial chassis speed, m/s
    pub base_speed: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    /// Step applied by each speed-up/speed-down key poll
    pub speed_increment: f64,
    /// Chassis rotation rate, deg/s
    pub rotation_speed: f64,
    /// Manual gimbal rate, deg/s
    pub gimbal_speed: f64,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            base_speed: 0.5,
            min_speed: 0.1,
            max_speed: 2.0,
            speed_increment: 0.1,
            rotation_speed: 45.0,
            gimbal_speed: 45.0,
        }
    }
}

/// Blocking-call bounds for the two loops
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopTiming {
    /// Longest the control loop waits for a fresh frame
    #[serde(with = "secs")]
    pub frame_timeout: Duration,
    /// Longest a single camera read may block
    #[serde(with = "secs")]
    pub camera_read_timeout: Duration,
    /// Pause after a failed stream restart
    #[serde(with = "secs")]
    pub reconnect_backoff: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            frame_timeout: Duration::from_millis(100),
            camera_read_timeout: Duration::from_millis(100),
            reconnect_backoff: Duration::from_secs(2),
        }
    }
}

/// Tracking-quality accounting parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Offset distance above which a frame counts as a target loss
    pub loss_threshold: f64,
    /// Multipliers applied to (x, y) offsets before comparing with the threshold
    pub offset_scale: (f64, f64),
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            loss_threshold: 50.0,
            // 720p frame, so the threshold reads as pixels
            offset_scale: (1280.0, 720.0),
        }
    }
}

/// Complete controller configuration
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TurretConfig {
    pub connection: ConnectionSettings,
    pub detection: DetectionConfig,
    pub engagement: EngagementConfig,
    pub drive: DriveConfig,
    pub timing: LoopTiming,
    pub metrics: MetricsConfig,
}

impl TurretConfig {
    /// Load and validate a JSON configuration file.
    ///
    /// Options missing from the file keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every option is inside its meaningful range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        let threshold = self.detection.effective_threshold();
        if !(0.0..=1.0).contains(&threshold) {
            return Err(invalid(
                "detection.confidence_threshold",
                format!("{threshold} is outside [0, 1]"),
            ));
        }

        let engagement = &self.engagement;
        if !(engagement.dead_zone > 0.0 && engagement.dead_zone <= 0.5) {
            return Err(invalid(
                "engagement.dead_zone",
                format!("{} is outside (0, 0.5]", engagement.dead_zone),
            ));
        }
        if !engagement.gain.is_finite() || engagement.gain < 0.0 {
            return Err(invalid("engagement.gain", "must be a non-negative number"));
        }

        let drive = &self.drive;
        if !(drive.min_speed > 0.0 && drive.min_speed <= drive.max_speed) {
            return Err(invalid(
                "drive.min_speed",
                format!(
                    "need 0 < min_speed <= max_speed, got {} and {}",
                    drive.min_speed, drive.max_speed
                ),
            ));
        }
        if !(drive.min_speed..=drive.max_speed).contains(&drive.base_speed) {
            return Err(invalid(
                "drive.base_speed",
                format!(
                    "{} is outside [{}, {}]",
                    drive.base_speed, drive.min_speed, drive.max_speed
                ),
            ));
        }
        if drive.speed_increment <= 0.0 {
            return Err(invalid("drive.speed_increment", "must be positive"));
        }
        if drive.rotation_speed < 0.0 || drive.gimbal_speed < 0.0 {
            return Err(invalid(
                "drive.rotation_speed",
                "rotation and gimbal speeds must be non-negative",
            ));
        }

        if self.timing.frame_timeout.is_zero() || self.timing.camera_read_timeout.is_zero() {
            return Err(invalid(
                "timing.frame_timeout",
                "frame and camera read timeouts must be non-zero",
            ));
        }

        let (sx, sy) = self.metrics.offset_scale;
        if sx <= 0.0 || sy <= 0.0 {
            return Err(invalid("metrics.offset_scale", "scales must be positive"));
        }
        if self.metrics.loss_threshold < 0.0 {
            return Err(invalid("metrics.loss_threshold", "must be non-negative"));
        }

        Ok(())
    }
}
