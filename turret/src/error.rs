//! Session-level errors and the fault taxonomy used in log records.

use std::fmt;

use hardware::HardwareError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::input::InputError;

/// Category tag attached to every fault log line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Frame read failure or stream loss
    Sensor,
    /// Detector failure or malformed detector output
    Detection,
    /// A chassis, gimbal or blaster command failed
    Actuator,
    /// Robot connection or stream start failed
    Initialization,
    /// Unexpected failure inside the control loop
    Loop,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::Sensor => "sensor",
            FaultKind::Detection => "detection",
            FaultKind::Actuator => "actuator",
            FaultKind::Initialization => "initialization",
            FaultKind::Loop => "loop",
        };
        f.write_str(name)
    }
}

/// Failures that end the control loop early
#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Key state unavailable: {0}")]
    Input(#[from] InputError),

    #[error("Frame acquisition thread exited unexpectedly")]
    AcquisitionStopped,
}

/// Failures that end a session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid session config: {0}")]
    Config(#[from] ConfigError),

    #[error("Robot initialization failed: {0}")]
    Initialization(#[source] HardwareError),

    #[error("Failed to spawn frame acquisition thread: {0}")]
    AcquisitionSpawn(#[source] std::io::Error),

    #[error("Control loop aborted: {0}")]
    Loop(#[from] LoopError),
}

impl SessionError {
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            SessionError::Config(_)
            | SessionError::Initialization(_)
            | SessionError::AcquisitionSpawn(_) => FaultKind::Initialization,
            SessionError::Loop(_) => FaultKind::Loop,
        }
    }
}
