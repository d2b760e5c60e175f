//! Errors reported by robot ports.

use thiserror::Error;

/// Errors that can occur while talking to the robot.
///
/// These cover the session lifecycle, the video stream and individual
/// actuator commands. Callers decide whether a given failure is transient.
#[derive(Error, Debug)]
pub enum HardwareError {
    /// Low-level I/O error (socket or device read/write failure).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The robot session could not be established.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A command was issued while no session is open.
    #[error("Not connected")]
    NotConnected,

    /// The video stream failed or is not running.
    #[error("Video stream error: {0}")]
    Stream(String),

    /// The robot refused a command.
    #[error("Command rejected: {0}")]
    CommandRejected(String),

    /// No response within the timeout period.
    #[error("Timeout waiting for device")]
    Timeout,
}

/// Result type for port operations.
pub type HardwareResult<T> = Result<T, HardwareError>;
