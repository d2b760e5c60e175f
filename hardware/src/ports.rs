//! Actuator and sensor port traits.
//!
//! Each piece of the robot is reached through its own narrow interface so the
//! control core can be driven by the vendor SDK, the simulator, or recording
//! fakes in tests.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared::camera_interface::Frame;

use crate::error::HardwareResult;

/// Chassis velocity command.
///
/// `x` is forward speed and `y` lateral (right positive) in m/s; `yaw` is the
/// rotation rate in deg/s (clockwise positive).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChassisRate {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl ChassisRate {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.yaw == 0.0
    }
}

/// Gimbal angular-rate command in deg/s.
///
/// Positive `pitch` raises the barrel; positive `yaw` turns it right.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GimbalRate {
    pub pitch: f64,
    pub yaw: f64,
}

impl GimbalRate {
    pub fn new(pitch: f64, yaw: f64) -> Self {
        Self { pitch, yaw }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.pitch == 0.0 && self.yaw == 0.0
    }
}

/// How the controller reaches the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Direct connection to the robot's own access point
    #[default]
    Ap,
    /// Robot and controller joined to the same external network
    Sta,
    /// USB networking
    Rndis,
}

/// Transport-layer protocol for the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Udp,
    #[default]
    Tcp,
}

/// Settings passed to [`Connection::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub transport: Transport,
    pub protocol: Protocol,
}

/// Camera video stream.
pub trait Camera: Send {
    /// Read the newest frame, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when no frame arrived in time. Errors indicate a
    /// stream or hardware fault.
    fn read_frame(&mut self, timeout: Duration) -> HardwareResult<Option<Frame>>;

    /// Start the video stream. Calling it on a running stream is allowed.
    fn start_stream(&mut self) -> HardwareResult<()>;

    /// Stop the video stream. Calling it on a stopped stream is allowed.
    fn stop_stream(&mut self) -> HardwareResult<()>;
}

/// Mobile base. Commands are fire-and-forget velocity setpoints.
pub trait Chassis: Send {
    fn drive(&mut self, rate: ChassisRate) -> HardwareResult<()>;
}

/// Pan/tilt turret. Commands are fire-and-forget angular-rate setpoints.
pub trait Gimbal: Send {
    fn drive(&mut self, rate: GimbalRate) -> HardwareResult<()>;
}

/// Projectile actuator.
pub trait Blaster: Send {
    /// Fire one projectile
    fn fire(&mut self) -> HardwareResult<()>;
}

/// Robot session lifecycle.
pub trait Connection: Send {
    fn open(&mut self, settings: &ConnectionSettings) -> HardwareResult<()>;
    fn close(&mut self) -> HardwareResult<()>;
}

/// All ports of one robot, as handed to a control session.
pub struct RobotPorts {
    pub connection: Box<dyn Connection>,
    pub camera: Box<dyn Camera>,
    pub chassis: Box<dyn Chassis>,
    pub gimbal: Box<dyn Gimbal>,
    pub blaster: Box<dyn Blaster>,
}
