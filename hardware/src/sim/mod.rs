//! Simulated robot.
//!
//! A complete set of ports backed by one [`SimWorld`]: the camera renders the
//! target according to the turret's aim, gimbal and chassis commands move the
//! aim, and the blaster scores hits. Together with [`BlobDetector`] this lets
//! the control core run end to end without the vendor SDK or a neural model.

pub mod camera;
pub mod detector;
pub mod world;

pub use camera::SimCamera;
pub use detector::BlobDetector;
pub use world::{RelativeBearing, SimWorld};

use std::time::Instant;

use serde::{Deserialize, Serialize};
use shared::camera_interface::Frame;
use shared::detection::{BoundingBox, GroundTruth};
use shared::image_size::ImageSize;
use tracing::{debug, info};

use crate::error::{HardwareError, HardwareResult};
use crate::ports::{
    Blaster, Chassis, ChassisRate, Connection, ConnectionSettings, Gimbal, GimbalRate, RobotPorts,
};

/// Simulation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Rendered frame size
    pub frame_size: ImageSize,
    /// Camera frame rate in Hz
    pub frame_rate_hz: f64,
    pub horizontal_fov_deg: f64,
    pub vertical_fov_deg: f64,
    /// Probability that a frame read fails with a stream error
    pub fault_rate: f64,
    /// Seed for target jitter and injected faults
    pub seed: u64,
    /// Center of the target's sweep, relative to the initial heading
    pub target_bearing_deg: f64,
    /// Half-width of the target's sinusoidal sweep
    pub target_amplitude_deg: f64,
    pub target_period_secs: f64,
    /// Uniform per-frame jitter added to the target position
    pub target_jitter_deg: f64,
    /// Length of each window in which the target is visible
    pub target_visible_secs: f64,
    /// Length of each window in which the target is hidden (0 = always visible)
    pub target_hidden_secs: f64,
    pub target_radius_px: f64,
    /// Maximum aim error for a shot to count as a hit
    pub hit_tolerance_deg: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            frame_size: ImageSize::from_width_height(320, 240),
            frame_rate_hz: 30.0,
            horizontal_fov_deg: 96.0,
            vertical_fov_deg: 54.0,
            fault_rate: 0.0,
            seed: 12345,
            target_bearing_deg: 15.0,
            target_amplitude_deg: 8.0,
            target_period_secs: 20.0,
            target_jitter_deg: 0.05,
            target_visible_secs: 8.0,
            target_hidden_secs: 3.0,
            target_radius_px: 6.0,
            hit_tolerance_deg: 1.5,
        }
    }
}

pub struct SimConnection {
    world: SimWorld,
}

impl Connection for SimConnection {
    fn open(&mut self, settings: &ConnectionSettings) -> HardwareResult<()> {
        info!(
            "Simulated robot connected (transport: {:?}, protocol: {:?})",
            settings.transport, settings.protocol
        );
        self.world.set_connected(true);
        Ok(())
    }

    fn close(&mut self) -> HardwareResult<()> {
        info!("Simulated robot disconnected");
        self.world.set_connected(false);
        Ok(())
    }
}

pub struct SimChassis {
    world: SimWorld,
}

impl Chassis for SimChassis {
    fn drive(&mut self, rate: ChassisRate) -> HardwareResult<()> {
        if !self.world.is_connected() {
            return Err(HardwareError::NotConnected);
        }
        self.world.set_chassis_rate(rate);
        Ok(())
    }
}

pub struct SimGimbal {
    world: SimWorld,
}

impl Gimbal for SimGimbal {
    fn drive(&mut self, rate: GimbalRate) -> HardwareResult<()> {
        if !self.world.is_connected() {
            return Err(HardwareError::NotConnected);
        }
        self.world.set_gimbal_rate(rate);
        Ok(())
    }
}

pub struct SimBlaster {
    world: SimWorld,
}

impl Blaster for SimBlaster {
    fn fire(&mut self) -> HardwareResult<()> {
        if !self.world.is_connected() {
            return Err(HardwareError::NotConnected);
        }
        let hit = self.world.register_shot(Instant::now());
        debug!("Simulated shot fired (hit: {hit})");
        Ok(())
    }
}

/// Looks up the rendered target box for a simulated frame
pub struct SimGroundTruth {
    world: SimWorld,
}

impl GroundTruth for SimGroundTruth {
    fn lookup(&mut self, frame: &Frame) -> Option<BoundingBox> {
        self.world.ground_truth(frame.sequence())
    }
}

/// Factory for the simulated robot's ports and helpers
#[derive(Debug, Clone)]
pub struct SimRobot {
    world: SimWorld,
}

impl SimRobot {
    pub fn new(config: SimConfig) -> Self {
        Self {
            world: SimWorld::new(config),
        }
    }

    pub fn world(&self) -> &SimWorld {
        &self.world
    }

    /// Ports of the simulated robot, all sharing one world
    pub fn ports(&self) -> RobotPorts {
        RobotPorts {
            connection: Box::new(SimConnection {
                world: self.world.clone(),
            }),
            camera: Box::new(SimCamera::new(self.world.clone())),
            chassis: Box::new(SimChassis {
                world: self.world.clone(),
            }),
            gimbal: Box::new(SimGimbal {
                world: self.world.clone(),
            }),
            blaster: Box::new(SimBlaster {
                world: self.world.clone(),
            }),
        }
    }

    pub fn ground_truth(&self) -> SimGroundTruth {
        SimGroundTruth {
            world: self.world.clone(),
        }
    }
}
