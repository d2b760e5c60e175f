//! Robot ports for the turret controller.
//!
//! This crate defines the narrow actuator/sensor interfaces the control core
//! talks to, plus implementations that need no vendor hardware.
//!
//! # Modules
//!
//! - [`ports`] - `Camera`, `Chassis`, `Gimbal`, `Blaster` and `Connection`
//!   traits and their command types
//! - [`mock`] - Recording fakes for tests
//! - [`sim`] - Simulated robot and blob detector (feature `sim`, on by default)
//!
//! Vendor drivers plug in by implementing the traits in [`ports`].

pub mod error;
pub mod mock;
pub mod ports;

#[cfg(feature = "sim")]
pub mod sim;

pub use error::{HardwareError, HardwareResult};
pub use ports::{
    Blaster, Camera, Chassis, ChassisRate, Connection, ConnectionSettings, Gimbal, GimbalRate,
    Protocol, RobotPorts, Transport,
};
