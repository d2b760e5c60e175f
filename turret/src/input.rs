//! Operator key state and the mapping from held keys to motion commands.
//!
//! Chassis: `w`/`s` forward/back, `a`/`d` left/right, `q`/`e` rotate.
//! Gimbal: `i`/`k` pitch, `j`/`l` yaw. Up/Down arrows change chassis speed.
//! Escape ends the session.

use bitflags::bitflags;
use hardware::{ChassisRate, GimbalRate};
use thiserror::Error;

use crate::config::DriveConfig;

bitflags! {
    /// Set of keys held at one instant
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Keys: u16 {
        const W = 1 << 0;
        const S = 1 << 1;
        const A = 1 << 2;
        const D = 1 << 3;
        const Q = 1 << 4;
        const E = 1 << 5;
        const I = 1 << 6;
        const K = 1 << 7;
        const J = 1 << 8;
        const L = 1 << 9;
        const UP = 1 << 10;
        const DOWN = 1 << 11;
        const ESCAPE = 1 << 12;
    }
}

impl Keys {
    /// Flag for a letter key, case-insensitive
    pub fn from_char(c: char) -> Option<Self> {
        let key = match c.to_ascii_lowercase() {
            'w' => Keys::W,
            's' => Keys::S,
            'a' => Keys::A,
            'd' => Keys::D,
            'q' => Keys::Q,
            'e' => Keys::E,
            'i' => Keys::I,
            'k' => Keys::K,
            'j' => Keys::J,
            'l' => Keys::L,
            _ => return None,
        };
        Some(key)
    }

    /// +1 when only `positive` is held, -1 when only `negative` is, else 0
    fn axis(self, positive: Keys, negative: Keys) -> f64 {
        let pos = if self.contains(positive) { 1.0 } else { 0.0 };
        let neg = if self.contains(negative) { 1.0 } else { 0.0 };
        pos - neg
    }
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Terminal input failed: {0}")]
    Terminal(#[from] std::io::Error),
}

/// Source of the operator's currently held keys
pub trait KeyStateProvider {
    fn snapshot(&mut self) -> Result<Keys, InputError>;
}

impl<P: KeyStateProvider + ?Sized> KeyStateProvider for Box<P> {
    fn snapshot(&mut self) -> Result<Keys, InputError> {
        (**self).snapshot()
    }
}

/// Provider that always reports the same keys.
///
/// `StaticKeys::none()` is the headless operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticKeys(pub Keys);

impl StaticKeys {
    pub fn none() -> Self {
        Self(Keys::empty())
    }
}

impl KeyStateProvider for StaticKeys {
    fn snapshot(&mut self) -> Result<Keys, InputError> {
        Ok(self.0)
    }
}

/// Turns held keys into chassis and gimbal rates.
///
/// The only state is the current chassis speed, which the speed keys step
/// up and down between the configured bounds.
#[derive(Debug, Clone)]
pub struct InputMapper {
    config: DriveConfig,
    speed: f64,
}

impl InputMapper {
    pub fn new(config: DriveConfig) -> Self {
        Self {
            speed: bound_speed(config.base_speed, &config),
            config,
        }
    }

    /// Current chassis speed, m/s
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Step the chassis speed for each speed key held, returning the new speed.
    pub fn adjust_speed(&mut self, keys: Keys) -> f64 {
        let step = keys.axis(Keys::UP, Keys::DOWN) * self.config.speed_increment;
        self.speed = bound_speed(self.speed + step, &self.config);
        self.speed
    }

    /// Opposing keys cancel; independent axes compose.
    pub fn chassis_rates(&self, keys: Keys) -> ChassisRate {
        ChassisRate::new(
            self.speed * keys.axis(Keys::W, Keys::S),
            self.speed * keys.axis(Keys::D, Keys::A),
            self.config.rotation_speed * keys.axis(Keys::E, Keys::Q),
        )
    }

    /// `k` pitches positive, `i` negative; `l` yaws right, `j` left.
    pub fn gimbal_rates(&self, keys: Keys) -> GimbalRate {
        GimbalRate::new(
            self.config.gimbal_speed * keys.axis(Keys::K, Keys::I),
            self.config.gimbal_speed * keys.axis(Keys::L, Keys::J),
        )
    }
}

/// Keep `speed` inside the configured bounds.
///
/// Unlike `f64::clamp` this tolerates inverted or NaN bounds, which an
/// unvalidated config can carry: the upper bound wins.
fn bound_speed(speed: f64, config: &DriveConfig) -> f64 {
    speed.max(config.min_speed).min(config.max_speed)
}
