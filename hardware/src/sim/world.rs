//! Shared kinematic state of the simulated robot and its target.

use std::collections::VecDeque;
use std::f64::consts::TAU;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use shared::detection::BoundingBox;

use crate::ports::{ChassisRate, GimbalRate};

use super::SimConfig;

/// Ground-truth boxes kept for recently rendered frames
const GROUND_TRUTH_HISTORY: usize = 32;

/// Gimbal pitch travel in degrees
const PITCH_LIMITS: (f64, f64) = (-20.0, 35.0);

/// Aim point of the turret relative to the target, in degrees.
///
/// Positive `yaw` means the target is right of the boresight; positive
/// `pitch` means it is above.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeBearing {
    pub yaw: f64,
    pub pitch: f64,
}

#[derive(Debug)]
struct WorldState {
    config: SimConfig,
    rng: ChaCha8Rng,
    start: Instant,
    last_step: Instant,
    connected: bool,
    streaming: bool,
    heading: f64,
    gimbal_yaw: f64,
    gimbal_pitch: f64,
    chassis_rate: ChassisRate,
    gimbal_rate: GimbalRate,
    jitter: (f64, f64),
    shots_fired: u64,
    hits: u64,
    ground_truth: VecDeque<(u64, BoundingBox)>,
}

impl WorldState {
    fn step(&mut self, now: Instant) {
        let dt = now.saturating_duration_since(self.last_step).as_secs_f64();
        self.last_step = now;
        if !self.connected {
            return;
        }

        self.heading += self.chassis_rate.yaw * dt;
        self.gimbal_yaw += self.gimbal_rate.yaw * dt;
        self.gimbal_pitch = (self.gimbal_pitch + self.gimbal_rate.pitch * dt)
            .clamp(PITCH_LIMITS.0, PITCH_LIMITS.1);

        let sigma = self.config.target_jitter_deg;
        if sigma > 0.0 {
            self.jitter = (
                self.rng.random_range(-sigma..=sigma),
                self.rng.random_range(-sigma..=sigma),
            );
        }
    }

    fn elapsed(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.start).as_secs_f64()
    }

    fn target_visible(&self, now: Instant) -> bool {
        let cycle = self.config.target_visible_secs + self.config.target_hidden_secs;
        if self.config.target_hidden_secs <= 0.0 || cycle <= 0.0 {
            return true;
        }
        self.elapsed(now) % cycle < self.config.target_visible_secs
    }

    fn relative_bearing(&self, now: Instant) -> RelativeBearing {
        let phase = TAU * self.elapsed(now) / self.config.target_period_secs;
        let target_yaw =
            self.config.target_bearing_deg + self.config.target_amplitude_deg * phase.sin();
        let target_pitch = 0.25 * self.config.target_amplitude_deg * (2.0 * phase).sin();
        RelativeBearing {
            yaw: target_yaw + self.jitter.0 - self.heading - self.gimbal_yaw,
            pitch: target_pitch + self.jitter.1 - self.gimbal_pitch,
        }
    }
}

/// Handle to the simulated world, shared by every simulated port.
#[derive(Debug, Clone)]
pub struct SimWorld {
    inner: Arc<Mutex<WorldState>>,
}

impl SimWorld {
    pub fn new(config: SimConfig) -> Self {
        let now = Instant::now();
        let state = WorldState {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            start: now,
            last_step: now,
            connected: false,
            streaming: false,
            heading: 0.0,
            gimbal_yaw: 0.0,
            gimbal_pitch: 0.0,
            chassis_rate: ChassisRate::zero(),
            gimbal_rate: GimbalRate::zero(),
            jitter: (0.0, 0.0),
            shots_fired: 0,
            hits: 0,
            ground_truth: VecDeque::with_capacity(GROUND_TRUTH_HISTORY),
        };
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> SimConfig {
        self.lock().config.clone()
    }

    /// Advance the simulation to `now` and report where the target is.
    ///
    /// Returns `None` while the target is out of sight.
    pub fn observe(&self, now: Instant) -> Option<RelativeBearing> {
        let mut state = self.lock();
        state.step(now);
        state
            .target_visible(now)
            .then(|| state.relative_bearing(now))
    }

    /// Draw a random number in [0, 1) from the world's seeded generator
    pub fn random_unit(&self) -> f64 {
        self.lock().rng.random::<f64>()
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        let mut state = self.lock();
        state.step(Instant::now());
        state.connected = connected;
        if !connected {
            state.chassis_rate = ChassisRate::zero();
            state.gimbal_rate = GimbalRate::zero();
            state.streaming = false;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub(crate) fn set_streaming(&self, streaming: bool) {
        self.lock().streaming = streaming;
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().streaming
    }

    pub(crate) fn set_chassis_rate(&self, rate: ChassisRate) {
        let mut state = self.lock();
        state.step(Instant::now());
        state.chassis_rate = rate;
    }

    pub(crate) fn set_gimbal_rate(&self, rate: GimbalRate) {
        let mut state = self.lock();
        state.step(Instant::now());
        state.gimbal_rate = rate;
    }

    pub fn chassis_rate(&self) -> ChassisRate {
        self.lock().chassis_rate
    }

    pub fn gimbal_rate(&self) -> GimbalRate {
        self.lock().gimbal_rate
    }

    /// Register a shot; counts as a hit when the target is visible and within
    /// the configured tolerance of the boresight.
    pub(crate) fn register_shot(&self, now: Instant) -> bool {
        let mut state = self.lock();
        state.step(now);
        state.shots_fired += 1;

        let tolerance = state.config.hit_tolerance_deg;
        let hit = state.target_visible(now) && {
            let bearing = state.relative_bearing(now);
            bearing.yaw.abs() <= tolerance && bearing.pitch.abs() <= tolerance
        };
        if hit {
            state.hits += 1;
        }
        hit
    }

    pub fn shots_fired(&self) -> u64 {
        self.lock().shots_fired
    }

    pub fn hits(&self) -> u64 {
        self.lock().hits
    }

    pub(crate) fn record_ground_truth(&self, sequence: u64, bbox: BoundingBox) {
        let mut state = self.lock();
        if state.ground_truth.len() == GROUND_TRUTH_HISTORY {
            state.ground_truth.pop_front();
        }
        state.ground_truth.push_back((sequence, bbox));
    }

    /// True target box for a recently rendered frame, if it was visible
    pub fn ground_truth(&self, sequence: u64) -> Option<BoundingBox> {
        self.lock()
            .ground_truth
            .iter()
            .rev()
            .find(|(seq, _)| *seq == sequence)
            .map(|(_, bbox)| *bbox)
    }
}
