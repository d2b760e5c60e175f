//! Aim, lock and fire decisions for a lethal detection mode.
//!
//! Each update either reports no target (`Searching`), steers the gimbal
//! proportionally toward the target (`Tracking`), or holds the gimbal still
//! while the aim stays inside the dead zone (`Locking`). Once the aim has
//! been continuously inside the dead zone for the lock duration the turret is
//! `Locked` and fires whenever the cooldown since the last shot has elapsed.

use std::time::Instant;

use hardware::GimbalRate;
use shared::detection::Detection;
use tracing::{debug, info};

use crate::config::EngagementConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementPhase {
    Searching,
    Tracking,
    Locking,
    Locked,
}

/// Timing state carried between updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngagementState {
    /// When the aim most recently entered the dead zone, while it stays there
    pub locked_since: Option<Instant>,
    /// Time of the last fire command; `None` means no shot yet
    pub last_fire_time: Option<Instant>,
}

/// Outcome of one engagement update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngagementDecision {
    pub phase: EngagementPhase,
    /// Gimbal command for this iteration; `None` leaves the gimbal to manual control
    pub gimbal: Option<GimbalRate>,
    /// Whether to issue a fire command this iteration
    pub fire: bool,
}

pub struct Engagement {
    config: EngagementConfig,
    state: EngagementState,
    phase: EngagementPhase,
}

impl Engagement {
    pub fn new(config: EngagementConfig) -> Self {
        Self {
            config,
            state: EngagementState::default(),
            phase: EngagementPhase::Searching,
        }
    }

    pub fn state(&self) -> EngagementState {
        self.state
    }

    pub fn phase(&self) -> EngagementPhase {
        self.phase
    }

    /// Advance the state machine with this iteration's detection.
    ///
    /// A returned `fire` of true counts as a shot: the cooldown restarts at
    /// `now` whether or not the blaster command later succeeds.
    pub fn update(&mut self, detection: Option<&Detection>, now: Instant) -> EngagementDecision {
        let decision = match detection {
            None => {
                self.state.locked_since = None;
                EngagementDecision {
                    phase: EngagementPhase::Searching,
                    gimbal: None,
                    fire: false,
                }
            }
            Some(target) if !self.on_target(target) => {
                self.state.locked_since = None;
                EngagementDecision {
                    phase: EngagementPhase::Tracking,
                    gimbal: Some(GimbalRate::new(
                        -self.config.gain * target.y_offset,
                        self.config.gain * target.x_offset,
                    )),
                    fire: false,
                }
            }
            // Entering the dead zone only starts the dwell, even with a zero lock duration
            Some(_) => match self.state.locked_since {
                None => {
                    self.state.locked_since = Some(now);
                    EngagementDecision {
                        phase: EngagementPhase::Locking,
                        gimbal: Some(GimbalRate::zero()),
                        fire: false,
                    }
                }
                Some(since) => {
                    let dwell = now.saturating_duration_since(since);
                    if dwell < self.config.lock_duration {
                        EngagementDecision {
                            phase: EngagementPhase::Locking,
                            gimbal: Some(GimbalRate::zero()),
                            fire: false,
                        }
                    } else {
                        let fire = self.cooldown_elapsed(now);
                        if fire {
                            self.state.last_fire_time = Some(now);
                            info!("Target locked for {dwell:?}; firing");
                        }
                        EngagementDecision {
                            phase: EngagementPhase::Locked,
                            gimbal: Some(GimbalRate::zero()),
                            fire,
                        }
                    }
                }
            },
        };

        if decision.phase != self.phase {
            debug!("Engagement {:?} -> {:?}", self.phase, decision.phase);
            self.phase = decision.phase;
        }
        decision
    }

    fn on_target(&self, target: &Detection) -> bool {
        target.x_offset.abs() < self.config.dead_zone
            && target.y_offset.abs() < self.config.dead_zone
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        self.state.last_fire_time.map_or(true, |last| {
            now.saturating_duration_since(last) >= self.config.fire_cooldown
        })
    }
}
