//! Vision-guided turret controller.
//!
//! Drives a wheeled robot with a camera, a two-axis gimbal and a blaster:
//! an operator steers the chassis from the keyboard while detections from an
//! object detector steer the gimbal toward the most confident target and
//! fire once the aim has held steady.
//!
//! # Modules
//!
//! - [`config`] - Defaults, JSON config files and validation
//! - [`input`] - Held keys and their mapping to chassis/gimbal rates
//! - [`terminal_keys`] - Key state read from a raw-mode terminal
//! - [`detection_adapter`] - Detector thresholding and target selection
//! - [`engagement`] - Aim, lock and fire state machine
//! - [`metrics`] - Detection timing, FPS and tracking-quality accounting
//! - [`acquisition`] - Background frame reading into a newest-wins slot
//! - [`control_loop`] - Per-frame control logic and the session lifecycle

pub mod acquisition;
pub mod config;
pub mod control_loop;
pub mod detection_adapter;
pub mod engagement;
pub mod error;
pub mod input;
pub mod metrics;
pub mod shutdown;
pub mod terminal_keys;

pub use config::{ConfigError, TurretConfig};
pub use control_loop::{Actuators, ControlLoop, Session, StepReport};
pub use detection_adapter::{DetectionAdapter, DetectionMode};
pub use engagement::{Engagement, EngagementDecision, EngagementPhase, EngagementState};
pub use error::{FaultKind, LoopError, SessionError};
pub use input::{InputError, InputMapper, KeyStateProvider, Keys, StaticKeys};
pub use metrics::{MetricsCollector, MetricsSummary};
pub use shutdown::ShutdownSignal;
