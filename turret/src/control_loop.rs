//! The control loop and the session that owns it.
//!
//! Each iteration takes the freshest frame, runs detection, records metrics,
//! maps held keys to chassis motion, lets the engagement logic (or the
//! operator) drive the gimbal, and fires when the engagement logic says so.
//! [`Session`] wires this to robot ports, runs frame acquisition on its own
//! thread, and guarantees the robot is stopped and released on every exit
//! path.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use hardware::{Blaster, Chassis, ChassisRate, Connection, Gimbal, GimbalRate, RobotPorts};
use shared::camera_interface::{Frame, FrameSlot, SlotReadError};
use shared::detection::{Detection, GroundTruth, ObjectDetector};
use tracing::{error, info, warn};

use crate::acquisition::{spawn_acquisition, AcquisitionStats};
use crate::config::TurretConfig;
use crate::detection_adapter::DetectionAdapter;
use crate::engagement::{Engagement, EngagementPhase};
use crate::error::{FaultKind, LoopError, SessionError};
use crate::input::{InputMapper, KeyStateProvider, Keys};
use crate::metrics::{MetricsCollector, MetricsSummary};
use crate::shutdown::ShutdownSignal;

/// The robot's motion and weapon ports
pub struct Actuators {
    pub chassis: Box<dyn Chassis>,
    pub gimbal: Box<dyn Gimbal>,
    pub blaster: Box<dyn Blaster>,
}

impl Actuators {
    pub fn drive_chassis(&mut self, rate: ChassisRate) {
        if let Err(e) = self.chassis.drive(rate) {
            warn!(fault = %FaultKind::Actuator, "Chassis command {rate:?} failed: {e}");
        }
    }

    pub fn drive_gimbal(&mut self, rate: GimbalRate) {
        if let Err(e) = self.gimbal.drive(rate) {
            warn!(fault = %FaultKind::Actuator, "Gimbal command {rate:?} failed: {e}");
        }
    }

    /// Returns whether the blaster accepted the command
    pub fn fire(&mut self) -> bool {
        match self.blaster.fire() {
            Ok(()) => true,
            Err(e) => {
                warn!(fault = %FaultKind::Actuator, "Fire command failed: {e}");
                false
            }
        }
    }

    /// Command zero rates to chassis and gimbal
    pub fn stop_all(&mut self) {
        self.drive_chassis(ChassisRate::zero());
        self.drive_gimbal(GimbalRate::zero());
    }
}

/// What one control iteration did
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub detection: Option<Detection>,
    /// Engagement phase, when the engagement logic ran this iteration
    pub phase: Option<EngagementPhase>,
    pub chassis: ChassisRate,
    pub gimbal: GimbalRate,
    /// Whether a fire command was issued
    pub fired: bool,
}

/// Per-iteration control logic, independent of threads and timing.
pub struct ControlLoop<D> {
    adapter: DetectionAdapter<D>,
    engagement: Engagement,
    input: InputMapper,
    metrics: MetricsCollector,
    ground_truth: Option<Box<dyn GroundTruth>>,
}

impl<D: ObjectDetector> ControlLoop<D> {
    pub fn new(config: &TurretConfig, detector: D) -> Self {
        Self {
            adapter: DetectionAdapter::new(
                detector,
                config.detection.mode,
                config.detection.confidence_threshold,
            ),
            engagement: Engagement::new(config.engagement),
            input: InputMapper::new(config.drive),
            metrics: MetricsCollector::new(config.metrics),
            ground_truth: None,
        }
    }

    pub fn with_ground_truth(mut self, ground_truth: Box<dyn GroundTruth>) -> Self {
        self.ground_truth = Some(ground_truth);
        self
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn metrics_mut(&mut self) -> &mut MetricsCollector {
        &mut self.metrics
    }

    pub fn engagement(&self) -> &Engagement {
        &self.engagement
    }

    pub fn input(&self) -> &InputMapper {
        &self.input
    }

    /// Run one iteration.
    ///
    /// `frame` is `None` when no fresh frame arrived in time; manual input
    /// still applies but no detection or metrics are recorded and the
    /// engagement state is left as it was.
    pub fn step(
        &mut self,
        frame: Option<&Frame>,
        keys: Keys,
        now: Instant,
        actuators: &mut Actuators,
    ) -> StepReport {
        let detection = frame.and_then(|frame| {
            let (elapsed, detection) = self.adapter.evaluate(frame);
            let truth = self
                .ground_truth
                .as_mut()
                .and_then(|source| source.lookup(frame));
            self.metrics
                .record_detection_at(elapsed, detection.as_ref(), truth.as_ref(), now);
            self.metrics.record_tracking(detection.as_ref());
            detection
        });

        self.input.adjust_speed(keys);
        let chassis = self.input.chassis_rates(keys);

        let decision = if frame.is_some() && self.adapter.mode().is_lethal() {
            Some(self.engagement.update(detection.as_ref(), now))
        } else {
            None
        };
        let gimbal = decision
            .and_then(|d| d.gimbal)
            .unwrap_or_else(|| self.input.gimbal_rates(keys));

        actuators.drive_chassis(chassis);
        actuators.drive_gimbal(gimbal);

        let fired = decision.is_some_and(|d| d.fire);
        if fired {
            actuators.fire();
        }

        StepReport {
            detection,
            phase: decision.map(|d| d.phase),
            chassis,
            gimbal,
            fired,
        }
    }

    /// Iterate until shutdown, Escape, or a loop fault.
    pub fn run(
        &mut self,
        slot: &FrameSlot,
        keys: &mut dyn KeyStateProvider,
        shutdown: &ShutdownSignal,
        actuators: &mut Actuators,
        frame_timeout: std::time::Duration,
        acquisition: &JoinHandle<AcquisitionStats>,
    ) -> Result<(), LoopError> {
        self.metrics.start_evaluation();
        info!("Control loop running (mode: {:?})", self.adapter.mode());

        while !shutdown.is_triggered() {
            let frame = match slot.try_take(frame_timeout) {
                Ok(frame) => Some(frame),
                Err(SlotReadError::Timeout) => None,
                Err(SlotReadError::Closed) => {
                    if shutdown.is_triggered() {
                        break;
                    }
                    return Err(LoopError::AcquisitionStopped);
                }
            };
            if acquisition.is_finished() && !shutdown.is_triggered() {
                return Err(LoopError::AcquisitionStopped);
            }

            let held = keys.snapshot()?;
            if held.contains(Keys::ESCAPE) {
                info!("Escape pressed; shutting down");
                shutdown.trigger();
                break;
            }

            self.step(frame.as_ref(), held, Instant::now(), actuators);
        }
        Ok(())
    }
}

/// Releases the robot on every exit path, including unwinding.
///
/// Stops acquisition first, then commands zero rates, then closes the
/// connection.
struct SafeStop {
    actuators: Actuators,
    connection: Box<dyn Connection>,
    shutdown: ShutdownSignal,
    slot: Arc<FrameSlot>,
}

impl Drop for SafeStop {
    fn drop(&mut self) {
        self.shutdown.trigger();
        self.slot.close();
        self.actuators.stop_all();
        match self.connection.close() {
            Ok(()) => info!("Robot stopped and connection closed"),
            Err(e) => warn!(
                fault = %FaultKind::Actuator,
                "Failed to close robot connection: {e}"
            ),
        }
    }
}

/// One run of the controller against a robot.
pub struct Session<D, K> {
    config: TurretConfig,
    ports: RobotPorts,
    detector: D,
    keys: K,
    shutdown: ShutdownSignal,
    ground_truth: Option<Box<dyn GroundTruth>>,
}

impl<D: ObjectDetector, K: KeyStateProvider> Session<D, K> {
    pub fn new(config: TurretConfig, ports: RobotPorts, detector: D, keys: K) -> Self {
        Self {
            config,
            ports,
            detector,
            keys,
            shutdown: ShutdownSignal::new(),
            ground_truth: None,
        }
    }

    /// Use an externally owned shutdown signal, e.g. one set by a signal handler
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_ground_truth(mut self, ground_truth: impl GroundTruth + 'static) -> Self {
        self.ground_truth = Some(Box::new(ground_truth));
        self
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Connect, run until shutdown, and stop the robot.
    ///
    /// The config is validated before anything is opened. The metrics summary
    /// is logged on every exit after initialization and returned on a clean
    /// exit.
    pub fn run(self) -> Result<MetricsSummary, SessionError> {
        let Session {
            config,
            ports,
            detector,
            mut keys,
            shutdown,
            ground_truth,
        } = self;
        let RobotPorts {
            connection,
            mut camera,
            chassis,
            gimbal,
            blaster,
        } = ports;

        if let Err(e) = config.validate() {
            error!(fault = %FaultKind::Initialization, "Rejected session config: {e}");
            return Err(SessionError::Config(e));
        }

        let slot = Arc::new(FrameSlot::new());
        let mut robot = SafeStop {
            actuators: Actuators {
                chassis,
                gimbal,
                blaster,
            },
            connection,
            shutdown: shutdown.clone(),
            slot: slot.clone(),
        };

        info!(
            "Connecting to robot (transport: {:?}, protocol: {:?})",
            config.connection.transport, config.connection.protocol
        );
        let init = robot
            .connection
            .open(&config.connection)
            .and_then(|()| camera.start_stream());
        if let Err(e) = init {
            error!(fault = %FaultKind::Initialization, "Robot initialization failed: {e}");
            return Err(SessionError::Initialization(e));
        }

        let acquisition =
            spawn_acquisition(camera, slot.clone(), shutdown.clone(), config.timing).map_err(
                |e| {
                    error!(
                        fault = %FaultKind::Initialization,
                        "Failed to start frame acquisition: {e}"
                    );
                    SessionError::AcquisitionSpawn(e)
                },
            )?;

        let mut control = ControlLoop::new(&config, detector);
        if let Some(ground_truth) = ground_truth {
            control = control.with_ground_truth(ground_truth);
        }

        let result = control.run(
            &slot,
            &mut keys,
            &shutdown,
            &mut robot.actuators,
            config.timing.frame_timeout,
            &acquisition,
        );
        if let Err(e) = &result {
            error!(fault = %FaultKind::Loop, "Control loop aborted: {e}");
        }

        // The acquisition join below may wait out a full camera read
        robot.actuators.stop_all();
        shutdown.trigger();
        slot.close();
        match acquisition.join() {
            Ok(stats) => info!("Frame acquisition finished: {stats:?}"),
            Err(_) => error!(fault = %FaultKind::Loop, "Frame acquisition thread panicked"),
        }
        drop(robot);

        let summary = control.metrics().finalize();
        info!("Session finished\n{summary}");
        result?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection_adapter::DetectionMode;
    use hardware::mock::{CommandLog, MockBlaster, MockChassis, MockGimbal, PortCommand};
    use shared::detection::{BoundingBox, DetectorError, RawDetection};
    use shared::image_size::ImageSize;
    use std::time::Duration;

    const SIZE: ImageSize = ImageSize {
        width: 200,
        height: 100,
    };

    /// Reports one box centered at a fixed pixel position
    struct PointDetector(Option<(f64, f64)>);

    impl ObjectDetector for PointDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>, DetectorError> {
            Ok(self
                .0
                .map(|(x, y)| {
                    RawDetection::new(BoundingBox::new(x - 2.0, y - 2.0, x + 2.0, y + 2.0), 0.9, 0)
                })
                .into_iter()
                .collect())
        }
    }

    fn actuators(log: &CommandLog) -> Actuators {
        Actuators {
            chassis: Box::new(MockChassis::new(log.clone())),
            gimbal: Box::new(MockGimbal::new(log.clone())),
            blaster: Box::new(MockBlaster::new(log.clone())),
        }
    }

    #[test]
    fn test_tracking_overrides_manual_gimbal() {
        let log = CommandLog::new();
        let mut actuators = actuators(&log);
        // 0.2 right of center
        let detector = PointDetector(Some((140.0, 50.0)));
        let mut control = ControlLoop::new(&TurretConfig::default(), detector);

        let frame = Frame::blank(SIZE, 1);
        let keys = Keys::J | Keys::W;
        let report = control.step(Some(&frame), keys, Instant::now(), &mut actuators);

        assert_eq!(report.phase, Some(EngagementPhase::Tracking));
        assert!((report.gimbal.yaw - 4.0).abs() < 1e-9);
        assert_eq!(report.chassis, ChassisRate::new(0.5, 0.0, 0.0));
        assert_eq!(log.last_gimbal(), Some(report.gimbal));
        assert_eq!(control.metrics().total_frames(), 1);
    }

    #[test]
    fn test_searching_uses_manual_gimbal() {
        let log = CommandLog::new();
        let mut actuators = actuators(&log);
        let mut control = ControlLoop::new(&TurretConfig::default(), PointDetector(None));

        let frame = Frame::blank(SIZE, 1);
        let report = control.step(Some(&frame), Keys::L, Instant::now(), &mut actuators);
        assert_eq!(report.phase, Some(EngagementPhase::Searching));
        assert_eq!(report.gimbal, GimbalRate::new(0.0, 45.0));
        assert_eq!(control.metrics().target_losses(), 1);
    }

    #[test]
    fn test_missing_frame_applies_manual_input_only() {
        let log = CommandLog::new();
        let mut actuators = actuators(&log);
        let detector = PointDetector(Some((100.0, 50.0)));
        let mut control = ControlLoop::new(&TurretConfig::default(), detector);

        let report = control.step(None, Keys::E | Keys::I, Instant::now(), &mut actuators);
        assert!(report.phase.is_none());
        assert!(report.detection.is_none());
        assert_eq!(report.chassis, ChassisRate::new(0.0, 0.0, 45.0));
        assert_eq!(report.gimbal, GimbalRate::new(-45.0, 0.0));
        assert_eq!(control.metrics().total_frames(), 0);
        assert_eq!(control.metrics().frames_evaluated(), 0);
    }

    #[test]
    fn test_general_mode_never_engages() {
        let log = CommandLog::new();
        let mut actuators = actuators(&log);
        let config = TurretConfig {
            detection: crate::config::DetectionConfig {
                mode: DetectionMode::General,
                confidence_threshold: None,
            },
            ..TurretConfig::default()
        };
        let mut control = ControlLoop::new(&config, PointDetector(Some((100.0, 50.0))));

        let t0 = Instant::now();
        for i in 0..20 {
            let frame = Frame::blank(SIZE, i);
            let report = control.step(
                Some(&frame),
                Keys::empty(),
                t0 + Duration::from_millis(100 * i),
                &mut actuators,
            );
            assert!(report.detection.is_some());
            assert!(report.phase.is_none());
            assert!(!report.fired);
        }
        assert_eq!(log.fire_count(), 0);
        assert_eq!(control.metrics().successful_tracks(), 20);
    }

    #[test]
    fn test_jammed_blaster_does_not_stop_loop() {
        let log = CommandLog::new();
        let mut actuators = Actuators {
            blaster: Box::new(MockBlaster::jammed(log.clone())),
            ..actuators(&log)
        };
        let config = TurretConfig {
            engagement: crate::config::EngagementConfig {
                lock_duration: Duration::ZERO,
                ..Default::default()
            },
            ..TurretConfig::default()
        };
        let mut control = ControlLoop::new(&config, PointDetector(Some((100.0, 50.0))));

        let t0 = Instant::now();
        let frame = Frame::blank(SIZE, 1);
        let mut step_at =
            |at: Instant| control.step(Some(&frame), Keys::empty(), at, &mut actuators);

        // Entering the dead zone starts the dwell without firing
        let entering = step_at(t0);
        assert_eq!(entering.phase, Some(EngagementPhase::Locking));
        assert!(!entering.fired);
        assert_eq!(log.fire_count(), 0);

        assert!(step_at(t0 + Duration::from_millis(1)).fired);
        // The failed shot still starts the cooldown
        assert!(!step_at(t0 + Duration::from_millis(50)).fired);
        assert_eq!(log.fire_count(), 1);
    }

    #[test]
    fn test_stop_all_zeroes_both() {
        let log = CommandLog::new();
        let mut actuators = actuators(&log);
        actuators.stop_all();
        assert_eq!(
            log.snapshot(),
            vec![
                PortCommand::Chassis(ChassisRate::zero()),
                PortCommand::Gimbal(GimbalRate::zero())
            ]
        );
    }
}
