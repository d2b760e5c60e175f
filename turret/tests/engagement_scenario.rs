//! Scripted engagement runs through the full per-frame pipeline:
//! detector output, target selection, metrics, gimbal and blaster commands.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use hardware::mock::{CommandLog, MockBlaster, MockChassis, MockGimbal, PortCommand};
use hardware::GimbalRate;
use shared::camera_interface::Frame;
use shared::detection::{BoundingBox, DetectorError, ObjectDetector, RawDetection};
use shared::image_size::ImageSize;
use turret::{Actuators, ControlLoop, EngagementPhase, Keys, TurretConfig};

const SIZE: ImageSize = ImageSize {
    width: 640,
    height: 480,
};

/// Plays back one target offset per frame; `None` means nothing detected
struct ScriptedDetector {
    offsets: VecDeque<Option<(f64, f64)>>,
}

impl ScriptedDetector {
    fn new(offsets: impl IntoIterator<Item = Option<(f64, f64)>>) -> Self {
        Self {
            offsets: offsets.into_iter().collect(),
        }
    }
}

impl ObjectDetector for ScriptedDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, DetectorError> {
        let Some(next) = self.offsets.pop_front() else {
            return Err(DetectorError::Backend("script exhausted".to_string()));
        };
        Ok(next
            .map(|(x, y)| {
                let (cx, cy) = frame.size().pixel_from_offset(x, y);
                RawDetection::new(
                    BoundingBox::new(cx - 8.0, cy - 8.0, cx + 8.0, cy + 8.0),
                    0.9,
                    0,
                )
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
fn test_acquire_track_lock_and_fire_once() {
    let log = CommandLog::new();
    let mut actuators = actuators(&log);

    // Three frames off target, then ten inside the dead zone
    let script = [Some((0.2, 0.0)); 3]
        .into_iter()
        .chain([Some((0.01, 0.01)); 10]);
    let mut control = ControlLoop::new(&TurretConfig::default(), ScriptedDetector::new(script));

    let t0 = Instant::now();
    let period = Duration::from_millis(70);
    let mut fired_at = Vec::new();
    for i in 0..13u32 {
        let frame = Frame::blank(SIZE, u64::from(i));
        let report = control.step(Some(&frame), Keys::empty(), t0 + period * i, &mut actuators);

        if i < 3 {
            assert_eq!(report.phase, Some(EngagementPhase::Tracking), "frame {i}");
            assert!((report.gimbal.yaw - 4.0).abs() < 1e-6);
        } else {
            assert_eq!(report.gimbal, GimbalRate::zero(), "frame {i}");
        }
        if report.fired {
            fired_at.push(i);
        }
    }

    // Lock starts at frame 3 (210 ms); 500 ms of dwell is first reached at
    // frame 11 (770 ms). Frame 12 is still inside the 100 ms cooldown.
    assert_eq!(fired_at, vec![11]);
    assert_eq!(log.fire_count(), 1);
    assert_eq!(control.engagement().phase(), EngagementPhase::Locked);

    let metrics = control.metrics();
    assert_eq!(metrics.total_frames(), 13);
    assert_eq!(metrics.successful_tracks(), 10);
    assert_eq!(metrics.target_losses(), 3);
}

#[test]
fn test_flicker_prevents_fire() {
    let log = CommandLog::new();
    let mut actuators = actuators(&log);

    // Target drops out every fourth frame, so dwell never reaches 500 ms
    let script = (0..40).map(|i| if i % 4 == 3 { None } else { Some((0.0, 0.01)) });
    let mut control = ControlLoop::new(&TurretConfig::default(), ScriptedDetector::new(script));

    let t0 = Instant::now();
    for i in 0..40u32 {
        let frame = Frame::blank(SIZE, u64::from(i));
        let report = control.step(
            Some(&frame),
            Keys::empty(),
            t0 + Duration::from_millis(100) * i,
            &mut actuators,
        );
        if i % 4 == 3 {
            assert_eq!(report.phase, Some(EngagementPhase::Searching));
        }
    }

    assert_eq!(log.fire_count(), 0);
    assert_eq!(control.metrics().target_losses(), 10);
}

#[test]
fn test_sustained_lock_fires_at_cooldown_rate() {
    let log = CommandLog::new();
    let mut actuators = actuators(&log);
    let mut control = ControlLoop::new(
        &TurretConfig::default(),
        ScriptedDetector::new([Some((0.0, 0.0)); 31]),
    );

    // 31 frames, 50 ms apart: 0 .. 1500 ms
    let t0 = Instant::now();
    for i in 0..31u32 {
        let frame = Frame::blank(SIZE, u64::from(i));
        control.step(
            Some(&frame),
            Keys::empty(),
            t0 + Duration::from_millis(50) * i,
            &mut actuators,
        );
    }

    // Shots at 500, 600, ... 1500 ms
    assert_eq!(log.fire_count(), 11);
}

#[test]
fn test_manual_drive_during_engagement() {
    let log = CommandLog::new();
    let mut actuators = actuators(&log);
    let mut control = ControlLoop::new(
        &TurretConfig::default(),
        ScriptedDetector::new([Some((0.3, 0.0))]),
    );

    let frame = Frame::blank(SIZE, 0);
    let report = control.step(
        Some(&frame),
        Keys::W | Keys::Q | Keys::I,
        Instant::now(),
        &mut actuators,
    );

    // Chassis follows the keys while the gimbal follows the target
    assert_eq!(report.chassis.x, 0.5);
    assert_eq!(report.chassis.yaw, -45.0);
    assert!((report.gimbal.yaw - 6.0).abs() < 1e-6);
    assert!(report.gimbal.pitch.abs() < 1e-9);

    let commands = log.snapshot();
    assert!(matches!(commands[0], PortCommand::Chassis(_)));
    assert!(matches!(commands[1], PortCommand::Gimbal(_)));
}
