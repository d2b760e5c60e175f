//! Threaded session lifecycle: startup failures, shutdown while blocked,
//! stream recovery, and the guaranteed safe stop.

use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use hardware::mock::{
    mock_robot, CommandLog, MockBlaster, MockCamera, MockChassis, MockConnection, MockGimbal,
    MockRead, PortCommand,
};
use hardware::{ChassisRate, GimbalRate, RobotPorts};
use shared::camera_interface::Frame;
use shared::detection::{BoundingBox, DetectorError, ObjectDetector, RawDetection};
use shared::image_size::ImageSize;
use turret::config::{DriveConfig, EngagementConfig, LoopTiming};
use turret::{Keys, Session, SessionError, ShutdownSignal, StaticKeys, TurretConfig};

const SIZE: ImageSize = ImageSize {
    width: 64,
    height: 48,
};

/// Always reports a target dead center
struct CenteredTarget;

impl ObjectDetector for CenteredTarget {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, DetectorError> {
        let (cx, cy) = frame.size().center();
        Ok(vec![RawDetection::new(
            BoundingBox::new(cx - 4.0, cy - 4.0, cx + 4.0, cy + 4.0),
            0.9,
            0,
        )])
    }
}

/// Detector that crashes on the first frame
struct CrashingDetector;

impl ObjectDetector for CrashingDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>, DetectorError> {
        panic!("detector crashed");
    }
}

fn fast_config() -> TurretConfig {
    TurretConfig {
        engagement: EngagementConfig {
            lock_duration: Duration::from_millis(100),
            ..EngagementConfig::default()
        },
        timing: LoopTiming {
            frame_timeout: Duration::from_millis(50),
            camera_read_timeout: Duration::from_millis(50),
            reconnect_backoff: Duration::from_secs(2),
        },
        ..TurretConfig::default()
    }
}

fn trigger_after(signal: ShutdownSignal, delay: Duration) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        thread::sleep(delay);
        signal.trigger();
    })
}

/// Zero chassis and gimbal commands both precede the final Close
fn assert_safe_stop(log: &CommandLog) {
    let commands = log.snapshot();
    let close = commands
        .iter()
        .rposition(|c| *c == PortCommand::Close)
        .expect("connection closed");
    let zero_chassis = commands
        .iter()
        .rposition(|c| *c == PortCommand::Chassis(ChassisRate::zero()))
        .expect("chassis zeroed");
    let zero_gimbal = commands
        .iter()
        .rposition(|c| *c == PortCommand::Gimbal(GimbalRate::zero()))
        .expect("gimbal zeroed");
    assert!(zero_chassis < close);
    assert!(zero_gimbal < close);
    assert_eq!(log.last_chassis(), Some(ChassisRate::zero()));
    assert_eq!(log.last_gimbal(), Some(GimbalRate::zero()));
}

#[test]
fn test_shutdown_while_waiting_for_frames() {
    let log = CommandLog::new();
    let session = Session::new(
        fast_config(),
        mock_robot(&log, MockCamera::stalled(log.clone())),
        CenteredTarget,
        StaticKeys::none(),
    );
    let trigger = trigger_after(session.shutdown_signal(), Duration::from_millis(100));

    let start = Instant::now();
    let summary = session.run().unwrap();
    trigger.join().unwrap();

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(summary.total_frames, 0);
    assert_eq!(log.fire_count(), 0);
    assert_safe_stop(&log);
}

#[test]
fn test_engages_streaming_target() {
    let log = CommandLog::new();
    let camera = MockCamera::streaming(log.clone(), SIZE, Duration::from_millis(10));
    let session = Session::new(
        fast_config(),
        mock_robot(&log, camera),
        CenteredTarget,
        StaticKeys::none(),
    );
    let trigger = trigger_after(session.shutdown_signal(), Duration::from_millis(600));

    let summary = session.run().unwrap();
    trigger.join().unwrap();

    assert!(log.fire_count() >= 1);
    assert!(summary.total_frames > 0);
    assert_eq!(summary.total_frames, summary.successful_tracks);
    assert!(summary.mean_fps.is_some());
    assert_safe_stop(&log);

    let commands = log.snapshot();
    assert!(matches!(commands[0], PortCommand::Open(_)));
    assert_eq!(commands[1], PortCommand::StartStream);
}

#[test]
fn test_connection_failure_still_stops_robot() {
    let log = CommandLog::new();
    let ports = RobotPorts {
        connection: Box::new(MockConnection::refusing(log.clone())),
        ..mock_robot(&log, MockCamera::stalled(log.clone()))
    };
    let session = Session::new(fast_config(), ports, CenteredTarget, StaticKeys::none());

    let err = session.run().unwrap_err();
    assert!(matches!(err, SessionError::Initialization(_)));
    assert_eq!(log.count_of(&PortCommand::StartStream), 0);
    assert_safe_stop(&log);
}

#[test]
fn test_escape_ends_session() {
    let log = CommandLog::new();
    let camera = MockCamera::streaming(log.clone(), SIZE, Duration::from_millis(10));
    let session = Session::new(
        fast_config(),
        mock_robot(&log, camera),
        CenteredTarget,
        StaticKeys(Keys::ESCAPE),
    );
    let signal = session.shutdown_signal();

    let start = Instant::now();
    session.run().unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(signal.is_triggered());
    assert_safe_stop(&log);
}

#[test]
fn test_recovers_from_stream_faults() {
    let log = CommandLog::new();
    let camera = MockCamera::streaming(log.clone(), SIZE, Duration::from_millis(10))
        .with_script([MockRead::Fault, MockRead::Frame, MockRead::Fault]);
    let session = Session::new(
        fast_config(),
        mock_robot(&log, camera),
        CenteredTarget,
        StaticKeys::none(),
    );
    let trigger = trigger_after(session.shutdown_signal(), Duration::from_millis(300));

    let summary = session.run().unwrap();
    trigger.join().unwrap();

    // Initial start plus one restart per fault
    assert_eq!(log.count_of(&PortCommand::StartStream), 3);
    assert!(summary.total_frames > 0);
    assert_safe_stop(&log);
}

#[test]
fn test_jammed_blaster_keeps_running() {
    let log = CommandLog::new();
    let camera = MockCamera::streaming(log.clone(), SIZE, Duration::from_millis(10));
    let ports = RobotPorts {
        connection: Box::new(MockConnection::new(log.clone())),
        camera: Box::new(camera),
        chassis: Box::new(MockChassis::new(log.clone())),
        gimbal: Box::new(MockGimbal::new(log.clone())),
        blaster: Box::new(MockBlaster::jammed(log.clone())),
    };
    let session = Session::new(fast_config(), ports, CenteredTarget, StaticKeys::none());
    let trigger = trigger_after(session.shutdown_signal(), Duration::from_millis(500));

    session.run().unwrap();
    trigger.join().unwrap();

    // Lock at ~100 ms, then a shot attempt per 100 ms cooldown
    assert!(log.fire_count() >= 2);
    assert_safe_stop(&log);
}

#[test]
fn test_chassis_stops_before_camera_read_returns() {
    let log = CommandLog::new();
    let config = TurretConfig {
        timing: LoopTiming {
            camera_read_timeout: Duration::from_millis(1500),
            ..fast_config().timing
        },
        ..fast_config()
    };
    let session = Session::new(
        config,
        mock_robot(&log, MockCamera::stalled(log.clone())),
        CenteredTarget,
        StaticKeys(Keys::W),
    );
    let signal = session.shutdown_signal();
    let watched = log.clone();
    let watcher = thread::spawn(move || {
        thread::sleep(Duration::from_millis(200));
        let triggered = Instant::now();
        signal.trigger();
        let stopped = PortCommand::Chassis(ChassisRate::zero());
        while !watched.snapshot().contains(&stopped) && triggered.elapsed() < Duration::from_secs(3)
        {
            thread::sleep(Duration::from_millis(5));
        }
        triggered.elapsed()
    });

    session.run().unwrap();
    let stop_latency = watcher.join().unwrap();

    // The held key drove the chassis until shutdown
    assert!(log.count_of(&PortCommand::Chassis(ChassisRate::new(0.5, 0.0, 0.0))) > 0);
    assert!(
        stop_latency < Duration::from_millis(500),
        "chassis zeroed {stop_latency:?} after shutdown"
    );
    assert_safe_stop(&log);
}

#[test]
fn test_detector_panic_still_stops_robot() {
    let log = CommandLog::new();
    let camera = MockCamera::streaming(log.clone(), SIZE, Duration::from_millis(10));
    let session = Session::new(
        fast_config(),
        mock_robot(&log, camera),
        CrashingDetector,
        StaticKeys(Keys::W),
    );

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| session.run()));
    assert!(outcome.is_err());
    assert_eq!(log.fire_count(), 0);
    assert_safe_stop(&log);
}

#[test]
fn test_invalid_config_rejected_before_connecting() {
    let log = CommandLog::new();
    let config = TurretConfig {
        drive: DriveConfig {
            min_speed: 2.0,
            max_speed: 1.0,
            ..DriveConfig::default()
        },
        ..fast_config()
    };
    let session = Session::new(
        config,
        mock_robot(&log, MockCamera::stalled(log.clone())),
        CenteredTarget,
        StaticKeys(Keys::W | Keys::UP),
    );

    let err = session.run().unwrap_err();
    assert!(matches!(err, SessionError::Config(_)));
    assert!(log.snapshot().is_empty());
}
