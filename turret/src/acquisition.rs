//! Background frame acquisition.
//!
//! A dedicated thread reads frames from the camera and publishes each into
//! the [`FrameSlot`], replacing any frame the control loop has not taken yet.
//! Read failures trigger a stream restart; a failed restart backs off before
//! the next attempt. The thread exits promptly once shutdown is requested.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use hardware::{Camera, HardwareResult};
use shared::camera_interface::{FrameSlot, Publish};
use tracing::{debug, info, warn};

use crate::config::LoopTiming;
use crate::error::FaultKind;
use crate::shutdown::ShutdownSignal;

/// Counters reported by the acquisition thread when it exits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AcquisitionStats {
    pub frames_read: u64,
    /// Frames overwritten before the control loop took them
    pub frames_dropped: u64,
    pub read_failures: u64,
    pub restarts: u64,
    pub failed_restarts: u64,
}

/// Start the acquisition thread.
///
/// The camera must already be streaming. It is stopped when the thread exits.
pub fn spawn_acquisition(
    mut camera: Box<dyn Camera>,
    slot: Arc<FrameSlot>,
    shutdown: ShutdownSignal,
    timing: LoopTiming,
) -> io::Result<JoinHandle<AcquisitionStats>> {
    thread::Builder::new()
        .name("frame-acquisition".to_string())
        .spawn(move || {
            let stats = run_acquisition(camera.as_mut(), &slot, &shutdown, &timing);
            if let Err(e) = camera.stop_stream() {
                warn!(fault = %FaultKind::Sensor, "Failed to stop video stream: {e}");
            }
            slot.close();
            stats
        })
}

/// Read frames until shutdown, publishing each into `slot`.
pub fn run_acquisition(
    camera: &mut dyn Camera,
    slot: &FrameSlot,
    shutdown: &ShutdownSignal,
    timing: &LoopTiming,
) -> AcquisitionStats {
    let mut stats = AcquisitionStats::default();
    info!("Frame acquisition started");

    while !shutdown.is_triggered() {
        match camera.read_frame(timing.camera_read_timeout) {
            Ok(Some(frame)) => {
                stats.frames_read += 1;
                match slot.publish(frame) {
                    Publish::Stored => {}
                    Publish::Replaced => stats.frames_dropped += 1,
                    Publish::Closed => break,
                }
            }
            Ok(None) => {}
            Err(e) => {
                stats.read_failures += 1;
                warn!(
                    fault = %FaultKind::Sensor,
                    "Frame read failed: {e}; restarting video stream"
                );
                match restart_stream(camera) {
                    Ok(()) => {
                        stats.restarts += 1;
                        info!("Video stream restarted");
                    }
                    Err(e) => {
                        stats.failed_restarts += 1;
                        warn!(
                            fault = %FaultKind::Sensor,
                            "Video stream restart failed: {e}; retrying in {:?}",
                            timing.reconnect_backoff
                        );
                        shutdown.wait_timeout(timing.reconnect_backoff);
                    }
                }
            }
        }
    }

    debug!("Frame acquisition stopping: {stats:?}");
    stats
}

fn restart_stream(camera: &mut dyn Camera) -> HardwareResult<()> {
    camera.stop_stream()?;
    camera.start_stream()
}
