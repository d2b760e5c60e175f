//! Simulated gimbal camera.
//!
//! Renders the target as a red disc at the position implied by the turret's
//! current aim. The camera runs at its own frame rate, independent of how
//! fast frames are consumed.

use std::thread;
use std::time::{Duration, Instant};

use shared::camera_interface::Frame;
use shared::detection::BoundingBox;
use tracing::debug;

use crate::error::{HardwareError, HardwareResult};
use crate::ports::Camera;

use super::world::{RelativeBearing, SimWorld};

/// Target color (RGB)
pub const TARGET_COLOR: [u8; 3] = [230, 24, 24];

/// Background color (RGB)
const BACKGROUND: [u8; 3] = [40, 44, 40];

pub struct SimCamera {
    world: SimWorld,
    sequence: u64,
    next_frame_at: Instant,
}

impl SimCamera {
    pub fn new(world: SimWorld) -> Self {
        Self {
            world,
            sequence: 0,
            next_frame_at: Instant::now(),
        }
    }

    fn frame_period(&self) -> Duration {
        let rate = self.world.config().frame_rate_hz.max(1.0);
        Duration::from_secs_f64(1.0 / rate)
    }

    fn render(&mut self, bearing: Option<RelativeBearing>, captured_at: Instant) -> Frame {
        let config = self.world.config();
        let size = config.frame_size;
        self.sequence += 1;

        let mut pixels = size.empty_rgb();
        for mut px in pixels.lanes_mut(ndarray::Axis(2)) {
            px.assign(&ndarray::arr1(&BACKGROUND));
        }

        if let Some(bearing) = bearing {
            let px_per_deg_x = size.width as f64 / config.horizontal_fov_deg;
            let px_per_deg_y = size.height as f64 / config.vertical_fov_deg;
            let (cx, cy) = size.center();
            let tx = cx + bearing.yaw * px_per_deg_x;
            let ty = cy - bearing.pitch * px_per_deg_y;
            let r = config.target_radius_px;

            let mut drawn = false;
            let x_min = (tx - r).floor().max(0.0) as usize;
            let y_min = (ty - r).floor().max(0.0) as usize;
            let x_max = ((tx + r).ceil().max(0.0) as usize).min(size.width);
            let y_max = ((ty + r).ceil().max(0.0) as usize).min(size.height);
            for y in y_min..y_max {
                for x in x_min..x_max {
                    let dx = x as f64 + 0.5 - tx;
                    let dy = y as f64 + 0.5 - ty;
                    if dx * dx + dy * dy <= r * r {
                        for (c, value) in TARGET_COLOR.iter().enumerate() {
                            pixels[[y, x, c]] = *value;
                        }
                        drawn = true;
                    }
                }
            }

            if drawn {
                let bbox = BoundingBox::new(
                    (tx - r).max(0.0),
                    (ty - r).max(0.0),
                    (tx + r).min(size.width as f64),
                    (ty + r).min(size.height as f64),
                );
                self.world.record_ground_truth(self.sequence, bbox);
            }
        }

        Frame::new(pixels, self.sequence, captured_at)
    }
}

impl Camera for SimCamera {
    fn read_frame(&mut self, timeout: Duration) -> HardwareResult<Option<Frame>> {
        if !self.world.is_streaming() {
            return Err(HardwareError::Stream("video stream not started".to_string()));
        }

        let now = Instant::now();
        let wait = self.next_frame_at.saturating_duration_since(now);
        if wait > timeout {
            thread::sleep(timeout);
            return Ok(None);
        }
        thread::sleep(wait);
        self.next_frame_at = Instant::now() + self.frame_period();

        if self.world.random_unit() < self.world.config().fault_rate {
            return Err(HardwareError::Stream("dropped video packet".to_string()));
        }

        let captured_at = Instant::now();
        let bearing = self.world.observe(captured_at);
        Ok(Some(self.render(bearing, captured_at)))
    }

    fn start_stream(&mut self) -> HardwareResult<()> {
        if !self.world.is_connected() {
            return Err(HardwareError::NotConnected);
        }
        debug!("Simulated video stream started");
        self.world.set_streaming(true);
        self.next_frame_at = Instant::now();
        Ok(())
    }

    fn stop_stream(&mut self) -> HardwareResult<()> {
        debug!("Simulated video stream stopped");
        self.world.set_streaming(false);
        Ok(())
    }
}
