//! Color-blob detector for simulated frames.
//!
//! Stands in for the neural detector when running against the simulator:
//! pixels close to the target color are grouped into one axis-aligned
//! bounding box, and the fill ratio of that box serves as confidence.

use std::f64::consts::FRAC_PI_4;

use shared::camera_interface::Frame;
use shared::detection::{BoundingBox, DetectorError, ObjectDetector, RawDetection};

use super::camera::TARGET_COLOR;

/// Per-channel tolerance when matching the target color
const COLOR_TOLERANCE: i16 = 40;

/// Smallest blob reported as a detection, in pixels
const MIN_BLOB_PIXELS: usize = 4;

/// Detects the simulator's red target disc.
#[derive(Debug, Default)]
pub struct BlobDetector {
    frames_without_target: u64,
}

impl BlobDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consecutive frames processed without finding the target
    pub fn frames_without_target(&self) -> u64 {
        self.frames_without_target
    }

    fn matches_target(rgb: [u8; 3]) -> bool {
        rgb.iter()
            .zip(TARGET_COLOR.iter())
            .all(|(&p, &t)| (p as i16 - t as i16).abs() <= COLOR_TOLERANCE)
    }
}

impl ObjectDetector for BlobDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, DetectorError> {
        let pixels = frame.pixels();
        if pixels.dim().2 != 3 {
            return Err(DetectorError::MalformedOutput(format!(
                "expected RGB frame, got {} channels",
                pixels.dim().2
            )));
        }

        // Inclusive pixel bounds, grown as matching pixels are found
        let mut min = (usize::MAX, usize::MAX);
        let mut max = (0usize, 0usize);
        let mut count = 0usize;

        for ((row, col), rgb) in pixels
            .lanes(ndarray::Axis(2))
            .into_iter()
            .enumerate()
            .map(|(i, lane)| ((i / frame.width(), i % frame.width()), lane))
        {
            if Self::matches_target([rgb[0], rgb[1], rgb[2]]) {
                min = (min.0.min(row), min.1.min(col));
                max = (max.0.max(row), max.1.max(col));
                count += 1;
            }
        }

        if count < MIN_BLOB_PIXELS {
            self.frames_without_target += 1;
            return Ok(Vec::new());
        }
        self.frames_without_target = 0;

        let bbox = BoundingBox::new(
            min.1 as f64,
            min.0 as f64,
            (max.1 + 1) as f64,
            (max.0 + 1) as f64,
        );
        // A disc fills pi/4 of its bounding square
        let fill = count as f64 / bbox.area();
        let confidence = (fill / FRAC_PI_4).min(1.0);

        Ok(vec![RawDetection::new(bbox, confidence, 0)])
    }
}
