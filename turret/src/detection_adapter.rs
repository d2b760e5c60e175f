//! Selection of the single target the turret should track.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use shared::camera_interface::Frame;
use shared::detection::{Detection, DetectorError, ObjectDetector, RawDetection};
use shared::image_size::ImageSize;
use tracing::debug;

use crate::error::FaultKind;

/// Which detector configuration is active
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Purpose-trained target model; detections may be engaged
    #[default]
    Tactical,
    /// General-purpose model; tracking only, never fires
    General,
}

impl DetectionMode {
    pub fn default_confidence_threshold(self) -> f64 {
        match self {
            DetectionMode::Tactical => 0.6,
            DetectionMode::General => 0.4,
        }
    }

    /// Whether detections in this mode drive the engagement logic
    pub fn is_lethal(self) -> bool {
        matches!(self, DetectionMode::Tactical)
    }
}

/// Wraps an [`ObjectDetector`] and reduces its output to at most one target
pub struct DetectionAdapter<D> {
    detector: D,
    mode: DetectionMode,
    threshold: f64,
}

impl<D: ObjectDetector> DetectionAdapter<D> {
    pub fn new(detector: D, mode: DetectionMode, threshold: Option<f64>) -> Self {
        Self {
            detector,
            mode,
            threshold: threshold.unwrap_or_else(|| mode.default_confidence_threshold()),
        }
    }

    pub fn mode(&self) -> DetectionMode {
        self.mode
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.threshold
    }

    /// Run the detector on `frame` and select the target.
    ///
    /// Returns the detector's wall time along with the selection. Detector
    /// failures are logged and yield no target.
    pub fn evaluate(&mut self, frame: &Frame) -> (Duration, Option<Detection>) {
        let start = Instant::now();
        let result = self.detector.detect(frame);
        let elapsed = start.elapsed();

        let selected = result.and_then(|raw| select_target(&raw, frame.size(), self.threshold));
        match selected {
            Ok(detection) => (elapsed, detection),
            Err(e) => {
                debug!(
                    fault = %FaultKind::Detection,
                    "Detection failed on frame {}: {e}",
                    frame.sequence()
                );
                (elapsed, None)
            }
        }
    }
}

/// Pick the most confident box at or above `threshold`.
///
/// Ties keep the first box encountered. Offsets are the box center relative
/// to the frame center, normalized by frame size.
pub fn select_target(
    raw: &[RawDetection],
    size: ImageSize,
    threshold: f64,
) -> Result<Option<Detection>, DetectorError> {
    let mut best: Option<&RawDetection> = None;
    for candidate in raw {
        let b = &candidate.bbox;
        if ![b.x1, b.y1, b.x2, b.y2].iter().all(|v| v.is_finite()) || b.x2 < b.x1 || b.y2 < b.y1 {
            return Err(DetectorError::MalformedOutput(format!(
                "invalid box ({}, {}, {}, {})",
                b.x1, b.y1, b.x2, b.y2
            )));
        }
        if candidate.confidence.is_nan() || candidate.confidence < threshold {
            continue;
        }
        if best.map_or(true, |current| candidate.confidence > current.confidence) {
            best = Some(candidate);
        }
    }

    Ok(best.map(|target| {
        let (cx, cy) = target.bbox.center();
        let (x, y) = size.normalized_offset(cx, cy);
        Detection::new(
            x.clamp(-0.5, 0.5),
            y.clamp(-0.5, 0.5),
            target.confidence.clamp(0.0, 1.0),
        )
        .with_bbox(target.bbox)
    }))
}
