//! Detector-facing types.
//!
//! The object-detection model is an external collaborator. It is reached
//! through [`ObjectDetector`], which reports raw pixel-space boxes; the
//! control side works with the normalized [`Detection`] selected from them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::camera_interface::Frame;

/// Axis-aligned box in pixel coordinates.
///
/// `(x1, y1)` is the top-left corner and `(x2, y2)` the bottom-right corner,
/// matching the `xyxy` layout detectors usually emit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Degenerate box used when a detection carries no extent
    pub fn empty() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Box center (x, y)
    pub fn center(&self) -> (f64, f64) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Intersection-over-union with another box.
    ///
    /// Returns 0.0 when the union is empty (both boxes degenerate).
    pub fn iou(&self, other: &Self) -> f64 {
        let x_left = self.x1.max(other.x1);
        let y_top = self.y1.max(other.y1);
        let x_right = self.x2.min(other.x2);
        let y_bottom = self.y2.min(other.y2);

        let intersection = (x_right - x_left).max(0.0) * (y_bottom - y_top).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union != 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// One box as reported by the detector, before thresholding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
    pub class_id: u32,
}

impl RawDetection {
    pub fn new(bbox: BoundingBox, confidence: f64, class_id: u32) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
        }
    }
}

/// The target selected for this control iteration.
///
/// Offsets are the target center's distance from the frame center as a
/// fraction of the frame dimensions, each in [-0.5, 0.5]. Positive
/// `x_offset` is right of center, positive `y_offset` is below center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x_offset: f64,
    pub y_offset: f64,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Pixel-space box the offsets were derived from, when known
    pub bbox: Option<BoundingBox>,
}

impl Detection {
    pub fn new(x_offset: f64, y_offset: f64, confidence: f64) -> Self {
        Self {
            x_offset,
            y_offset,
            confidence,
            bbox: None,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Euclidean distance of the target from the frame center, in offset units
    pub fn offset_magnitude(&self) -> f64 {
        self.x_offset.hypot(self.y_offset)
    }
}

/// Failures reported by a detector backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    /// The inference backend itself failed
    #[error("Detector backend failed: {0}")]
    Backend(String),

    /// The backend returned output that cannot be interpreted
    #[error("Malformed detector output: {0}")]
    MalformedOutput(String),
}

/// External object-detection capability.
///
/// Implementations run inference on one frame and return every box they
/// found, in the detector's own output order. Thresholding and target
/// selection happen on the caller's side.
pub trait ObjectDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, DetectorError>;
}

impl<D: ObjectDetector + ?Sized> ObjectDetector for Box<D> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, DetectorError> {
        (**self).detect(frame)
    }
}

/// Source of reference target boxes used to score detection accuracy.
///
/// Absent in normal operation; test rigs and simulators provide one.
pub trait GroundTruth {
    fn lookup(&mut self, frame: &Frame) -> Option<BoundingBox>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bbox_geometry() {
        let bbox = BoundingBox::new(10.0, 20.0, 30.0, 60.0);
        assert_relative_eq!(bbox.width(), 20.0);
        assert_relative_eq!(bbox.height(), 40.0);
        assert_relative_eq!(bbox.area(), 800.0);
        assert_eq!(bbox.center(), (20.0, 40.0));
    }

    #[test]
    fn test_iou_identical_boxes() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert_relative_eq!(bbox.iou(&bbox), 1.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        // intersection 50, union 150
        assert_relative_eq!(a.iou(&b), 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_iou_disjoint_and_degenerate() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_relative_eq!(a.iou(&b), 0.0);
        assert_relative_eq!(BoundingBox::empty().iou(&BoundingBox::empty()), 0.0);
        assert_relative_eq!(BoundingBox::empty().iou(&a), 0.0);
    }

    #[test]
    fn test_offset_magnitude() {
        let detection = Detection::new(0.3, -0.4, 0.9);
        assert_relative_eq!(detection.offset_magnitude(), 0.5, epsilon = 1e-12);
        assert!(detection.bbox.is_none());
    }
}
