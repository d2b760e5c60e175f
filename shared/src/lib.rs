//! Shared types for the turret workspace.
//!
//! Holds the pieces both the hardware ports and the control core depend on:
//! camera frames and their newest-wins handoff, frame geometry, and the
//! detector-facing detection types.

pub mod camera_interface;
pub mod detection;
pub mod image_size;

pub use camera_interface::{Frame, FrameSlot};
pub use detection::{
    BoundingBox, Detection, DetectorError, GroundTruth, ObjectDetector, RawDetection,
};
pub use image_size::ImageSize;
