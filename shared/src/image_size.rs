//! Frame dimensions and pixel/offset conversions

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of color channels in a camera frame (RGB).
pub const CHANNELS: usize = 3;

/// Frame dimensions
///
/// Represents the width and height of a camera frame. Pixel arrays use the
/// row-major convention: rows (height) come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    /// Frame width in pixels
    pub width: usize,
    /// Frame height in pixels
    pub height: usize,
}

impl ImageSize {
    /// Create a new ImageSize
    pub fn from_width_height(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Create a black RGB array with this size, shape (height, width, 3)
    pub fn empty_rgb(&self) -> Array3<u8> {
        Array3::zeros((self.height, self.width, CHANNELS))
    }

    /// Get total number of pixels
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Frame center in pixel coordinates (x, y)
    pub fn center(&self) -> (f64, f64) {
        (self.width as f64 / 2.0, self.height as f64 / 2.0)
    }

    /// Convert a pixel position into an offset from the frame center,
    /// normalized by the frame dimensions.
    ///
    /// A point on the frame edge maps to ±0.5; the center maps to (0, 0).
    /// Positive x is right of center, positive y is below center.
    pub fn normalized_offset(&self, x: f64, y: f64) -> (f64, f64) {
        let (cx, cy) = self.center();
        (
            (x - cx) / self.width as f64,
            (y - cy) / self.height as f64,
        )
    }

    /// Inverse of [`normalized_offset`](Self::normalized_offset).
    pub fn pixel_from_offset(&self, x_offset: f64, y_offset: f64) -> (f64, f64) {
        let (cx, cy) = self.center();
        (
            cx + x_offset * self.width as f64,
            cy + y_offset * self.height as f64,
        )
    }

    /// Convert to tuple (width, height)
    pub fn to_tuple(&self) -> (usize, usize) {
        (self.width, self.height)
    }
}

impl From<(usize, usize)> for ImageSize {
    fn from(dimensions: (usize, usize)) -> Self {
        Self::from_width_height(dimensions.0, dimensions.1)
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
