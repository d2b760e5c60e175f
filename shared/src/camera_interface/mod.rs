//! Camera frame types and the frame handoff between capture and control.

pub mod frame_slot;

pub use frame_slot::{FrameSlot, Publish, SlotReadError, SlotReadResult};

use std::time::Instant;

use ndarray::{Array3, ArrayView3, ArrayViewMut3};

use crate::image_size::{ImageSize, CHANNELS};

/// A single camera image.
///
/// Pixels are stored as an RGB array of shape (height, width, 3). A frame is
/// owned by exactly one side at a time: the capture thread while it is being
/// produced, the control loop once it has been taken from the [`FrameSlot`].
#[derive(Debug, Clone)]
pub struct Frame {
    pixels: Array3<u8>,
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    /// Wrap a pixel array captured at `captured_at`.
    ///
    /// # Panics
    /// Panics if the array does not have exactly 3 channels.
    pub fn new(pixels: Array3<u8>, sequence: u64, captured_at: Instant) -> Self {
        assert_eq!(
            pixels.dim().2,
            CHANNELS,
            "Frame pixels must be RGB (height, width, 3)"
        );
        Self {
            pixels,
            sequence,
            captured_at,
        }
    }

    /// Create a black frame of the given size, stamped now.
    pub fn blank(size: ImageSize, sequence: u64) -> Self {
        Self::new(size.empty_rgb(), sequence, Instant::now())
    }

    /// Frame width in pixels
    pub fn width(&self) -> usize {
        self.pixels.dim().1
    }

    /// Frame height in pixels
    pub fn height(&self) -> usize {
        self.pixels.dim().0
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::from_width_height(self.width(), self.height())
    }

    /// Monotonic sequence number assigned by the camera.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn pixels(&self) -> ArrayView3<'_, u8> {
        self.pixels.view()
    }

    pub fn pixels_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        self.pixels.view_mut()
    }
}
