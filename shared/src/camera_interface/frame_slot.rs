//! Single-slot, newest-wins frame handoff.
//!
//! The capture thread publishes every frame it reads; the control loop takes
//! whatever is pending when it is ready for more work. A frame that has not
//! been taken by the time the next one arrives is dropped, so the consumer
//! never works through a backlog of stale images.
//!
//! The slot is guarded by a mutex and a condition variable: `try_take` sleeps
//! until a frame is published, the slot is closed, or the timeout expires.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;

use super::Frame;

/// Error type for frame slot read operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SlotReadError {
    /// No frame was published before the timeout expired
    #[error("Timeout waiting for a frame")]
    Timeout,
    /// The slot was closed; no further frames will arrive
    #[error("Frame slot closed")]
    Closed,
}

/// Result type for frame slot read operations
pub type SlotReadResult<T> = Result<T, SlotReadError>;

/// What happened to a published frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    /// The slot was empty; the frame is now pending
    Stored,
    /// An unconsumed frame was discarded in favor of this one
    Replaced,
    /// The slot is closed; the frame was dropped
    Closed,
}

#[derive(Debug, Default)]
struct SlotState {
    pending: Option<Frame>,
    closed: bool,
    published: u64,
    replaced: u64,
}

/// Capacity-1, overwrite-on-full handoff between one producer and one consumer.
#[derive(Debug, Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    readable: Condvar,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // The slot holds no invariant a panicking holder could break halfway.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a frame without blocking.
    ///
    /// Replaces (and drops) any frame still pending, then wakes the consumer.
    pub fn publish(&self, frame: Frame) -> Publish {
        let mut state = self.lock();
        if state.closed {
            return Publish::Closed;
        }

        state.published += 1;
        let outcome = match state.pending.replace(frame) {
            Some(_) => {
                state.replaced += 1;
                Publish::Replaced
            }
            None => Publish::Stored,
        };
        drop(state);

        self.readable.notify_one();
        outcome
    }

    /// Take the pending frame, waiting up to `timeout` for one to be published.
    ///
    /// # Returns
    /// * `Ok(Frame)` - The most recently published frame; the slot is now empty
    /// * `Err(SlotReadError::Timeout)` - Nothing was published in time
    /// * `Err(SlotReadError::Closed)` - The slot was closed
    pub fn try_take(&self, timeout: Duration) -> SlotReadResult<Frame> {
        let guard = self.lock();
        let (mut state, _timeout_result) = self
            .readable
            .wait_timeout_while(guard, timeout, |s| s.pending.is_none() && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);

        if state.closed {
            return Err(SlotReadError::Closed);
        }
        state.pending.take().ok_or(SlotReadError::Timeout)
    }

    /// Close the slot and wake any waiting consumer.
    ///
    /// A pending frame is discarded. Closing twice is harmless.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.pending = None;
        drop(state);
        self.readable.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Check whether a frame is waiting to be taken
    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Total frames accepted by `publish`
    pub fn published_count(&self) -> u64 {
        self.lock().published
    }

    /// Frames discarded because a newer one arrived before they were taken
    pub fn replaced_count(&self) -> u64 {
        self.lock().replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_size::ImageSize;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    fn frame(sequence: u64) -> Frame {
        Frame::blank(ImageSize::from_width_height(8, 6), sequence)
    }

    #[test]
    fn test_publish_then_take() {
        let slot = FrameSlot::new();
        assert_eq!(slot.publish(frame(1)), Publish::Stored);
        assert!(slot.has_pending());

        let taken = slot.try_take(Duration::from_millis(10)).unwrap();
        assert_eq!(taken.sequence(), 1);
        assert!(!slot.has_pending());
    }

    #[test]
    fn test_newest_frame_wins() {
        let slot = FrameSlot::new();
        assert_eq!(slot.publish(frame(1)), Publish::Stored);
        assert_eq!(slot.publish(frame(2)), Publish::Replaced);

        let taken = slot.try_take(Duration::from_millis(10)).unwrap();
        assert_eq!(taken.sequence(), 2);
        assert_eq!(slot.published_count(), 2);
        assert_eq!(slot.replaced_count(), 1);

        // The overwritten frame is gone, not queued behind the newer one
        assert_eq!(
            slot.try_take(Duration::from_millis(10)).unwrap_err(),
            SlotReadError::Timeout
        );
    }

    #[test]
    fn test_take_times_out_when_empty() {
        let slot = FrameSlot::new();
        let start = Instant::now();
        let err = slot.try_take(Duration::from_millis(30)).unwrap_err();
        assert_eq!(err, SlotReadError::Timeout);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_take_wakes_on_publish() {
        let slot = Arc::new(FrameSlot::new());
        let producer = {
            let slot = slot.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                slot.publish(frame(42));
            })
        };

        let start = Instant::now();
        let taken = slot.try_take(Duration::from_secs(5)).unwrap();
        assert_eq!(taken.sequence(), 42);
        assert!(start.elapsed() < Duration::from_secs(1));
        producer.join().unwrap();
    }

    #[test]
    fn test_close_wakes_waiter() {
        let slot = Arc::new(FrameSlot::new());
        let closer = {
            let slot = slot.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                slot.close();
            })
        };

        let start = Instant::now();
        let err = slot.try_take(Duration::from_secs(5)).unwrap_err();
        assert_eq!(err, SlotReadError::Closed);
        assert!(start.elapsed() < Duration::from_secs(1));
        closer.join().unwrap();
    }

    #[test]
    fn test_publish_after_close_is_dropped() {
        let slot = FrameSlot::new();
        slot.close();
        assert!(slot.is_closed());
        assert_eq!(slot.publish(frame(1)), Publish::Closed);
        assert!(!slot.has_pending());
        assert_eq!(slot.published_count(), 0);
    }
}
