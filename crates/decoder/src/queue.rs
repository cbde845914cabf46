//! Presentation-ordered queue of decoded frames.
//!
//! The platform decoder hands frames back in decode order, from its own
//! threads. [`FrameQueue`] keeps them sorted by presentation timestamp so the
//! consumer can always pop the earliest frame that has arrived so far.
//!
//! Insertion is a linear scan from the head. Decoders only reorder within a
//! small lookahead window, so new frames land close to the head and the scan
//! stays short.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::debug;

use vdq_common::Pts;

// ---------------------------------------------------------------------------
// Decoded frame record
// ---------------------------------------------------------------------------

/// A decoded image tagged with the presentation timestamp it was submitted with.
///
/// The record owns its image handle. Dropping the record (or calling
/// [`DecodedFrame::release`]) releases the handle back to the platform.
#[derive(Debug)]
pub struct DecodedFrame<I> {
    pts: Pts,
    image: I,
}

impl<I> DecodedFrame<I> {
    pub fn new(pts: Pts, image: I) -> Self {
        Self { pts, image }
    }

    /// Presentation timestamp.
    pub fn pts(&self) -> Pts {
        self.pts
    }

    /// Borrow the decoded image.
    pub fn image(&self) -> &I {
        &self.image
    }

    /// Take the image handle out of the record. The caller becomes
    /// responsible for releasing it.
    pub fn into_image(self) -> I {
        self.image
    }

    /// Release the image handle.
    pub fn release(self) {
        drop(self);
    }
}

// ---------------------------------------------------------------------------
// FrameQueue
// ---------------------------------------------------------------------------

/// Thread-safe queue of decoded frames in non-decreasing pts order.
///
/// Frames with equal timestamps keep their arrival order. The guard is only
/// held for the list operation itself.
pub struct FrameQueue<I> {
    frames: Mutex<VecDeque<DecodedFrame<I>>>,
}

impl<I> Default for FrameQueue<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> FrameQueue<I> {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(8)),
        }
    }

    /// Insert a frame at its presentation-order position.
    ///
    /// The frame goes after every queued frame whose pts is less than or
    /// equal to its own, and before the first one that is strictly greater.
    pub fn insert(&self, frame: DecodedFrame<I>) {
        let mut frames = self.frames.lock();

        let pos = frames
            .iter()
            .position(|queued| frame.pts < queued.pts)
            .unwrap_or(frames.len());

        frames.insert(pos, frame);
    }

    /// Remove and return the frame with the smallest pts, if any.
    pub fn pop_min(&self) -> Option<DecodedFrame<I>> {
        self.frames.lock().pop_front()
    }

    /// Timestamp of the frame [`pop_min`](Self::pop_min) would return next.
    pub fn peek_pts(&self) -> Option<Pts> {
        self.frames.lock().front().map(|frame| frame.pts)
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Remove every queued frame and release its image handle.
    ///
    /// Only used on teardown, once the platform has stopped delivering.
    /// Returns the number of frames released.
    pub fn drain_and_release(&self) -> usize {
        let drained: Vec<_> = self.frames.lock().drain(..).collect();
        let released = drained.len();

        // Release outside the guard: image release may call back into the platform.
        for frame in drained {
            frame.release();
        }

        if released > 0 {
            debug!(released, "Released queued frames on drain");
        }
        released
    }
}

impl<I> std::fmt::Debug for FrameQueue<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let frames = self.frames.lock();
        f.debug_struct("FrameQueue")
            .field("len", &frames.len())
            .field("head_pts", &frames.front().map(|frame| frame.pts))
            .finish()
    }
}
