//! Decoder session: submits frames to the platform and reorders what it returns.
//!
//! `DecoderSession` owns one platform decoder handle and the [`FrameQueue`]
//! its output lands in. The flow is:
//!
//! 1. The consumer calls [`DecoderSession::submit`] with a compressed frame
//!    and the pts it should be displayed at. The pts travels with the
//!    submission as a [`SubmitToken`].
//! 2. The platform decodes asynchronously and calls
//!    [`FrameSink::on_frame_ready`] from its own thread, in decode order.
//! 3. The sink retains the image and inserts it into the queue in pts order.
//! 4. The consumer calls [`DecoderSession::pop`] to take the earliest frame
//!    that has arrived. `pop` never waits; pacing against decode latency is
//!    the consumer's job.
//!
//! ## Lifecycle
//!
//! `Uninitialized → Created → Destroyed`. `submit` and `pop` only work in
//! `Created`. `destroy` is terminal: it tears down the platform handle, then
//! releases every frame still queued.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use vdq_common::{
    status_name, DecodeError, DecodeResult, DecoderConfig, OsStatus, PixelFormat, Pts,
    DECODER_NO_ERR,
};

use crate::lock::LockManager;
use crate::platform::{DecodedImage, PlatformDecoder, SubmitToken};
use crate::queue::{DecodedFrame, FrameQueue};

// ---------------------------------------------------------------------------
// Shared state for platform callbacks
// ---------------------------------------------------------------------------

/// State shared between the platform's callback threads and the session.
struct SinkState<I> {
    /// Frames waiting for the consumer, in pts order.
    queue: FrameQueue<I>,
    /// Images in any other format are dropped.
    expected_format: PixelFormat,
    /// Cleared once the platform handle is destroyed; late deliveries are dropped.
    accepting: AtomicBool,
    /// Frames inserted into the queue.
    frames_queued: AtomicU64,
    /// Deliveries dropped (absent image, wrong format, or after teardown).
    frames_dropped: AtomicU64,
}

/// Callback target registered with the platform decoder.
///
/// Cloning is cheap; every clone feeds the same session queue.
pub struct FrameSink<I> {
    state: Arc<SinkState<I>>,
}

impl<I> Clone for FrameSink<I> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<I> fmt::Debug for FrameSink<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSink")
            .field("expected_format", &self.state.expected_format)
            .field("accepting", &self.state.accepting.load(Ordering::Relaxed))
            .field("queue", &self.state.queue)
            .finish()
    }
}

impl<I: DecodedImage> FrameSink<I> {
    fn new(expected_format: PixelFormat) -> Self {
        Self {
            state: Arc::new(SinkState {
                queue: FrameQueue::new(),
                expected_format,
                accepting: AtomicBool::new(false),
                frames_queued: AtomicU64::new(0),
                frames_dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Frame-ready callback, invoked by the platform from its own threads.
    ///
    /// Deliveries without an image or in a format other than the session's
    /// are dropped silently. A missing token files the frame at pts 0.
    /// `status` and `flags` are informational only.
    pub fn on_frame_ready(
        &self,
        token: Option<&SubmitToken>,
        image: Option<&I>,
        status: OsStatus,
        flags: u32,
    ) {
        let state = &*self.state;

        if !state.accepting.load(Ordering::Acquire) {
            state.frames_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(token = ?token, "Frame delivered after teardown, dropping");
            return;
        }

        let Some(image) = image else {
            state.frames_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                token = ?token,
                status,
                reason = status_name(status),
                "Frame callback without image, dropping"
            );
            return;
        };

        let format = image.pixel_format();
        if format != state.expected_format {
            state.frames_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(
                got = %format,
                expected = %state.expected_format,
                "Frame callback with unexpected pixel format, dropping"
            );
            return;
        }

        if status != DECODER_NO_ERR {
            debug!(status, flags, "Frame delivered with non-zero status");
        }

        let pts = token.map_or(0, SubmitToken::pts);
        state.queue.insert(DecodedFrame::new(pts, image.clone()));
        state.frames_queued.fetch_add(1, Ordering::Relaxed);

        debug!(
            pts,
            sequence = token.map(SubmitToken::sequence),
            queued = state.queue.len(),
            "Frame queued"
        );
    }
}

// ---------------------------------------------------------------------------
// Session state & statistics
// ---------------------------------------------------------------------------

/// Lifecycle state of a [`DecoderSession`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Created,
    Destroyed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Created => "created",
            Self::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics from a decoder session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames accepted by the platform's decode call.
    pub frames_submitted: u64,
    /// Frames the callback inserted into the queue.
    pub frames_queued: u64,
    /// Callback deliveries that were dropped.
    pub frames_dropped: u64,
    /// Frames handed to the consumer by `pop`.
    pub frames_popped: u64,
    /// Frames currently waiting in the queue.
    pub pending_frames: u64,
}

// ---------------------------------------------------------------------------
// DecoderSession
// ---------------------------------------------------------------------------

/// A platform decoder session that returns frames in presentation order.
///
/// # Thread Safety
///
/// The session is driven from a single consumer thread. The platform's
/// callback threads only touch the shared sink state, never the handle.
///
/// # Example
///
/// ```ignore
/// let locks = Arc::new(ParkingLotLockManager::new());
/// let config = DecoderConfig::new(1920, 1080, PixelFormat::Uyvy422, avcc);
/// let mut session = DecoderSession::new(platform, locks, config);
/// session.create()?;
///
/// for packet in packets_in_decode_order {
///     session.submit(&packet.data, packet.pts)?;
///     while session.pending_frames() > REORDER_WINDOW {
///         if let Some(frame) = session.pop() {
///             present(frame.image());
///             release_frame(frame);
///         }
///     }
/// }
///
/// session.destroy()?;
/// ```
pub struct DecoderSession<P: PlatformDecoder> {
    platform: P,
    /// Lock provider registered with the platform on `create`.
    locks: Arc<dyn LockManager>,
    config: DecoderConfig,
    /// Platform handle, present only while `Created`.
    handle: Option<P::Handle>,
    sink: FrameSink<P::Image>,
    state: SessionState,
    next_sequence: u64,
    frames_submitted: u64,
    frames_popped: u64,
}

impl<P: PlatformDecoder> fmt::Debug for DecoderSession<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderSession")
            .field("state", &self.state)
            .field("width", &self.config.width)
            .field("height", &self.config.height)
            .field("pixel_format", &self.config.pixel_format)
            .field("source_format", &self.config.source_format)
            .field("pending_frames", &self.sink.state.queue.len())
            .field("frames_submitted", &self.frames_submitted)
            .finish()
    }
}

impl<P: PlatformDecoder> DecoderSession<P> {
    /// Build an uninitialized session. Nothing touches the platform until
    /// [`create`](Self::create).
    pub fn new(platform: P, locks: Arc<dyn LockManager>, config: DecoderConfig) -> Self {
        let sink = FrameSink::new(config.pixel_format);
        Self {
            platform,
            locks,
            config,
            handle: None,
            sink,
            state: SessionState::Uninitialized,
            next_sequence: 0,
            frames_submitted: 0,
            frames_popped: 0,
        }
    }

    /// Register the lock provider and create the platform decoder.
    ///
    /// # Errors
    /// `InvalidState` unless the session is uninitialized, `LockManager` if
    /// the platform refuses the lock provider, `DecoderCreate` if the
    /// platform reports a non-success status. A failed create leaves the
    /// session uninitialized.
    pub fn create(&mut self) -> DecodeResult<()> {
        self.expect_state(SessionState::Uninitialized, "create")?;

        self.platform.register_lock_manager(self.locks.clone())?;

        let platform_config = self.config.platform_config();
        self.sink.state.accepting.store(true, Ordering::Release);

        match self.platform.create(&platform_config, self.sink.clone()) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.state = SessionState::Created;
                info!(
                    width = self.config.width,
                    height = self.config.height,
                    source = %self.config.source_format,
                    output = %self.config.pixel_format,
                    extradata_len = self.config.extradata.len(),
                    "Decoder session created"
                );
                Ok(())
            }
            Err(status) => {
                self.sink.state.accepting.store(false, Ordering::Release);
                warn!(status, reason = status_name(status), "Platform decoder create failed");
                Err(DecodeError::DecoderCreate { status })
            }
        }
    }

    /// Submit one compressed frame, tagged with its presentation timestamp.
    ///
    /// Returns as soon as the platform has accepted the data; the decoded
    /// frame shows up in [`pop`](Self::pop) later.
    ///
    /// # Errors
    /// `InvalidState` outside `Created`, `DecoderSubmit` if the platform
    /// rejects the frame. A rejected frame leaves the queue untouched.
    pub fn submit(&mut self, bitstream: &[u8], pts: Pts) -> DecodeResult<()> {
        self.expect_state(SessionState::Created, "submit")?;
        let Some(handle) = self.handle.as_mut() else {
            return Err(DecodeError::InvalidState {
                op: "submit",
                state: self.state.as_str(),
            });
        };

        let token = SubmitToken::new(pts, self.next_sequence);
        self.next_sequence += 1;

        self.platform
            .decode(handle, bitstream, token)
            .map_err(|status| {
                warn!(pts, status, reason = status_name(status), "Platform rejected frame");
                DecodeError::DecoderSubmit { pts, status }
            })?;

        self.frames_submitted += 1;
        debug!(pts, sequence = token.sequence(), size = bitstream.len(), "Frame submitted");
        Ok(())
    }

    /// Take the earliest queued frame, or `None` if nothing is ready.
    ///
    /// Always `None` outside `Created`. The caller owns the returned frame
    /// and releases it with [`release_frame`] (or by dropping it).
    pub fn pop(&mut self) -> Option<DecodedFrame<P::Image>> {
        if self.state != SessionState::Created {
            return None;
        }
        let frame = self.sink.state.queue.pop_min()?;
        self.frames_popped += 1;
        debug!(pts = frame.pts(), "Frame popped");
        Some(frame)
    }

    /// Timestamp of the frame `pop` would return next.
    pub fn peek_pts(&self) -> Option<Pts> {
        if self.state != SessionState::Created {
            return None;
        }
        self.sink.state.queue.peek_pts()
    }

    /// Number of decoded frames waiting in the queue.
    pub fn pending_frames(&self) -> usize {
        self.sink.state.queue.len()
    }

    /// Tear down the platform decoder and release every queued frame.
    ///
    /// Without a live handle the platform call is skipped but the queue is
    /// still drained, so calling this in any state is safe. The session ends
    /// up `Destroyed` either way.
    ///
    /// # Errors
    /// `DecoderDestroy` if the platform reports a failure. The queue has
    /// already been drained when this is returned.
    pub fn destroy(&mut self) -> DecodeResult<()> {
        let status = match self.handle.take() {
            Some(handle) => self.platform.destroy(handle).err(),
            None => None,
        };

        // The platform guarantees no callbacks after destroy returns; anything
        // still racing in is turned away here.
        self.sink.state.accepting.store(false, Ordering::Release);
        let released = self.sink.state.queue.drain_and_release();

        let previous = std::mem::replace(&mut self.state, SessionState::Destroyed);
        if previous != SessionState::Destroyed {
            let stats = self.stats();
            info!(
                frames_submitted = stats.frames_submitted,
                frames_queued = stats.frames_queued,
                frames_dropped = stats.frames_dropped,
                frames_popped = stats.frames_popped,
                released,
                "Decoder session destroyed"
            );
        }

        match status {
            Some(status) => {
                warn!(status, reason = status_name(status), "Platform decoder destroy failed");
                Err(DecodeError::DecoderDestroy { status })
            }
            None => Ok(()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Get session statistics.
    pub fn stats(&self) -> SessionStats {
        let sink = &*self.sink.state;
        SessionStats {
            frames_submitted: self.frames_submitted,
            frames_queued: sink.frames_queued.load(Ordering::Relaxed),
            frames_dropped: sink.frames_dropped.load(Ordering::Relaxed),
            frames_popped: self.frames_popped,
            pending_frames: sink.queue.len() as u64,
        }
    }

    fn expect_state(&self, expected: SessionState, op: &'static str) -> DecodeResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DecodeError::InvalidState {
                op,
                state: self.state.as_str(),
            })
        }
    }
}

impl<P: PlatformDecoder> Drop for DecoderSession<P> {
    fn drop(&mut self) {
        if self.state == SessionState::Created {
            if let Err(e) = self.destroy() {
                error!(error = %e, "Failed to destroy decoder session in Drop");
            }
        }
    }
}

/// Release a popped frame's image handle back to the platform.
pub fn release_frame<I>(frame: DecodedFrame<I>) {
    frame.release();
}
