//! Contract between a [`DecoderSession`](crate::session::DecoderSession) and
//! the platform decode service it drives.
//!
//! The platform accepts compressed frames in decode order and later, on a
//! thread it owns, reports each decoded image through the [`FrameSink`]
//! registered at creation. Every submission carries a [`SubmitToken`] that the
//! platform hands back unmodified with the result, which is how the session
//! recovers the presentation timestamp of an out-of-order completion.

use std::sync::Arc;

use vdq_common::{LockError, OsStatus, PixelFormat, PlatformConfig, Pts};

use crate::lock::LockManager;
use crate::session::FrameSink;

/// Per-submission context returned unmodified with the decoded image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SubmitToken {
    pts: Pts,
    sequence: u64,
}

impl SubmitToken {
    /// `sequence` is the submission's position in decode order.
    pub fn new(pts: Pts, sequence: u64) -> Self {
        Self { pts, sequence }
    }

    pub fn pts(&self) -> Pts {
        self.pts
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// A decoded image buffer owned by the platform.
///
/// `Clone` must retain the underlying buffer (a reference count bump, not a
/// pixel copy) and `Drop` must release it.
pub trait DecodedImage: Clone + Send + 'static {
    fn pixel_format(&self) -> PixelFormat;
}

/// A platform decode service.
///
/// `create`, `decode` and `destroy` are only called from the consumer thread.
/// The sink passed to `create` may be invoked from any thread, any number of
/// times per submission, until `destroy` returns.
pub trait PlatformDecoder {
    /// Opaque handle to one platform decoder instance.
    type Handle;
    /// Image type delivered to the sink.
    type Image: DecodedImage;

    /// Install the process-wide lock provider. Registering the same provider
    /// again must succeed without side effects.
    fn register_lock_manager(&self, manager: Arc<dyn LockManager>) -> Result<(), LockError>;

    /// Create a decoder instance that reports frames to `sink`.
    fn create(
        &self,
        config: &PlatformConfig,
        sink: FrameSink<Self::Image>,
    ) -> Result<Self::Handle, OsStatus>;

    /// Submit one compressed frame. Returns without waiting for decode.
    fn decode(
        &self,
        handle: &mut Self::Handle,
        bitstream: &[u8],
        token: SubmitToken,
    ) -> Result<(), OsStatus>;

    /// Tear down a decoder instance. No sink calls happen after this returns.
    fn destroy(&self, handle: Self::Handle) -> Result<(), OsStatus>;
}
