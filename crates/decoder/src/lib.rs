//! `vdq-decoder` — Presentation-order delivery for asynchronous hardware decoders.
//!
//! Hardware decoders take compressed frames in decode order and hand decoded
//! images back later, on their own threads, still in decode order. This crate
//! puts them back into presentation order behind a simple pull interface.
//!
//! # Architecture
//!
//! - [`queue`] — `FrameQueue`, a mutex-guarded list of frames sorted by pts
//! - [`session`] — `DecoderSession`, which owns a platform decoder handle,
//!   tags every submission with its pts, and feeds callbacks into the queue
//! - [`platform`] — the `PlatformDecoder` contract a backend implements
//! - [`lock`] — the lock capability injected into the platform
//! - [`loopback`] — a software backend that echoes submissions from its own
//!   callback threads
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use vdq_common::{DecoderConfig, PixelFormat};
//! use vdq_decoder::{DecoderSession, LoopbackDecoder, ParkingLotLockManager, release_frame};
//!
//! let config = DecoderConfig::new(1920, 1080, PixelFormat::Uyvy422, avcc);
//! let mut session = DecoderSession::new(
//!     LoopbackDecoder::default(),
//!     Arc::new(ParkingLotLockManager::new()),
//!     config,
//! );
//! session.create()?;
//! session.submit(&access_unit, pts)?;
//! if let Some(frame) = session.pop() {
//!     release_frame(frame);
//! }
//! session.destroy()?;
//! ```

pub mod lock;
pub mod loopback;
pub mod platform;
pub mod queue;
pub mod session;

// Re-export primary public types
pub use lock::{LockManager, ParkingLotLockManager, PlatformLock};
pub use loopback::{LoopbackConfig, LoopbackDecoder, LoopbackHandle, LoopbackImage};
pub use platform::{DecodedImage, PlatformDecoder, SubmitToken};
pub use queue::{DecodedFrame, FrameQueue};
pub use session::{release_frame, DecoderSession, FrameSink, SessionState, SessionStats};
