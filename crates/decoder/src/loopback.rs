//! Software loopback implementation of [`PlatformDecoder`].
//!
//! `LoopbackDecoder` behaves like an asynchronous hardware decoder without
//! decoding anything: each submitted bitstream is handed to a pool of
//! callback threads through a crossbeam channel, wrapped into a
//! [`LoopbackImage`], and reported to the session's sink from that thread.
//! Frames therefore come back in decode order, on foreign threads, which is
//! exactly what the session has to cope with on real hardware.
//!
//! An empty bitstream produces a callback with no image and
//! `DECODER_FAILED`, mirroring how hardware decoders report a bad frame.

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use vdq_common::{
    LockError, OsStatus, PixelFormat, PlatformConfig, DECODER_CONFIGURATION_ERR, DECODER_FAILED,
    DECODER_NO_ERR,
};

use crate::lock::{LockManager, PlatformLock};
use crate::platform::{DecodedImage, PlatformDecoder, SubmitToken};
use crate::session::FrameSink;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Behaviour knobs for the loopback decoder.
#[derive(Clone, Debug)]
pub struct LoopbackConfig {
    /// Number of threads delivering callbacks (at least 1).
    pub callback_threads: usize,
    /// Pixel format reported for every image.
    pub output_format: PixelFormat,
    /// Simulated per-frame decode latency.
    pub latency: Duration,
    /// Hold the registered platform lock around every callback, serializing
    /// delivery across callback threads.
    pub serialize_callbacks: bool,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            callback_threads: 1,
            output_format: PixelFormat::Uyvy422,
            latency: Duration::ZERO,
            serialize_callbacks: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// A "decoded" image: the submitted bitstream, shared by reference count.
#[derive(Clone)]
pub struct LoopbackImage {
    format: PixelFormat,
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl LoopbackImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The bytes that were submitted for this frame.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bytes a full frame of this image's format and size would occupy.
    pub fn frame_size(&self) -> usize {
        self.format.frame_size(self.width, self.height)
    }

    /// Number of live retains of the underlying buffer.
    pub fn retain_count(&self) -> usize {
        Arc::strong_count(&self.data)
    }
}

impl DecodedImage for LoopbackImage {
    fn pixel_format(&self) -> PixelFormat {
        self.format
    }
}

impl fmt::Debug for LoopbackImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackImage")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.data.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

struct DecodeJob {
    bitstream: Arc<[u8]>,
    token: SubmitToken,
}

/// A live loopback decoder instance.
pub struct LoopbackHandle {
    jobs: Option<Sender<DecodeJob>>,
    workers: Vec<JoinHandle<()>>,
}

impl fmt::Debug for LoopbackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackHandle")
            .field("workers", &self.workers.len())
            .field("open", &self.jobs.is_some())
            .finish()
    }
}

/// Software stand-in for an asynchronous platform decoder.
pub struct LoopbackDecoder {
    config: LoopbackConfig,
    lock_manager: Mutex<Option<Arc<dyn LockManager>>>,
}

impl fmt::Debug for LoopbackDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackDecoder")
            .field("config", &self.config)
            .field("lock_manager", &self.lock_manager.lock().is_some())
            .finish()
    }
}

impl Default for LoopbackDecoder {
    fn default() -> Self {
        Self::new(LoopbackConfig::default())
    }
}

impl LoopbackDecoder {
    pub fn new(config: LoopbackConfig) -> Self {
        Self {
            config,
            lock_manager: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LoopbackConfig {
        &self.config
    }
}

impl PlatformDecoder for LoopbackDecoder {
    type Handle = LoopbackHandle;
    type Image = LoopbackImage;

    fn register_lock_manager(&self, manager: Arc<dyn LockManager>) -> Result<(), LockError> {
        let mut registered = self.lock_manager.lock();
        match registered.as_ref() {
            Some(existing) if Arc::ptr_eq(existing, &manager) => Ok(()),
            Some(_) => Err(LockError::Registration(
                "a different lock manager is already registered".to_string(),
            )),
            None => {
                debug!("Lock manager registered with loopback decoder");
                *registered = Some(manager);
                Ok(())
            }
        }
    }

    fn create(
        &self,
        config: &PlatformConfig,
        sink: FrameSink<LoopbackImage>,
    ) -> Result<LoopbackHandle, OsStatus> {
        if config.width <= 0 || config.height <= 0 {
            warn!(width = config.width, height = config.height, "Rejecting loopback config");
            return Err(DECODER_CONFIGURATION_ERR);
        }

        let lock: Option<Arc<dyn PlatformLock>> = if self.config.serialize_callbacks {
            let manager = self.lock_manager.lock().clone().ok_or(DECODER_CONFIGURATION_ERR)?;
            let lock = manager.create_lock().map_err(|e| {
                warn!(error = %e, "Failed to create platform lock");
                DECODER_FAILED
            })?;
            Some(Arc::from(lock))
        } else {
            None
        };

        let (tx, rx) = channel::unbounded::<DecodeJob>();
        let threads = self.config.callback_threads.max(1);
        let mut workers = Vec::with_capacity(threads);

        for index in 0..threads {
            let worker = Worker {
                jobs: rx.clone(),
                sink: sink.clone(),
                lock: lock.clone(),
                format: self.config.output_format,
                width: config.width as u32,
                height: config.height as u32,
                latency: self.config.latency,
            };
            let spawned = std::thread::Builder::new()
                .name(format!("loopback-decode-{index}"))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    warn!(error = %e, "Failed to spawn loopback callback thread");
                    drop(tx);
                    for handle in workers {
                        if handle.join().is_err() {
                            warn!("Loopback callback thread panicked");
                        }
                    }
                    return Err(DECODER_FAILED);
                }
            }
        }

        info!(
            width = config.width,
            height = config.height,
            source = %config.source_format,
            threads,
            frame_bytes = self
                .config
                .output_format
                .frame_size(config.width as u32, config.height as u32),
            serialized = lock.is_some(),
            "Loopback decoder created"
        );

        Ok(LoopbackHandle {
            jobs: Some(tx),
            workers,
        })
    }

    fn decode(
        &self,
        handle: &mut LoopbackHandle,
        bitstream: &[u8],
        token: SubmitToken,
    ) -> Result<(), OsStatus> {
        let jobs = handle.jobs.as_ref().ok_or(DECODER_FAILED)?;
        jobs.send(DecodeJob {
            bitstream: Arc::from(bitstream),
            token,
        })
        .map_err(|_| DECODER_FAILED)
    }

    fn destroy(&self, mut handle: LoopbackHandle) -> Result<(), OsStatus> {
        // Closing the channel lets workers finish queued jobs and exit.
        handle.jobs.take();

        let mut status = DECODER_NO_ERR;
        for worker in handle.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Loopback callback thread panicked");
                status = DECODER_FAILED;
            }
        }

        debug!("Loopback decoder destroyed");
        vdq_common::check_status(status)
    }
}

// ---------------------------------------------------------------------------
// Callback threads
// ---------------------------------------------------------------------------

struct Worker {
    jobs: Receiver<DecodeJob>,
    sink: FrameSink<LoopbackImage>,
    lock: Option<Arc<dyn PlatformLock>>,
    format: PixelFormat,
    width: u32,
    height: u32,
    latency: Duration,
}

impl Worker {
    fn run(self) {
        for job in self.jobs.iter() {
            if !self.latency.is_zero() {
                std::thread::sleep(self.latency);
            }

            let image = (!job.bitstream.is_empty()).then(|| LoopbackImage {
                format: self.format,
                width: self.width,
                height: self.height,
                data: job.bitstream,
            });
            let status = if image.is_some() {
                DECODER_NO_ERR
            } else {
                DECODER_FAILED
            };

            if let Some(lock) = &self.lock {
                if let Err(e) = lock.obtain() {
                    // The submission still gets its callback, reported as failed.
                    warn!(error = %e, "Failed to obtain platform lock");
                    self.sink
                        .on_frame_ready(Some(&job.token), None, DECODER_FAILED, 0);
                    continue;
                }
            }

            self.sink
                .on_frame_ready(Some(&job.token), image.as_ref(), status, 0);

            if let Some(lock) = &self.lock {
                if let Err(e) = lock.release() {
                    warn!(error = %e, "Failed to release platform lock");
                }
            }
            // Our own reference to the image is released here.
        }
    }
}
