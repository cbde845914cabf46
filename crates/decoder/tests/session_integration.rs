//! End-to-end tests for the decoder session.
//!
//! These drive `DecoderSession` against the loopback backend (real callback
//! threads) and against scripted platforms that deliver callbacks from a
//! foreign thread in a chosen order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use vdq_common::{
    DecodeError, DecoderConfig, LockError, OsStatus, PixelFormat, PlatformConfig, Pts,
    DECODER_NO_ERR,
};
use vdq_decoder::{
    release_frame, DecodedImage, DecoderSession, FrameSink, LockManager, LoopbackConfig,
    LoopbackDecoder, ParkingLotLockManager, PlatformDecoder, PlatformLock, SessionState,
    SubmitToken,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config() -> DecoderConfig {
    DecoderConfig::new(1280, 720, PixelFormat::Uyvy422, vec![0x01, 0x4d, 0x40, 0x1f])
}

fn loopback_session(loopback: LoopbackConfig) -> DecoderSession<LoopbackDecoder> {
    DecoderSession::new(
        LoopbackDecoder::new(loopback),
        Arc::new(ParkingLotLockManager::new()),
        config(),
    )
}

fn wait_for_callbacks<P: PlatformDecoder>(session: &DecoderSession<P>, expected: u64) {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let stats = session.stats();
        if stats.frames_queued + stats.frames_dropped >= expected {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting for callbacks: {stats:?}");
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn pop_all<P: PlatformDecoder>(session: &mut DecoderSession<P>) -> Vec<Pts> {
    let mut out = Vec::new();
    while let Some(frame) = session.pop() {
        out.push(frame.pts());
        release_frame(frame);
    }
    out
}

// ---------------------------------------------------------------------------
// Scripted platform: callbacks fire from a helper thread, in script order
// ---------------------------------------------------------------------------

/// Image handle that tracks how many retains are outstanding.
#[derive(Debug)]
struct CountedImage {
    format: PixelFormat,
    live: Arc<AtomicUsize>,
}

impl CountedImage {
    fn new(format: PixelFormat, live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self {
            format,
            live: live.clone(),
        }
    }
}

impl Clone for CountedImage {
    fn clone(&self) -> Self {
        Self::new(self.format, &self.live)
    }
}

impl Drop for CountedImage {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DecodedImage for CountedImage {
    fn pixel_format(&self) -> PixelFormat {
        self.format
    }
}

/// Collects submissions; `flush` delivers them from another thread in the
/// requested order.
#[derive(Default)]
struct ScriptedPlatform {
    sink: Mutex<Option<FrameSink<CountedImage>>>,
    pending: Mutex<Vec<SubmitToken>>,
    live_images: Arc<AtomicUsize>,
    registrations: AtomicUsize,
}

impl ScriptedPlatform {
    fn flush(&self, order: &[usize], image: impl Fn(usize) -> Option<PixelFormat> + Sync) {
        let sink = self.sink.lock().clone().expect("decoder not created");
        let tokens = self.pending.lock().clone();
        std::thread::scope(|s| {
            s.spawn(|| {
                for &i in order {
                    let image = image(i).map(|format| CountedImage::new(format, &self.live_images));
                    sink.on_frame_ready(Some(&tokens[i]), image.as_ref(), DECODER_NO_ERR, 0);
                }
            });
        });
    }
}

impl PlatformDecoder for &ScriptedPlatform {
    type Handle = ();
    type Image = CountedImage;

    fn register_lock_manager(&self, _manager: Arc<dyn LockManager>) -> Result<(), LockError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn create(&self, _config: &PlatformConfig, sink: FrameSink<CountedImage>) -> Result<(), OsStatus> {
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn decode(&self, _handle: &mut (), _bitstream: &[u8], token: SubmitToken) -> Result<(), OsStatus> {
        self.pending.lock().push(token);
        Ok(())
    }

    fn destroy(&self, _handle: ()) -> Result<(), OsStatus> {
        Ok(())
    }
}

fn scripted_session(platform: &ScriptedPlatform) -> DecoderSession<&ScriptedPlatform> {
    DecoderSession::new(platform, Arc::new(ParkingLotLockManager::new()), config())
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn reversed_callbacks_pop_in_presentation_order() {
    let platform = ScriptedPlatform::default();
    let mut session = scripted_session(&platform);
    session.create().unwrap();

    session.submit(b"bitstream-a", 100).unwrap();
    session.submit(b"bitstream-b", 50).unwrap();
    platform.flush(&[1, 0], |_| Some(PixelFormat::Uyvy422));

    assert_eq!(session.pop().map(|f| f.pts()), Some(50));
    assert_eq!(session.pop().map(|f| f.pts()), Some(100));
    assert!(session.pop().is_none());
    assert_eq!(platform.live_images.load(Ordering::SeqCst), 0);
}

#[test]
fn absent_image_leaves_queue_empty_until_valid_frame() {
    let platform = ScriptedPlatform::default();
    let mut session = scripted_session(&platform);
    session.create().unwrap();
    session.submit(b"broken", 10).unwrap();
    session.submit(b"good", 20).unwrap();

    platform.flush(&[0], |_| None);
    assert!(session.pop().is_none());
    assert_eq!(session.pending_frames(), 0);

    platform.flush(&[1], |_| Some(PixelFormat::Uyvy422));
    assert_eq!(session.pop().map(|f| f.pts()), Some(20));
}

#[test]
fn destroy_releases_every_queued_image() {
    let platform = ScriptedPlatform::default();
    let mut session = scripted_session(&platform);
    session.create().unwrap();
    for pts in 0..40 {
        session.submit(b"frame", pts).unwrap();
    }
    let order: Vec<usize> = (0..40).rev().collect();
    platform.flush(&order, |_| Some(PixelFormat::Uyvy422));

    assert_eq!(session.pending_frames(), 40);
    assert_eq!(platform.live_images.load(Ordering::SeqCst), 40);

    session.destroy().unwrap();
    assert_eq!(session.state(), SessionState::Destroyed);
    assert_eq!(session.pending_frames(), 0);
    assert_eq!(platform.live_images.load(Ordering::SeqCst), 0);
}

#[test]
fn lock_manager_is_registered_once_per_create() {
    let platform = ScriptedPlatform::default();
    let mut session = scripted_session(&platform);
    assert_eq!(platform.registrations.load(Ordering::SeqCst), 0);
    session.create().unwrap();
    assert_eq!(platform.registrations.load(Ordering::SeqCst), 1);
    assert!(matches!(session.create(), Err(DecodeError::InvalidState { .. })));
    assert_eq!(platform.registrations.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Loopback backend
// ---------------------------------------------------------------------------

#[test]
fn concurrent_callbacks_lose_no_frames() {
    const FRAMES: i64 = 256;

    let mut session = loopback_session(LoopbackConfig {
        callback_threads: 4,
        ..Default::default()
    });
    session.create().unwrap();

    let mut pts: Vec<Pts> = (0..FRAMES).map(|i| i * 1001).collect();
    pts.shuffle(&mut StdRng::seed_from_u64(7));
    for &p in &pts {
        session.submit(&p.to_le_bytes(), p).unwrap();
    }

    wait_for_callbacks(&session, FRAMES as u64);
    let popped = pop_all(&mut session);

    let expected: Vec<Pts> = (0..FRAMES).map(|i| i * 1001).collect();
    assert_eq!(popped, expected);
    assert_eq!(session.stats().frames_dropped, 0);
    session.destroy().unwrap();
}

#[test]
fn decode_order_gop_comes_out_in_display_order() {
    // I0 P3 B1 B2 P6 B4 B5, timestamps in 90 kHz ticks at 30 fps.
    let decode_order = [0, 3, 1, 2, 6, 4, 5];
    let mut session = loopback_session(LoopbackConfig {
        latency: Duration::from_micros(200),
        ..Default::default()
    });
    session.create().unwrap();

    for &index in &decode_order {
        session.submit(&[index as u8 + 1], index * 3000).unwrap();
    }
    wait_for_callbacks(&session, decode_order.len() as u64);

    let popped = pop_all(&mut session);
    assert_eq!(popped, vec![0, 3000, 6000, 9000, 12000, 15000, 18000]);
}

#[test]
fn pop_interleaved_with_delivery_is_monotonic_when_window_is_respected() {
    // Each mini-GOP is fully decoded before the consumer pops it.
    let mut session = loopback_session(LoopbackConfig {
        callback_threads: 2,
        ..Default::default()
    });
    session.create().unwrap();

    let mut all = Vec::new();
    for gop in 0..10i64 {
        let base = gop * 4;
        for offset in [0, 3, 1, 2] {
            session.submit(b"au", base + offset).unwrap();
        }
        wait_for_callbacks(&session, (gop as u64 + 1) * 4);
        all.extend(pop_all(&mut session));
    }

    assert_eq!(all, (0..40).collect::<Vec<_>>());
}

#[test]
fn session_after_destroy_rejects_work() {
    let mut session = loopback_session(LoopbackConfig::default());
    session.create().unwrap();
    session.submit(b"x", 1).unwrap();
    session.destroy().unwrap();

    assert!(session.pop().is_none());
    assert!(matches!(
        session.submit(b"y", 2),
        Err(DecodeError::InvalidState { op: "submit", state: "destroyed" })
    ));
    assert!(session.destroy().is_ok());
}

// ---------------------------------------------------------------------------
// Injected lock manager
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CountingLockManager {
    created: AtomicUsize,
    obtained: Arc<AtomicUsize>,
}

struct CountingLock {
    inner: Box<dyn PlatformLock>,
    obtained: Arc<AtomicUsize>,
}

impl PlatformLock for CountingLock {
    fn obtain(&self) -> Result<(), LockError> {
        self.inner.obtain()?;
        self.obtained.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) -> Result<(), LockError> {
        self.inner.release()
    }
}

impl LockManager for CountingLockManager {
    fn create_lock(&self) -> Result<Box<dyn PlatformLock>, LockError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingLock {
            inner: ParkingLotLockManager::new().create_lock()?,
            obtained: self.obtained.clone(),
        }))
    }
}

#[test]
fn platform_uses_injected_lock_manager() {
    let locks = Arc::new(CountingLockManager::default());
    let platform = LoopbackDecoder::new(LoopbackConfig {
        callback_threads: 2,
        serialize_callbacks: true,
        ..Default::default()
    });
    let mut session = DecoderSession::new(platform, locks.clone(), config());
    session.create().unwrap();

    for pts in [4, 2, 3, 1, 0] {
        session.submit(b"au", pts).unwrap();
    }
    wait_for_callbacks(&session, 5);
    session.destroy().unwrap();

    assert_eq!(locks.created.load(Ordering::SeqCst), 1);
    assert_eq!(locks.obtained.load(Ordering::SeqCst), 5);
}

#[test]
fn second_lock_manager_is_refused() {
    let platform = LoopbackDecoder::default();
    platform
        .register_lock_manager(Arc::new(ParkingLotLockManager::new()))
        .unwrap();
    let err = platform
        .register_lock_manager(Arc::new(ParkingLotLockManager::new()))
        .unwrap_err();
    assert!(matches!(err, LockError::Registration(_)));
}
