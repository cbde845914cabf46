//! Lock capability the platform decoder uses to guard its own state.
//!
//! Hardware decode frameworks expect the host application to supply a lock
//! provider once per process. Instead of installing a global callback, the
//! provider is a [`LockManager`] handed to each
//! [`DecoderSession`](crate::session::DecoderSession), which registers it with
//! the platform on `create`. Tests can inject their own implementation.
//!
//! The four lock operations map onto the trait as follows: create is
//! [`LockManager::create_lock`], obtain and release are
//! [`PlatformLock::obtain`] / [`PlatformLock::release`], and destroy is
//! dropping the boxed lock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use vdq_common::LockError;

/// A lock created by a [`LockManager`] for use by the platform decoder.
///
/// Unlike a guard-based mutex, obtain and release are separate calls, since
/// the platform decides where its critical sections begin and end.
pub trait PlatformLock: Send + Sync {
    /// Block until the lock is held.
    fn obtain(&self) -> Result<(), LockError>;

    /// Release a lock previously obtained.
    fn release(&self) -> Result<(), LockError>;
}

/// Process-wide lock provider for the platform decoder.
pub trait LockManager: Send + Sync {
    /// Create a new, unlocked platform lock.
    fn create_lock(&self) -> Result<Box<dyn PlatformLock>, LockError>;
}

// ---------------------------------------------------------------------------
// parking_lot-backed implementation
// ---------------------------------------------------------------------------

/// Default [`LockManager`]: thread-owned locks built on `parking_lot`.
#[derive(Debug, Default)]
pub struct ParkingLotLockManager {
    created: AtomicUsize,
}

impl ParkingLotLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of locks this manager has handed out.
    pub fn locks_created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl LockManager for ParkingLotLockManager {
    fn create_lock(&self) -> Result<Box<dyn PlatformLock>, LockError> {
        let id = self.created.fetch_add(1, Ordering::Relaxed);
        trace!(lock = id, "Created platform lock");
        Ok(Box::new(ParkingLotLock::default()))
    }
}

/// Non-recursive lock owned by the thread that obtained it.
#[derive(Default)]
struct ParkingLotLock {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

impl PlatformLock for ParkingLotLock {
    fn obtain(&self) -> Result<(), LockError> {
        let current = thread::current().id();
        let mut owner = self.owner.lock();
        while let Some(holder) = *owner {
            if holder == current {
                return Err(LockError::Operation {
                    op: "obtain",
                    reason: "already held by this thread".to_string(),
                });
            }
            self.released.wait(&mut owner);
        }
        *owner = Some(current);
        Ok(())
    }

    fn release(&self) -> Result<(), LockError> {
        let mut owner = self.owner.lock();
        let holder = *owner;
        match holder {
            Some(holder) if holder == thread::current().id() => {
                *owner = None;
                drop(owner);
                self.released.notify_one();
                Ok(())
            }
            Some(_) => Err(LockError::Operation {
                op: "release",
                reason: "not held by this thread".to_string(),
            }),
            None => Err(LockError::Operation {
                op: "release",
                reason: "lock is not held".to_string(),
            }),
        }
    }
}
