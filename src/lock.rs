//! Lock injection.
//!
//! The beam does not own its mutex outright: many beams on the same HTTP/2
//! connection can share one [`LockProvider`] for connection-level granularity
//! instead of a per-stream mutex. The trait returns a `MutexGuard<'_, ()>` as a
//! pure exclusivity token — the beam's actual state lives in an `UnsafeCell`
//! next to it and is only ever touched while this guard is alive, the same
//! single-writer discipline the ring buffer's producer/consumer-owned fields use.
//!
//! When no condition variable is configured (`condvar()` returns `None`), a
//! blocking call degrades to its non-blocking behavior rather than hanging
//! forever.

use std::sync::{Condvar, Mutex, MutexGuard};

pub trait LockProvider: Send + Sync + std::fmt::Debug {
    /// Acquires the shared lock token. Blocks the calling thread until available.
    fn lock(&self) -> MutexGuard<'_, ()>;

    /// The condition variable paired with this lock, if blocking waits are supported.
    fn condvar(&self) -> Option<&Condvar>;
}

/// The default lock: a private mutex and condvar, not shared with any other beam.
#[derive(Debug, Default)]
pub struct OwnedLock {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl OwnedLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockProvider for OwnedLock {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn condvar(&self) -> Option<&Condvar> {
        Some(&self.condvar)
    }
}

/// The null-object lock strategy: single-threaded use, no condition variable.
///
/// Still backed by a real (uncontended) `Mutex<()>` so the same guard-based
/// access discipline applies uniformly; the only behavioral difference from
/// [`OwnedLock`] is that `condvar()` returns `None`, which forces blocking
/// callers onto the non-blocking path.
#[derive(Debug, Default)]
pub struct NullLock {
    mutex: Mutex<()>,
}

impl NullLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockProvider for NullLock {
    fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn condvar(&self) -> Option<&Condvar> {
        None
    }
}
