//! The beam itself: the public `Beam` type and its operations.
//!
//! Split the way the grounding corpus splits a channel's sender/receiver
//! halves into separate files even though both sides share one struct: each
//! file here owns one concern (admission, draining, teardown) as a further
//! `impl Beam` block, all operating on the single [`state::BeamState`] behind
//! one lock.

mod lifecycle;
mod receive;
mod send;
mod state;

use std::cell::UnsafeCell;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::arena::{Arena, HookId};
use crate::config::{BeamConfig, Owner};
use crate::lock::{LockProvider, OwnedLock};
use state::BeamState;

pub use receive::Received;

/// Whether a `send`/`receive`/`wait_empty` call may suspend the calling
/// thread when it cannot make progress immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    Blocking,
    NonBlocking,
}

type ConsumedCallback = Box<dyn Fn(u64) + Send + Sync>;
type ProducedCallback = Box<dyn Fn(u64) + Send + Sync>;
type FileBeamCallback = Box<dyn Fn(&std::fs::File) -> bool + Send + Sync>;

/// The bucket beam: a thread-safe, bounded, one-directional pipe moving
/// chunks from a producer thread to a consumer thread.
///
/// State lives in an `UnsafeCell` and is only ever touched while the guard
/// returned by `lock_provider`'s current [`LockProvider`] is held — see
/// [`crate::lock`] for why that's sound despite `Beam` being `Send + Sync`.
pub struct Beam {
    lock_provider: Mutex<Arc<dyn LockProvider>>,
    state: UnsafeCell<BeamState>,
    own_arena: Arena,
    own_arena_hook: Mutex<Option<HookId>>,
    self_weak: Mutex<Weak<Beam>>,
    consumed_cb: Mutex<Option<ConsumedCallback>>,
    produced_cb: Mutex<Option<ProducedCallback>>,
    file_beam_cb: Mutex<Option<FileBeamCallback>>,
}

// SAFETY: every access to `state` happens only while the guard from
// `lock_provider`'s current `LockProvider` is held (see `with_lock` below),
// which is exactly the external-mutex discipline `LockProvider` documents.
unsafe impl Send for Beam {}
unsafe impl Sync for Beam {}

impl Beam {
    /// Creates a beam with its own private lock, born from `own_arena`.
    ///
    /// `own_arena`'s pre-cleanup unconditionally runs `destroy`, regardless
    /// of `owner` — `owner` only decides which *other* arena is merely
    /// monitored.
    pub fn create(own_arena: Arena, config: BeamConfig) -> Arc<Beam> {
        Self::create_with_lock(own_arena, config, Arc::new(OwnedLock::new()))
    }

    /// As [`Beam::create`], but sharing an externally supplied lock — the
    /// connection-granularity case multiple beams coordinate through.
    #[allow(clippy::needless_pass_by_value)]
    pub fn create_with_lock(own_arena: Arena, config: BeamConfig, lock: Arc<dyn LockProvider>) -> Arc<Beam> {
        let beam = Arc::new(Beam {
            lock_provider: Mutex::new(lock),
            state: UnsafeCell::new(BeamState::new(config)),
            own_arena: own_arena.clone(),
            own_arena_hook: Mutex::new(None),
            self_weak: Mutex::new(Weak::new()),
            consumed_cb: Mutex::new(None),
            produced_cb: Mutex::new(None),
            file_beam_cb: Mutex::new(None),
        });

        let weak = Arc::downgrade(&beam);
        *beam.self_weak.lock().unwrap() = weak.clone();

        let hook = own_arena.register_pre_cleanup(move || {
            if let Some(beam) = weak.upgrade() {
                beam.destroy();
            }
        });
        *beam.own_arena_hook.lock().unwrap() = Some(hook);
        beam
    }

    /// Re-points the non-owner-side monitor hook at `arena` if it has
    /// changed since the last call, running `on_death` (full producer
    /// cleanup, or a lighter consumer-side clear) when that arena dies
    /// before this beam does. Called with the beam's lock already held.
    fn rebind_monitor(&self, state: &mut BeamState, arena: &Arena) {
        if let Some((current, _)) = &state.monitor_hook {
            if current.same_arena(arena) {
                return;
            }
        }
        if let Some((old_arena, old_hook)) = state.monitor_hook.take() {
            old_arena.kill_pre_cleanup(old_hook);
        }
        let weak = self.self_weak.lock().unwrap().clone();
        let hook = arena.register_pre_cleanup(move || {
            if let Some(beam) = weak.upgrade() {
                beam.on_monitored_arena_death();
            }
        });
        state.monitor_hook = Some((arena.clone(), hook));
    }

    /// The non-owner arena died before this beam's own arena did. Runs the
    /// side-appropriate cleanup inline, since the thread that normally would
    /// have run it is gone.
    fn on_monitored_arena_death(&self) {
        let owner = self.owner();
        self.with_state(|s| match owner {
            Owner::Producer => {
                s.recv_buffer = crate::queue::Brigade::new();
                s.detach_all_proxies();
            }
            Owner::Consumer => {
                s.producer_cleanup();
            }
        });
        let provider = self.lock_provider.lock().unwrap().clone();
        if let Some(cv) = provider.condvar() {
            cv.notify_all();
        }
    }

    /// Replaces the lock backing this beam — the `set-mutex` operation,
    /// used to move a beam from a private lock onto a shared one.
    pub fn set_mutex(&self, lock: Arc<dyn LockProvider>) {
        *self.lock_provider.lock().unwrap() = lock;
    }

    pub fn set_buffer_size(&self, max_buf_size: usize) {
        self.with_state(|s| s.config.max_buf_size = max_buf_size);
    }

    pub fn get_buffer_size(&self) -> usize {
        self.with_state(|s| s.config.max_buf_size)
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.with_state(|s| s.config.timeout = timeout);
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.with_state(|s| s.config.timeout)
    }

    pub fn on_consumed(&self, cb: impl Fn(u64) + Send + Sync + 'static) {
        *self.consumed_cb.lock().unwrap() = Some(Box::new(cb));
    }

    pub fn on_produced(&self, cb: impl Fn(u64) + Send + Sync + 'static) {
        *self.produced_cb.lock().unwrap() = Some(Box::new(cb));
    }

    pub fn on_file_beam(&self, cb: impl Fn(&std::fs::File) -> bool + Send + Sync + 'static) {
        *self.file_beam_cb.lock().unwrap() = Some(Box::new(cb));
    }

    pub fn get_buffered(&self) -> usize {
        self.with_state(|s| s.buffered())
    }

    /// Approximate memory footprint: buffered bytes plus the carry-over
    /// `recv_buffer`. File and metadata chunks cost nothing extra.
    pub fn get_mem_used(&self) -> usize {
        self.with_state(|s| {
            s.buffered()
                + s.recv_buffer
                    .iter()
                    .filter_map(crate::queue::Delivered::len)
                    .sum::<usize>()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.with_state(|s| s.is_empty_of_work())
    }

    pub fn holds_proxies(&self) -> bool {
        self.with_state(|s| s.holds_proxies())
    }

    pub fn was_received(&self) -> bool {
        self.with_state(|s| s.received_bytes > 0)
    }

    pub fn get_files_beamed(&self) -> u64 {
        self.with_state(|s| s.files_beamed)
    }

    pub fn owner(&self) -> Owner {
        self.with_state(|s| s.config.owner)
    }

    /// Runs `f` with exclusive access to the beam's state, under whichever
    /// lock currently backs this beam.
    fn with_state<R>(&self, f: impl FnOnce(&mut BeamState) -> R) -> R {
        let provider = self.lock_provider.lock().unwrap().clone();
        let _guard = provider.lock();
        // SAFETY: `_guard` proves exclusive access for as long as it lives.
        let state = unsafe { &mut *self.state.get() };
        f(state)
    }

    fn fire_produced(&self, delta: u64) {
        if delta > 0 {
            if let Some(cb) = self.produced_cb.lock().unwrap().as_ref() {
                cb(delta);
            }
        }
    }

    fn fire_consumed(&self, delta: u64) {
        if delta > 0 {
            if let Some(cb) = self.consumed_cb.lock().unwrap().as_ref() {
                cb(delta);
            }
        }
    }

    fn authorize_file_beam(&self, file: &std::fs::File) -> bool {
        match self.file_beam_cb.lock().unwrap().as_ref() {
            Some(cb) => cb(file),
            None => false,
        }
    }
}
