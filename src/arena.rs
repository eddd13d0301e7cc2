//! Minimal memory-arena model.
//!
//! A production embedding supplies a real arena/pool implementation; this module
//! provides just enough of that interface — pre-cleanup hook registration and a
//! liveness flag — for the beam to depend on, and is self-testable without an
//! external pool library (see `SPEC_FULL.md` §6a).

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_HOOK_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque token returned by [`Arena::register_pre_cleanup`], usable to cancel the
/// hook via [`Arena::kill_pre_cleanup`] before the arena dies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

type Hook = Box<dyn FnOnce() + Send>;

struct Slot {
    id: HookId,
    hook: Option<Hook>,
}

struct ArenaInner {
    id: u64,
    alive: AtomicBool,
    hooks: Mutex<Vec<Slot>>,
}

/// A reference-counted handle to a memory arena.
///
/// Cloning an `Arena` shares the same underlying pool; the pool is "destroyed"
/// exactly once via [`Arena::destroy`], which runs every still-registered
/// pre-cleanup hook in LIFO order (most arena/pool implementations, including the
/// one this design is modeled on, run cleanups in reverse registration order).
#[derive(Clone)]
pub struct Arena {
    inner: Arc<ArenaInner>,
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.inner.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ArenaInner {
                id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
                alive: AtomicBool::new(true),
                hooks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::Acquire)
    }

    /// `true` if `self` and `other` refer to the very same arena.
    pub fn same_arena(&self, other: &Arena) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Registers a callback to run when this arena's cleanup fires.
    ///
    /// Returns a [`HookId`] that can cancel the registration before the arena
    /// dies — used by beam `destroy` to disarm monitoring of an arena it no
    /// longer cares about.
    pub fn register_pre_cleanup<F>(&self, hook: F) -> HookId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = HookId(NEXT_HOOK_ID.fetch_add(1, Ordering::Relaxed));
        let mut hooks = self.inner.hooks.lock().unwrap();
        hooks.push(Slot {
            id,
            hook: Some(Box::new(hook)),
        });
        id
    }

    /// Cancels a previously registered hook; a no-op if it already ran or was
    /// already killed.
    pub fn kill_pre_cleanup(&self, id: HookId) {
        let mut hooks = self.inner.hooks.lock().unwrap();
        hooks.retain(|slot| slot.id != id);
    }

    /// Runs every still-registered hook (LIFO) and marks the arena dead.
    ///
    /// Idempotent: destroying an already-dead arena is a no-op.
    pub fn destroy(&self) {
        if self
            .inner
            .alive
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let mut hooks = std::mem::take(&mut *self.inner.hooks.lock().unwrap());
        for slot in hooks.drain(..).rev() {
            if let Some(hook) = slot.hook {
                hook();
            }
        }
    }
}
