use bytes::Bytes;

use crate::arena::Arena;
use crate::chunk::Chunk;
use crate::config::Owner;
use crate::error::{BeamError, Result};
use crate::proxy::BeamBackend;
use crate::queue::Brigade;

use super::{BlockMode, Beam};

impl Beam {
    /// Idempotent. Marks the stream closed, drains `purge`, and reports any
    /// outstanding consumed-bytes delta. Leaves `send` untouched — already
    /// admitted content is still deliverable.
    pub fn close(&self) {
        let provider = self.lock_provider.lock().unwrap().clone();
        let guard = provider.lock();
        let state = unsafe { &mut *self.state.get() };
        state.closed = true;
        state.drain_purge();
        let delta = state.received_bytes - state.reported_consumed_bytes;
        state.reported_consumed_bytes = state.received_bytes;
        drop(guard);
        self.fire_consumed(delta);
        if let Some(cv) = provider.condvar() {
            cv.notify_all();
        }
    }

    /// Idempotent. Marks the stream aborted, drains `purge`, and discards
    /// `send` outright — safe because only the producer thread is expected
    /// to call `abort`. Subsequent `send`/`receive` calls fail with
    /// [`BeamError::ConnectionAborted`].
    pub fn abort(&self) {
        let provider = self.lock_provider.lock().unwrap().clone();
        let guard = provider.lock();
        let state = unsafe { &mut *self.state.get() };
        state.aborted = true;
        state.drain_purge();
        state.send.clear();
        let delta = state.received_bytes - state.reported_consumed_bytes;
        state.reported_consumed_bytes = state.received_bytes;
        drop(guard);
        self.fire_consumed(delta);
        if let Some(cv) = provider.condvar() {
            cv.notify_all();
        }
    }

    /// Blocks until `send` is empty and no proxy is outstanding, or returns
    /// [`BeamError::Again`] immediately in non-blocking mode.
    pub fn wait_empty(&self, block: BlockMode) -> Result<()> {
        let provider = self.lock_provider.lock().unwrap().clone();
        let mut guard = Some(provider.lock());
        let deadline = {
            let state = unsafe { &*self.state.get() };
            state.config.timeout.map(|t| std::time::Instant::now() + t)
        };

        loop {
            // SAFETY: re-derived every iteration rather than carried across
            // the suspension point below, matching `with_state`'s pattern.
            let state = unsafe { &mut *self.state.get() };

            if state.aborted {
                return Err(BeamError::ConnectionAborted);
            }
            if state.send.is_empty() && !state.holds_proxies() {
                return Ok(());
            }
            match block {
                BlockMode::NonBlocking => return Err(BeamError::Again),
                BlockMode::Blocking => {
                    let Some(cv) = provider.condvar() else {
                        return Err(BeamError::Again);
                    };
                    let owned = guard.take().expect("guard held while state is accessed");
                    let (new_guard, timed_out) = match deadline {
                        Some(d) => {
                            let remaining = d.saturating_duration_since(std::time::Instant::now());
                            let (g, wr) = cv.wait_timeout(owned, remaining).unwrap();
                            (g, wr.timed_out())
                        }
                        None => (cv.wait(owned).unwrap(), false),
                    };
                    guard = Some(new_guard);
                    if timed_out {
                        return Err(BeamError::TimedOut);
                    }
                }
            }
        }
    }

    /// Idempotent. Unregisters this beam's arena hooks, then runs the
    /// owner-appropriate teardown: the producer side's half always runs; the
    /// consumer side additionally asserts nothing producer-owned survived.
    pub fn destroy(&self) {
        if let Some(hook) = self.own_arena_hook.lock().unwrap().take() {
            self.own_arena.kill_pre_cleanup(hook);
        }

        let provider = self.lock_provider.lock().unwrap().clone();
        let guard = provider.lock();
        let state = unsafe { &mut *self.state.get() };
        if state.destroyed {
            return;
        }
        state.destroyed = true;

        if let Some((arena, hook)) = state.monitor_hook.take() {
            arena.kill_pre_cleanup(hook);
        }

        match state.config.owner {
            Owner::Producer => {
                state.producer_cleanup();
                state.recv_buffer = Brigade::new();
            }
            Owner::Consumer => {
                state.recv_buffer = Brigade::new();
                state.producer_cleanup();
                debug_assert!(state.live_proxies.is_empty());
                debug_assert!(state.send.is_empty() && state.hold.is_empty() && state.purge.is_empty());
            }
        }
        drop(guard);
        if let Some(cv) = provider.condvar() {
            cv.notify_all();
        }
    }
}

impl BeamBackend for Beam {
    fn read_window(&self, source_id: u64, start: usize, len: usize) -> Result<Bytes> {
        let provider = self.lock_provider.lock().unwrap().clone();
        let _guard = provider.lock();
        let state = unsafe { &*self.state.get() };
        let held = state
            .hold
            .iter()
            .find(|h| h.id == source_id)
            .ok_or(BeamError::ConnectionReset)?;
        match &held.chunk {
            Chunk::Bytes(b) => Ok(b.slice(start..start + len)),
            Chunk::File(_) | Chunk::Meta(_) => Err(BeamError::ConnectionReset),
        }
    }

    fn proxy_dropped(&self, proxy_id: u64, source_id: Option<u64>) {
        let provider = self.lock_provider.lock().unwrap().clone();
        let guard = provider.lock();
        let state = unsafe { &mut *self.state.get() };

        state.live_proxies.remove(&proxy_id);
        if let Some(sid) = source_id {
            let found = state.sweep_hold_for_source(sid);
            if !found {
                tracing::warn!(proxy_id, source_id = sid, "emitted chunk not found in hold queue");
                debug_assert!(found, "emitted chunk not found in hold queue");
            }
        }

        let producer_alive = state.send_arena.as_ref().is_none_or(Arena::is_alive);
        if !producer_alive {
            state.drain_purge();
        }
        drop(guard);
        if producer_alive {
            if let Some(cv) = provider.condvar() {
                cv.notify_all();
            }
        }
    }
}
