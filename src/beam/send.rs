use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use crate::arena::Arena;
use crate::chunk::{Chunk, FileChunk, Meta, PendingChunk};
use crate::config::MIN_SPLIT_SIZE;
use crate::error::{BeamError, Result};

use super::state::BeamState;
use super::{BlockMode, Beam};

impl Beam {
    /// Admits a batch of producer chunks in order, applying backpressure per
    /// chunk as needed. Binds `send_arena` to `arena` for the duration.
    ///
    /// On success, every chunk in `chunks` was admitted. Otherwise, whatever
    /// could not be admitted — the unconsumed tail of the chunk backpressure
    /// was applied to, plus every chunk after it that was never even reached
    /// — is appended to `unsent` in its original order, so the caller can
    /// resubmit it later rather than lose it. The one exception is
    /// [`BeamError::ConnectionAborted`]: every chunk from the one that
    /// observed the abort onward is instead pushed straight into `send`
    /// unexamined, to be freed by the next `purge` drain.
    pub fn send<'a>(
        &self,
        chunks: Vec<PendingChunk<'a>>,
        arena: &Arena,
        block: BlockMode,
        unsent: &mut Vec<PendingChunk<'a>>,
    ) -> Result<()> {
        let provider = self.lock_provider.lock().unwrap().clone();
        let mut guard = Some(provider.lock());

        let deadline;
        {
            let state = unsafe { &mut *self.state.get() };
            state.send_arena = Some(arena.clone());
            if state.config.owner == crate::config::Owner::Consumer {
                self.rebind_monitor(state, arena);
            }
            state.drain_purge();
            deadline = state.config.timeout.map(|t| Instant::now() + t);
        }

        let mut aborted_partway = false;
        let mut early_error: Option<BeamError> = None;

        let mut items = chunks.into_iter();
        while let Some(pending) = items.next() {
            let state = unsafe { &mut *self.state.get() };
            if state.aborted {
                aborted_partway = true;
                push_raw(state, pending)?;
                for rest in items.by_ref() {
                    let state = unsafe { &mut *self.state.get() };
                    push_raw(state, rest)?;
                }
                break;
            }

            match pending {
                PendingChunk::Meta(meta) => {
                    if matches!(meta, Meta::Eos) {
                        state.closed = true;
                    }
                    state.send.push_back(Chunk::Meta(meta));
                }
                PendingChunk::File(file) => {
                    let chunk = normalize_file(self, state, file, arena)?;
                    state.sent_bytes += chunk.len().unwrap_or(0) as u64;
                    state.buckets_sent += 1;
                    state.send.push_back(chunk);
                }
                other => {
                    let bytes = materialize_bytes(other)?;
                    match admit_with_backpressure(self, &mut guard, &provider, bytes, block, deadline) {
                        Ok(()) => {}
                        Err((BeamError::ConnectionAborted, _)) => {
                            aborted_partway = true;
                            for rest in items.by_ref() {
                                let state = unsafe { &mut *self.state.get() };
                                push_raw(state, rest)?;
                            }
                            break;
                        }
                        Err((err, leftover)) => {
                            if !leftover.is_empty() {
                                unsent.push(PendingChunk::Owned(leftover));
                            }
                            unsent.extend(items.by_ref());
                            early_error = Some(err);
                            break;
                        }
                    }
                }
            }
        }

        let state = unsafe { &mut *self.state.get() };
        let delta = state.sent_bytes - state.reported_produced_bytes;
        state.reported_produced_bytes = state.sent_bytes;
        drop(guard.take());
        self.fire_produced(delta);
        if let Some(cv) = provider.condvar() {
            cv.notify_all();
        }

        if aborted_partway {
            Err(BeamError::ConnectionAborted)
        } else if let Some(err) = early_error {
            Err(err)
        } else {
            Ok(())
        }
    }
}

/// Pushes a chunk straight into `send` with no normalization or backpressure
/// — the post-abort fallback, which still needs *some* valid `Chunk` to free
/// later rather than dropping the producer's input silently.
fn push_raw(state: &mut BeamState, pending: PendingChunk<'_>) -> Result<()> {
    let chunk = match pending {
        PendingChunk::Meta(meta) => Chunk::Meta(meta),
        PendingChunk::File(file) => Chunk::File(file),
        other => Chunk::Bytes(materialize_bytes(other)?),
    };
    state.send.push_back(chunk);
    Ok(())
}

fn materialize_bytes(pending: PendingChunk<'_>) -> Result<Bytes> {
    match pending {
        PendingChunk::Transient(s) | PendingChunk::ArenaPooled(s) => Ok(Bytes::copy_from_slice(s)),
        PendingChunk::Owned(b) => Ok(b),
        PendingChunk::Reader(mut r) => {
            let mut buf = Vec::new();
            std::io::Read::read_to_end(&mut r, &mut buf)?;
            Ok(Bytes::from(buf))
        }
        PendingChunk::File(_) | PendingChunk::Meta(_) => {
            unreachable!("file/meta chunks are normalized by their own branch")
        }
    }
}

fn normalize_file(beam: &Beam, state: &mut BeamState, mut file: FileChunk, send_arena: &Arena) -> Result<Chunk> {
    let same_fd = state
        .last_beamed_fd
        .as_ref()
        .is_some_and(|last| Arc::ptr_eq(last, file.fd()));

    if same_fd {
        file.setaside(send_arena);
        return Ok(Chunk::File(file));
    }

    if beam.authorize_file_beam(file.fd().as_ref()) {
        file.setaside(send_arena);
        state.last_beamed_fd = Some(Arc::clone(file.fd()));
        return Ok(Chunk::File(file));
    }

    match file.read_to_bytes() {
        Ok(bytes) => Ok(Chunk::Bytes(bytes)),
        Err(_) if file.length().is_none() => Ok(Chunk::File(file)),
        Err(e) => Err(e),
    }
}

/// Below this much free space, a buffer configured at or above
/// `MIN_SPLIT_SIZE` would rather wait for more room than admit a sliver
/// smaller than the floor. Buffers configured under the floor themselves
/// (as most of the test suite uses) fall back to splitting at the exact
/// space left, or nothing would ever be admitted.
fn below_split_floor(state: &BeamState, remaining_len: usize, space: usize) -> bool {
    let max_buf = state.config.max_buf_size;
    remaining_len > space && max_buf >= MIN_SPLIT_SIZE && space < MIN_SPLIT_SIZE
}

/// Admits `bytes`, splitting and waiting on backpressure as needed, until
/// every byte has been pushed into `send`. On failure returns the unadmitted
/// remainder alongside the error, rather than dropping it — the caller is
/// responsible for surfacing it back to its own caller.
fn admit_with_backpressure<'a>(
    beam: &Beam,
    guard: &mut Option<std::sync::MutexGuard<'a, ()>>,
    provider: &'a Arc<dyn crate::lock::LockProvider>,
    mut remaining: Bytes,
    block: BlockMode,
    deadline: Option<Instant>,
) -> std::result::Result<(), (BeamError, Bytes)> {
    loop {
        // SAFETY: re-derived every iteration rather than carried across the
        // `cv.wait`/`wait_timeout` suspension point below, so no `&mut`
        // reference into the cell is ever live while another thread could
        // be forming its own.
        let state = unsafe { &mut *beam.state.get() };

        if remaining.is_empty() {
            return Ok(());
        }
        if state.aborted {
            state.send.push_back(Chunk::Bytes(remaining));
            return Err((BeamError::ConnectionAborted, Bytes::new()));
        }

        let space = state.space_left();
        if space == 0 || below_split_floor(state, remaining.len(), space) {
            match block {
                BlockMode::NonBlocking => {
                    state.drain_purge();
                    let space = state.space_left();
                    if space == 0 || below_split_floor(state, remaining.len(), space) {
                        return Err((BeamError::Again, remaining));
                    }
                    continue;
                }
                BlockMode::Blocking => {
                    let delta = state.sent_bytes - state.reported_produced_bytes;
                    state.reported_produced_bytes = state.sent_bytes;
                    if delta > 0 {
                        beam.fire_produced(delta);
                    }
                    let Some(cv) = provider.condvar() else {
                        return Err((BeamError::Again, remaining));
                    };
                    let owned = guard.take().expect("guard held while state is accessed");
                    let (new_guard, timed_out) = match deadline {
                        Some(d) => {
                            let remaining_time = d.saturating_duration_since(Instant::now());
                            let (g, wr) = cv.wait_timeout(owned, remaining_time).unwrap();
                            (g, wr.timed_out())
                        }
                        None => (cv.wait(owned).unwrap(), false),
                    };
                    *guard = Some(new_guard);

                    // SAFETY: reborrowed fresh after the wait above re-acquired the
                    // lock; the pre-wait `state` binding is never touched again.
                    let state = unsafe { &mut *beam.state.get() };
                    state.drain_purge();
                    if timed_out {
                        let space = state.space_left();
                        if space == 0 || below_split_floor(state, remaining.len(), space) {
                            return Err((BeamError::TimedOut, remaining));
                        }
                    }
                    continue;
                }
            }
        }

        let admit_len = remaining.len().min(space);
        let tail = if admit_len < remaining.len() {
            Some(remaining.split_off(admit_len))
        } else {
            None
        };
        state.sent_bytes += remaining.len() as u64;
        state.send.push_back(Chunk::Bytes(remaining));
        match tail {
            Some(t) => remaining = t,
            None => return Ok(()),
        }
    }
}
