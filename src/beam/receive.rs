use std::sync::Weak;
use std::time::Instant;

use crate::arena::Arena;
use crate::chunk::{Chunk, Meta};
use crate::config::Owner;
use crate::error::{BeamError, Result};
use crate::proxy::{BeamBackend, ProxyBucket};
use crate::queue::{Brigade, Delivered};

use super::{BlockMode, Beam};

/// Summary of what a [`Beam::receive`] call transferred.
#[derive(Debug, Default, Clone, Copy)]
pub struct Received {
    pub bytes: usize,
    pub items: usize,
    pub end_of_stream: bool,
}

impl Beam {
    /// Drains available content into `dest`, up to `readbytes` bytes (`0`
    /// for unlimited), binding `recv_arena` to the consumer's current arena.
    pub fn receive(
        &self,
        dest: &mut Brigade,
        readbytes: usize,
        block: BlockMode,
        recv_arena: &Arena,
    ) -> Result<Received> {
        let provider = self.lock_provider.lock().unwrap().clone();
        let mut guard = Some(provider.lock());

        let deadline;
        {
            let state = unsafe { &mut *self.state.get() };
            state.recv_arena = Some(recv_arena.clone());
            if state.config.owner == Owner::Producer {
                self.rebind_monitor(state, recv_arena);
            }
            deadline = state.config.timeout.map(|t| Instant::now() + t);
        }

        loop {
            // SAFETY: re-derived at the top of every loop iteration instead
            // of held across the `cv.wait`/`wait_timeout` suspension point
            // below, so no `&mut` into the cell survives a wake where
            // another thread could have formed its own.
            let state = unsafe { &mut *self.state.get() };

            if state.aborted {
                state.recv_buffer = Brigade::new();
                return Err(BeamError::ConnectionAborted);
            }

            // Steps 2+3: everything waiting from a prior call, then the
            // whole of `send` — readbytes is enforced afterward by a single
            // split pass rather than gating each drain separately; both
            // produce the same final split point, since nothing is ever
            // handed to the caller before that pass runs.
            let mut produced: Vec<Delivered> = Vec::new();
            while let Some(item) = state.recv_buffer.pop_front() {
                produced.push(item);
            }

            while let Some(head) = state.send.pop_front() {
                match head {
                    Chunk::Meta(meta) => {
                        if matches!(meta, Meta::Eos) {
                            state.close_sent = true;
                        }
                        // A marker behind some still-outstanding proxy needs to be
                        // swept into `purge` alongside it (see `sweep_hold_for_source`);
                        // one reaching an empty `hold` has nothing to wait behind and
                        // is simply delivered.
                        if !state.hold.is_empty() {
                            let id = state.fresh_chunk_id();
                            state.hold_push(id, Chunk::Meta(meta));
                        }
                        produced.push(Delivered::Chunk(Chunk::Meta(meta)));
                    }
                    Chunk::File(mut file) => {
                        if !file.arena().same_arena(recv_arena) {
                            file.setaside(recv_arena);
                            state.files_beamed += 1;
                        }
                        state.received_bytes += file.length().unwrap_or(0);
                        let out = file.clone();
                        let id = state.fresh_chunk_id();
                        state.hold_push(id, Chunk::File(file));
                        produced.push(Delivered::Chunk(Chunk::File(out)));
                    }
                    Chunk::Bytes(bytes) => {
                        if let Some(replacement) = crate::beamer::consult(&Chunk::Bytes(bytes.clone())) {
                            produced.push(Delivered::Chunk(replacement));
                        } else {
                            let len = bytes.len();
                            let id = state.fresh_chunk_id();
                            let proxy_id = state.fresh_proxy_id();
                            let weak_backend: Weak<dyn BeamBackend> = self.self_weak.lock().unwrap().clone();
                            let proxy = ProxyBucket::new(proxy_id, weak_backend, id, 0, len);
                            state.live_proxies.insert(proxy_id, proxy.weak_handle());
                            state.hold_push(id, Chunk::Bytes(bytes));
                            state.received_bytes += len as u64;
                            produced.push(Delivered::Proxy(proxy));
                        }
                    }
                }
            }

            // Step 4: split at the exact `readbytes` boundary; overshoot
            // (and everything after it) carries over to `recv_buffer`.
            let mut pushed = 0usize;
            let mut bytes_pushed = 0usize;
            let mut saw_eos = false;
            if readbytes == 0 {
                for item in produced {
                    saw_eos |= item.is_eos();
                    bytes_pushed += item.len().unwrap_or(0);
                    dest.push_back(item);
                    pushed += 1;
                }
            } else {
                let mut budget = readbytes;
                let mut iter = produced.into_iter();
                for item in iter.by_ref() {
                    let len = item.len().unwrap_or(0);
                    if len == 0 {
                        saw_eos |= item.is_eos();
                        dest.push_back(item);
                        pushed += 1;
                        continue;
                    }
                    if len <= budget {
                        budget -= len;
                        bytes_pushed += len;
                        dest.push_back(item);
                        pushed += 1;
                    } else {
                        let (head, tail) = item.split_at(budget);
                        if head.len().unwrap_or(0) > 0 {
                            bytes_pushed += head.len().unwrap_or(0);
                            dest.push_back(head);
                            pushed += 1;
                        }
                        if let Some(t) = tail {
                            state.recv_buffer.push_back(t);
                        }
                        state.recv_buffer.extend_rest(iter);
                        break;
                    }
                }
            }

            // Step 5: deliver end-of-stream once the stream is fully drained.
            if state.closed && state.recv_buffer.is_empty() && state.send.is_empty() && !state.close_sent {
                dest.push_back(Delivered::Chunk(Chunk::Meta(Meta::Eos)));
                state.close_sent = true;
                saw_eos = true;
                pushed += 1;
            }

            if pushed > 0 {
                let delta = state.received_bytes - state.reported_consumed_bytes;
                state.reported_consumed_bytes = state.received_bytes;
                drop(guard.take());
                self.fire_consumed(delta);
                if let Some(cv) = provider.condvar() {
                    cv.notify_all();
                }
                return Ok(Received {
                    bytes: bytes_pushed,
                    items: pushed,
                    end_of_stream: saw_eos,
                });
            }

            if state.closed {
                return Err(BeamError::EndOfFile);
            }

            match block {
                BlockMode::Blocking => {
                    let Some(cv) = provider.condvar() else {
                        drop(guard.take());
                        if let Some(cv) = provider.condvar() {
                            cv.notify_all();
                        }
                        return Err(BeamError::Again);
                    };
                    let owned = guard.take().expect("guard held while state is accessed");
                    let (new_guard, timed_out) = match deadline {
                        Some(d) => {
                            let remaining = d.saturating_duration_since(Instant::now());
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
                BlockMode::NonBlocking => {
                    if let Some(cv) = provider.condvar() {
                        cv.notify_all();
                    }
                    return Err(BeamError::Again);
                }
            }
        }
    }
}
