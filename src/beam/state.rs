use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::arena::{Arena, HookId};
use crate::chunk::Chunk;
use crate::config::BeamConfig;
use crate::proxy::ProxyHandle;
use crate::queue::{Brigade, HeldChunk};

/// Everything a beam owns, guarded by the external lock `Beam` pairs it with.
///
/// Lives behind an `UnsafeCell` in [`super::Beam`]; every field access in the
/// rest of the `beam` module happens only while that lock's guard is held, the
/// same discipline [`crate::lock`] documents.
#[allow(clippy::struct_excessive_bools)]
pub(super) struct BeamState {
    pub send: VecDeque<Chunk>,
    pub hold: VecDeque<HeldChunk>,
    pub purge: VecDeque<Chunk>,
    pub recv_buffer: Brigade,
    pub live_proxies: HashMap<u64, ProxyHandle>,

    pub sent_bytes: u64,
    pub received_bytes: u64,
    pub reported_produced_bytes: u64,
    pub reported_consumed_bytes: u64,
    pub buckets_sent: u64,
    pub files_beamed: u64,
    pub last_beamed_fd: Option<Arc<std::fs::File>>,

    pub next_chunk_id: u64,
    pub next_proxy_id: u64,

    pub config: BeamConfig,
    pub closed: bool,
    pub aborted: bool,
    pub close_sent: bool,

    pub send_arena: Option<Arena>,
    pub recv_arena: Option<Arena>,
    pub monitor_hook: Option<(Arena, HookId)>,
    pub destroyed: bool,
}

impl BeamState {
    pub fn new(config: BeamConfig) -> Self {
        Self {
            send: VecDeque::new(),
            hold: VecDeque::new(),
            purge: VecDeque::new(),
            recv_buffer: Brigade::new(),
            live_proxies: HashMap::new(),
            sent_bytes: 0,
            received_bytes: 0,
            reported_produced_bytes: 0,
            reported_consumed_bytes: 0,
            buckets_sent: 0,
            files_beamed: 0,
            last_beamed_fd: None,
            next_chunk_id: 1,
            next_proxy_id: 1,
            config,
            closed: false,
            aborted: false,
            close_sent: false,
            send_arena: None,
            recv_arena: None,
            monitor_hook: None,
            destroyed: false,
        }
    }

    /// Buffered size: `send` entries' lengths, excluding file chunks and
    /// chunks of indeterminate length.
    pub fn buffered(&self) -> usize {
        self.send
            .iter()
            .filter_map(|c| match c {
                Chunk::Bytes(b) => Some(b.len()),
                Chunk::File(_) | Chunk::Meta(_) => None,
            })
            .sum()
    }

    /// Space left before `max_buf_size`, or `usize::MAX` when unbounded.
    pub fn space_left(&self) -> usize {
        if self.config.max_buf_size == 0 {
            usize::MAX
        } else {
            self.config.max_buf_size.saturating_sub(self.buffered())
        }
    }

    pub fn fresh_chunk_id(&mut self) -> u64 {
        let id = self.next_chunk_id;
        self.next_chunk_id += 1;
        id
    }

    pub fn fresh_proxy_id(&mut self) -> u64 {
        let id = self.next_proxy_id;
        self.next_proxy_id += 1;
        id
    }

    /// Moves a chunk from `send` into `hold`, newest-first (see
    /// `DESIGN.md`'s hold-queue-ordering entry for why).
    pub fn hold_push(&mut self, id: u64, chunk: Chunk) {
        self.hold.push_front(HeldChunk { id, chunk });
    }

    /// Scans `hold` front to back for `source_id`. Metadata encountered
    /// before the target is swept into `purge` as it goes (it was only
    /// waiting behind some other proxy-backed chunk); non-metadata entries
    /// encountered before the target are left untouched. Returns whether the
    /// target was found.
    pub fn sweep_hold_for_source(&mut self, source_id: u64) -> bool {
        let old = std::mem::take(&mut self.hold);
        let mut kept = VecDeque::with_capacity(old.len());
        let mut iter = old.into_iter();
        let mut found = false;
        for held in iter.by_ref() {
            if held.id == source_id {
                self.purge.push_back(held.chunk);
                found = true;
                break;
            } else if held.chunk.is_meta() {
                self.purge.push_back(held.chunk);
            } else {
                kept.push_back(held);
            }
        }
        kept.extend(iter);
        self.hold = kept;
        found
    }

    /// Frees everything in `purge`. Producer-thread duty, run opportunistically.
    pub fn drain_purge(&mut self) {
        self.purge.clear();
    }

    /// Detaches every still-live proxy so future reads fail cleanly with
    /// `ConnectionReset`, and forgets them.
    pub fn detach_all_proxies(&mut self) {
        for (_, handle) in self.live_proxies.drain() {
            handle.detach_if_alive();
        }
    }

    /// Frees `send`, `hold`, `purge` and detaches outstanding proxies — the
    /// producer side's half of teardown, run either from `destroy` (owner is
    /// the producer) or synchronously when the producer's arena dies out
    /// from under a consumer-owned beam.
    pub fn producer_cleanup(&mut self) {
        self.send.clear();
        self.hold.clear();
        self.purge.clear();
        self.detach_all_proxies();
    }

    pub fn is_empty_of_work(&self) -> bool {
        self.send.is_empty() && self.recv_buffer.is_empty()
    }

    pub fn holds_proxies(&self) -> bool {
        !self.live_proxies.is_empty()
    }
}
