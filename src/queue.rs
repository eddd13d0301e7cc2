//! Beam-internal queues and the consumer-facing delivery type.
//!
//! `send`, `hold` and `purge` are modeled as plain `VecDeque`s rather than an
//! intrusive linked list — appends and removals from either end are still
//! O(1), which is all the design actually needs; an intrusive list only pays
//! for itself when removal from the *middle* is O(1) too, and the one place
//! that happens (emitted-chunk notification) already has to walk the whole
//! queue.

use std::collections::VecDeque;

use crate::chunk::Chunk;
use crate::proxy::ProxyBucket;

/// A chunk sitting in `hold`, tagged with the id a live [`ProxyBucket`] uses
/// to find it again on drop.
pub struct HeldChunk {
    pub id: u64,
    pub chunk: Chunk,
}

/// What `receive` actually inserts into the caller's destination: either a
/// fully materialized chunk (metadata, file, or a beamer's replacement) or a
/// proxy standing in for a still producer-owned bytes chunk.
pub enum Delivered {
    Chunk(Chunk),
    Proxy(ProxyBucket),
}

impl Delivered {
    pub fn len(&self) -> Option<usize> {
        match self {
            Delivered::Chunk(c) => c.len(),
            Delivered::Proxy(p) => Some(p.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.len(), Some(0))
    }

    pub fn is_eos(&self) -> bool {
        matches!(self, Delivered::Chunk(c) if c.is_eos())
    }

    /// Splits at `at`, mirroring [`Chunk::split_at`]; unsplittable variants
    /// (files, metadata) pass through whole.
    pub fn split_at(self, at: usize) -> (Delivered, Option<Delivered>) {
        match self {
            Delivered::Chunk(c) => {
                let (head, tail) = c.split_at(at);
                (Delivered::Chunk(head), tail.map(Delivered::Chunk))
            }
            Delivered::Proxy(mut p) if at < p.len() => {
                let head = p.split_off(at);
                (Delivered::Proxy(head), Some(Delivered::Proxy(p)))
            }
            other @ Delivered::Proxy(_) => (other, None),
        }
    }
}

/// Consumer-visible destination for a `receive` call, and the carry-over
/// `recv_buffer` the beam keeps between calls.
#[derive(Default)]
pub struct Brigade {
    items: VecDeque<Delivered>,
}

impl Brigade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, item: Delivered) {
        self.items.push_back(item);
    }

    pub fn pop_front(&mut self) -> Option<Delivered> {
        self.items.pop_front()
    }

    pub fn push_front(&mut self, item: Delivered) {
        self.items.push_front(item);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delivered> {
        self.items.iter()
    }

    /// Appends every remaining item of `rest` in order.
    pub fn extend_rest(&mut self, rest: impl Iterator<Item = Delivered>) {
        self.items.extend(rest);
    }
}

impl IntoIterator for Brigade {
    type Item = Delivered;
    type IntoIter = std::collections::vec_deque::IntoIter<Delivered>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
