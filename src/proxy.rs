//! The proxy bucket.
//!
//! A [`ProxyBucket`] is a consumer-side handle onto a producer-owned chunk
//! still sitting in the beam's `hold` queue. Cloning or [`ProxyBucket::split_off`]
//! shares the same [`ProxyShared`] via `Arc`, so the refcount std already gives
//! us for free *is* the proxy refcount the design describes — no manual
//! counting needed. The beam -> proxy -> source-chunk -> beam cycle is broken
//! the same way: the proxy only ever holds a `Weak` pointer back to the beam.

use bytes::Bytes;
use std::sync::{Arc, Mutex, Weak};

use crate::error::{BeamError, Result};

/// Backend a proxy calls into on last drop and on read. Implemented by the
/// beam's internal shared state so `proxy.rs` never needs to know about
/// `BeamState`/`Mutex`/queues directly.
pub trait BeamBackend: Send + Sync {
    /// Reads `[start, start+len)` out of the held chunk identified by `source_id`.
    fn read_window(&self, source_id: u64, start: usize, len: usize) -> Result<Bytes>;

    /// Called exactly once, when the last `ProxyBucket` referencing `proxy_id`
    /// is dropped. `source_id` is `None` if the chunk was already detached
    /// (e.g. the beam was destroyed while this proxy was still alive).
    fn proxy_dropped(&self, proxy_id: u64, source_id: Option<u64>);
}

struct ProxyShared {
    id: u64,
    beam: Weak<dyn BeamBackend>,
    source_id: Mutex<Option<u64>>,
}

impl Drop for ProxyShared {
    fn drop(&mut self) {
        if let Some(beam) = self.beam.upgrade() {
            let source_id = *self.source_id.lock().unwrap();
            beam.proxy_dropped(self.id, source_id);
        }
    }
}

/// A refcounted, splittable window onto a producer chunk.
#[derive(Clone)]
pub struct ProxyBucket {
    shared: Arc<ProxyShared>,
    start: usize,
    length: usize,
}

impl ProxyBucket {
    pub(crate) fn new(id: u64, beam: Weak<dyn BeamBackend>, source_id: u64, start: usize, length: usize) -> Self {
        Self {
            shared: Arc::new(ProxyShared {
                id,
                beam,
                source_id: Mutex::new(Some(source_id)),
            }),
            start,
            length,
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Reads this proxy's window, reaching back into the producer's held
    /// chunk through the beam. Fails with `ConnectionReset` if the source
    /// chunk or the beam itself is gone.
    pub fn read(&self) -> Result<Bytes> {
        let source_id = self
            .shared
            .source_id
            .lock()
            .unwrap()
            .ok_or(BeamError::ConnectionReset)?;
        let beam = self.shared.beam.upgrade().ok_or(BeamError::ConnectionReset)?;
        beam.read_window(source_id, self.start, self.length)
    }

    /// A weak, detachable handle the beam can hold onto without keeping the
    /// proxy itself alive, used to force-detach any proxy still outstanding
    /// when the beam is destroyed.
    pub(crate) fn weak_handle(&self) -> ProxyHandle {
        ProxyHandle(Arc::downgrade(&self.shared))
    }

    /// Splits off `[self.start, self.start+at)` as a new proxy, shrinking
    /// `self` to `[self.start+at, self.start+self.length)`. Both windows
    /// share the same underlying refcount, so the held chunk is freed only
    /// once every split/clone has been dropped.
    #[must_use]
    pub fn split_off(&mut self, at: usize) -> ProxyBucket {
        assert!(at <= self.length, "split point past end of proxy window");
        let head = ProxyBucket {
            shared: Arc::clone(&self.shared),
            start: self.start,
            length: at,
        };
        self.start += at;
        self.length -= at;
        head
    }
}

/// A weak handle onto a proxy's shared state, usable to null its source-chunk
/// backpointer without holding the proxy alive.
pub(crate) struct ProxyHandle(Weak<ProxyShared>);

impl ProxyHandle {
    pub(crate) fn detach_if_alive(&self) {
        if let Some(shared) = self.0.upgrade() {
            *shared.source_id.lock().unwrap() = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct FakeBackend {
        reads: StdMutex<Vec<(u64, usize, usize)>>,
        drops: StdMutex<Vec<(u64, Option<u64>)>>,
    }

    impl BeamBackend for FakeBackend {
        fn read_window(&self, source_id: u64, start: usize, len: usize) -> Result<Bytes> {
            self.reads.lock().unwrap().push((source_id, start, len));
            Ok(Bytes::from_static(b"hello")[start..start + len].to_vec().into())
        }

        fn proxy_dropped(&self, proxy_id: u64, source_id: Option<u64>) {
            self.drops.lock().unwrap().push((proxy_id, source_id));
        }
    }

    #[test]
    fn drop_fires_exactly_once_across_clones_and_splits() {
        let backend = Arc::new(FakeBackend {
            reads: StdMutex::new(vec![]),
            drops: StdMutex::new(vec![]),
        });
        let backend_dyn: Arc<dyn BeamBackend> = backend.clone();
        let mut proxy = ProxyBucket::new(1, Arc::downgrade(&backend_dyn), 42, 0, 5);
        let clone = proxy.clone();
        let tail = proxy.split_off(2);
        drop(clone);
        drop(proxy);
        drop(tail);

        assert_eq!(backend.drops.lock().unwrap().len(), 1);
        assert_eq!(backend.drops.lock().unwrap()[0], (1, Some(42)));
    }

    #[test]
    fn detach_makes_read_fail() {
        let backend = Arc::new(FakeBackend {
            reads: StdMutex::new(vec![]),
            drops: StdMutex::new(vec![]),
        });
        let backend_dyn: Arc<dyn BeamBackend> = backend.clone();
        let proxy = ProxyBucket::new(1, Arc::downgrade(&backend_dyn), 42, 0, 5);
        proxy.weak_handle().detach_if_alive();
        assert!(matches!(proxy.read(), Err(BeamError::ConnectionReset)));
    }
}
