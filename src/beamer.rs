//! Beamer registry.
//!
//! A beamer is a pluggable transform consulted during receive, before the
//! default chunk-to-proxy conversion: given a data chunk about to be
//! received, it may return a replacement chunk to be delivered instead of a
//! proxy. The registry is process-wide and append-only — all registrations
//! are expected to happen at start-up, before any beam operation runs, the
//! same way the corpus's channel registration APIs assume a settle-then-run
//! lifecycle.

use std::sync::{Arc, OnceLock, RwLock};

use crate::chunk::Chunk;

pub trait Beamer: Send + Sync {
    /// Offered the next data chunk a receive is about to proxy. Returning
    /// `Some` claims it: the returned chunk is delivered in place of a proxy,
    /// and the source chunk is freed immediately rather than moved to `hold`.
    fn try_claim(&self, chunk: &Chunk) -> Option<Chunk>;
}

fn registry() -> &'static RwLock<Vec<Arc<dyn Beamer>>> {
    static REGISTRY: OnceLock<RwLock<Vec<Arc<dyn Beamer>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Vec::new()))
}

/// Appends a beamer to the end of the registration order.
pub fn register(beamer: Arc<dyn Beamer>) {
    registry().write().unwrap().push(beamer);
}

/// Consults registered beamers in registration order; the first claim wins.
pub fn consult(chunk: &Chunk) -> Option<Chunk> {
    registry().read().unwrap().iter().find_map(|b| b.try_claim(chunk))
}
