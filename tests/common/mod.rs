//! Shared helpers for the integration suite: pull bytes out of whatever a
//! `receive` call handed back, regardless of whether it came as a direct
//! chunk or a proxy borrowing straight from the producer.

use bucket_beam::{Arena, Beam, BlockMode, Brigade, Delivered, PendingChunk};

/// Sends a batch expected to be admitted in full; panics if any of it comes
/// back unsent, so callers that don't care about partial admission don't
/// need to thread an `unsent` vec through every call.
pub fn send_all(beam: &Beam, chunks: Vec<PendingChunk<'_>>, arena: &Arena, block: BlockMode) -> bucket_beam::Result<()> {
    let mut unsent = Vec::new();
    let result = beam.send(chunks, arena, block, &mut unsent);
    assert!(unsent.is_empty(), "expected full admission, {} chunk(s) left unsent", unsent.len());
    result
}

/// Concatenates every byte-bearing item in `brigade`, draining it, and
/// reports whether an end-of-stream marker was seen along the way.
pub fn drain_to_string(brigade: Brigade) -> (String, bool) {
    let mut out = Vec::new();
    let mut eos = false;
    for item in brigade {
        eos |= item.is_eos();
        match item {
            Delivered::Chunk(bucket_beam::Chunk::Bytes(b)) => out.extend_from_slice(&b),
            Delivered::Proxy(p) => out.extend_from_slice(&p.read().expect("proxy read")),
            Delivered::Chunk(_) => {}
        }
    }
    (String::from_utf8(out).expect("utf8"), eos)
}
