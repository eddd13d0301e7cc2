//! Property-based tests for the quantified invariants in the specification:
//! order preservation, the bounded-buffer bound, callback-delta accounting,
//! and idempotence of `close`/`abort`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use bucket_beam::{Arena, Beam, BeamConfig, BlockMode, Brigade, Chunk, Delivered, PendingChunk};

fn owned(data: Vec<u8>) -> PendingChunk<'static> {
    PendingChunk::bytes(data)
}

/// Drains one `receive` call's worth of byte content into `out`, returning
/// whether end-of-stream was seen.
fn drain_into(dest: Brigade, out: &mut Vec<u8>) -> bool {
    let mut eos = false;
    for item in dest {
        eos |= item.is_eos();
        match item {
            Delivered::Chunk(Chunk::Bytes(b)) => out.extend_from_slice(&b),
            Delivered::Proxy(p) => out.extend_from_slice(&p.read().unwrap()),
            Delivered::Chunk(_) => {}
        }
    }
    eos
}

proptest! {
    /// Property 1 (order preservation) + property 7 (exactly one end-of-stream):
    /// whatever bytes go in, in order, come back out in the same order, and the
    /// stream ends with exactly one end-of-stream marker.
    #[test]
    fn prop_order_preservation(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..16)) {
        let producer_arena = Arena::new();
        let consumer_arena = Arena::new();
        let beam = Beam::create(producer_arena.clone(), BeamConfig::unbounded());

        let mut expected = Vec::new();
        for chunk in &chunks {
            expected.extend_from_slice(chunk);
            let mut unsent = Vec::new();
            beam.send(vec![owned(chunk.clone())], &producer_arena, BlockMode::Blocking, &mut unsent).unwrap();
            prop_assert!(unsent.is_empty());
        }
        beam.close();

        let mut actual = Vec::new();
        let mut eos_count = 0usize;
        loop {
            let mut dest = Brigade::new();
            match beam.receive(&mut dest, 0, BlockMode::Blocking, &consumer_arena) {
                Ok(_) => {
                    if drain_into(dest, &mut actual) {
                        eos_count += 1;
                    }
                }
                Err(bucket_beam::BeamError::EndOfFile) => break,
                Err(e) => prop_assert!(false, "unexpected error: {e:?}"),
            }
        }

        prop_assert_eq!(actual, expected);
        prop_assert_eq!(eos_count, 1);
    }

    /// Property 2 (bounded buffer): buffered size never exceeds `max_buf_size`
    /// at any point a caller can observe it, for any bound and any sequence of
    /// non-blocking sends interleaved with receives. Also checks completeness:
    /// whatever backpressure refuses to admit comes back in full via `unsent`
    /// rather than being dropped.
    #[test]
    fn prop_bounded_buffer(
        max_buf_size in 1usize..64,
        chunk_sizes in prop::collection::vec(1usize..16, 0..40),
    ) {
        let producer_arena = Arena::new();
        let consumer_arena = Arena::new();
        let beam = Beam::create(producer_arena.clone(), BeamConfig::bounded(max_buf_size));

        for size in chunk_sizes {
            let data = vec![0xABu8; size];
            let before = beam.get_buffered();
            let mut unsent = Vec::new();
            let result = beam.send(vec![owned(data)], &producer_arena, BlockMode::NonBlocking, &mut unsent);
            // Whatever wasn't admitted into the buffer must be recoverable
            // from `unsent` in full — nothing vanishes under backpressure.
            let admitted = beam.get_buffered() - before;
            let recovered: usize = unsent
                .iter()
                .map(|p| match p {
                    PendingChunk::Owned(b) => b.len(),
                    _ => 0,
                })
                .sum();
            prop_assert_eq!(admitted + recovered, size);

            match result {
                Ok(()) => prop_assert!(unsent.is_empty()),
                Err(bucket_beam::BeamError::Again) => {
                    // Free some space so the property has something to probe beyond trivial rejection.
                    let mut dest = Brigade::new();
                    let _ = beam.receive(&mut dest, 4, BlockMode::NonBlocking, &consumer_arena);
                }
                Err(e) => prop_assert!(false, "unexpected send error: {e:?}"),
            }
            prop_assert!(beam.get_buffered() <= max_buf_size);
        }
    }

    /// Property 6 (callback accounting): the cumulative delta reported to
    /// `on_produced` equals total bytes actually sent, and `on_consumed`
    /// equals total bytes actually delivered.
    #[test]
    fn prop_callback_accounting(chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..12)) {
        let producer_arena = Arena::new();
        let consumer_arena = Arena::new();
        let beam = Beam::create(producer_arena.clone(), BeamConfig::unbounded());

        let produced_total = Arc::new(AtomicU64::new(0));
        let consumed_total = Arc::new(AtomicU64::new(0));
        {
            let produced_total = Arc::clone(&produced_total);
            beam.on_produced(move |delta| {
                produced_total.fetch_add(delta, Ordering::SeqCst);
            });
        }
        {
            let consumed_total = Arc::clone(&consumed_total);
            beam.on_consumed(move |delta| {
                consumed_total.fetch_add(delta, Ordering::SeqCst);
            });
        }

        let mut expected_bytes = 0u64;
        for chunk in &chunks {
            expected_bytes += chunk.len() as u64;
            let mut unsent = Vec::new();
            beam.send(vec![owned(chunk.clone())], &producer_arena, BlockMode::Blocking, &mut unsent).unwrap();
            prop_assert!(unsent.is_empty());
        }
        beam.close();

        let mut delivered_bytes = 0u64;
        loop {
            let mut dest = Brigade::new();
            match beam.receive(&mut dest, 0, BlockMode::Blocking, &consumer_arena) {
                Ok(received) => delivered_bytes += received.bytes as u64,
                Err(bucket_beam::BeamError::EndOfFile) => break,
                Err(e) => prop_assert!(false, "unexpected error: {e:?}"),
            }
        }

        prop_assert_eq!(produced_total.load(Ordering::SeqCst), expected_bytes);
        prop_assert_eq!(consumed_total.load(Ordering::SeqCst), expected_bytes);
        prop_assert_eq!(delivered_bytes, expected_bytes);
    }

    /// Property 5 (idempotence): any sequence of `close`/`abort` calls behaves
    /// exactly as if only the first `abort` (or, absent one, the first
    /// `close`) had been called — repeats never change observable state.
    #[test]
    fn prop_close_abort_idempotent(ops in prop::collection::vec(prop::bool::ANY, 0..10)) {
        let producer_arena = Arena::new();
        let consumer_arena = Arena::new();
        let beam = Beam::create(producer_arena.clone(), BeamConfig::unbounded());
        let mut unsent = Vec::new();
        beam.send(vec![owned(b"payload".to_vec())], &producer_arena, BlockMode::Blocking, &mut unsent).unwrap();

        let mut any_abort = false;
        for op_is_abort in &ops {
            if *op_is_abort {
                beam.abort();
                any_abort = true;
            } else {
                beam.close();
            }
        }

        let mut dest = Brigade::new();
        let result = beam.receive(&mut dest, 0, BlockMode::Blocking, &consumer_arena);
        if any_abort {
            prop_assert!(matches!(result, Err(bucket_beam::BeamError::ConnectionAborted)));
        } else if ops.is_empty() {
            // Neither close nor abort ever ran: the payload is still deliverable.
            prop_assert!(result.is_ok());
        } else {
            // Only `close` calls: the payload plus end-of-stream come through.
            prop_assert!(result.is_ok());
        }
    }
}
