//! The chunk model.
//!
//! Two enums encode the producer/consumer arena split at the type level instead
//! of at runtime:
//!
//! - [`PendingChunk`] is what a producer hands to [`crate::Beam::send`]. Its
//!   variants carry a lifetime tied to the producer's call stack (`Transient`,
//!   `ArenaPooled`) or an explicit ownership transfer (`Owned`, `File`, `Meta`,
//!   `Reader`). Because the lifetime cannot outlive the `send` call, the
//!   borrow-checker — not a runtime liveness flag — forbids a `PendingChunk`
//!   from surviving past the point where it is normalized.
//! - [`Chunk`] is what actually lives in the beam's `send`/`hold`/`purge`
//!   queues: always `'static`, always safe to read from any thread. `send`'s
//!   normalization step is exactly the `PendingChunk -> Chunk` conversion.

use bytes::Bytes;
use std::io::Read;
use std::sync::Arc;

use crate::arena::Arena;
use crate::error::{BeamError, Result};

/// Non-data markers: end of stream, an explicit flush point, or an error status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Meta {
    Flush,
    Eos,
    Error { status: i32 },
}

/// An open file reference, re-homeable between arenas via [`FileChunk::setaside`].
#[derive(Debug, Clone)]
pub struct FileChunk {
    file: Arc<std::fs::File>,
    offset: u64,
    /// `None` means indeterminate/externally-accounted length.
    length: Option<u64>,
    /// The arena the file handle's cleanup is currently registered with.
    arena: Arena,
}

impl FileChunk {
    pub fn new(file: Arc<std::fs::File>, offset: u64, length: Option<u64>, arena: Arena) -> Self {
        Self {
            file,
            offset,
            length,
            arena,
        }
    }

    pub fn fd(&self) -> &Arc<std::fs::File> {
        &self.file
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> Option<u64> {
        self.length
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Re-homes this file handle's accounting to `target`, the arena-rehoming
    /// operation the glossary calls "setaside".
    pub fn setaside(&mut self, target: &Arena) {
        self.arena = target.clone();
    }

    /// Reads the chunk's window into an owned, consumer-safe [`Bytes`] buffer —
    /// the read-and-copy fallback path used when file-beam authorization is
    /// refused.
    pub fn read_to_bytes(&self) -> Result<Bytes> {
        let len = usize::try_from(
            self.length
                .ok_or_else(|| BeamError::Io(std::io::Error::other("indeterminate file length")))?,
        )
        .map_err(|e| BeamError::Io(std::io::Error::other(e)))?;
        let mut buf = vec![0u8; len];
        read_exact_at(&self.file, self.offset, &mut buf)?;
        Ok(Bytes::from(buf))
    }
}

#[cfg(unix)]
fn read_exact_at(file: &std::fs::File, offset: u64, buf: &mut [u8]) -> Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)?;
    Ok(())
}

#[cfg(not(unix))]
fn read_exact_at(file: &std::fs::File, offset: u64, buf: &mut [u8]) -> Result<()> {
    use std::io::{Seek, SeekFrom};
    // Portable fallback: no read-at-offset support, so seek under a private
    // handle clone is unavailable; take the simplest correct path instead.
    let mut file = file.try_clone()?;
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)?;
    Ok(())
}

/// A normalized, `'static`, cross-thread-safe unit of transport living in a
/// beam's queues.
#[derive(Debug, Clone)]
pub enum Chunk {
    Bytes(Bytes),
    File(FileChunk),
    Meta(Meta),
}

impl Chunk {
    /// Length in bytes, or `None` for an indeterminate-length file chunk.
    pub fn len(&self) -> Option<usize> {
        match self {
            Chunk::Bytes(b) => Some(b.len()),
            Chunk::File(f) => f.length.map(|l| usize::try_from(l).unwrap_or(usize::MAX)),
            Chunk::Meta(_) => Some(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.len(), Some(0))
    }

    pub fn is_meta(&self) -> bool {
        matches!(self, Chunk::Meta(_))
    }

    pub fn is_eos(&self) -> bool {
        matches!(self, Chunk::Meta(Meta::Eos))
    }

    /// Counts against the flow-control budget: bytes chunks only.
    pub fn buffered_len(&self) -> usize {
        match self {
            Chunk::Bytes(b) => b.len(),
            Chunk::File(_) | Chunk::Meta(_) => 0,
        }
    }

    /// Splits a bytes chunk at `at`, returning `(head, Some(tail))`. Chunks
    /// that cannot be split (file, meta, or already short enough) are
    /// returned unsplit as the head with `None` tail.
    pub fn split_at(self, at: usize) -> (Chunk, Option<Chunk>) {
        match self {
            Chunk::Bytes(mut b) if at < b.len() => {
                let tail = b.split_off(at);
                (Chunk::Bytes(b), Some(Chunk::Bytes(tail)))
            }
            other => (other, None),
        }
    }
}

/// What a producer hands to [`crate::Beam::send`] before normalization.
pub enum PendingChunk<'a> {
    /// Stack/ephemeral backing that does not outlive the call — copied into a
    /// heap `Bytes` during normalization.
    Transient(&'a [u8]),
    /// Already heap-owned and thread-safe; accepted with no copy.
    Owned(Bytes),
    /// Backing lives in an arena pool that may vanish at arena cleanup; read
    /// into memory and re-wrapped as heap-owned during normalization.
    ArenaPooled(&'a [u8]),
    /// A file reference, set aside into the producer arena during normalization.
    File(FileChunk),
    /// A non-data marker, passed straight through.
    Meta(Meta),
    /// Unknown-kind fallback: force a producer-thread read to materialize bytes.
    Reader(Box<dyn Read + 'a>),
}

impl PendingChunk<'_> {
    pub fn meta(meta: Meta) -> Self {
        PendingChunk::Meta(meta)
    }

    pub fn bytes(data: impl Into<Bytes>) -> Self {
        PendingChunk::Owned(data.into())
    }
}
