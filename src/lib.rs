//! A thread-safe, bounded, one-directional pipe for moving a heterogeneous
//! stream of byte chunks — including file references — from a producer
//! thread to a consumer thread, without ever letting one side read memory
//! that belongs to the other's arena.
//!
//! The producer calls [`Beam::send`] with a batch of [`PendingChunk`]s; the
//! consumer calls [`Beam::receive`] to drain them into a [`Brigade`], getting
//! back either materialized chunks or [`ProxyBucket`]s that borrow straight
//! from the producer's still-live storage. Dropping the last proxy over a
//! chunk is what lets the producer free it.

pub mod arena;
mod beam;
pub mod beamer;
pub mod chunk;
pub mod config;
pub mod error;
pub mod lock;
pub mod proxy;
pub mod queue;

pub use arena::Arena;
pub use beam::{BlockMode, Beam, Received};
pub use beamer::Beamer;
pub use chunk::{Chunk, FileChunk, Meta, PendingChunk};
pub use config::{BeamConfig, Owner};
pub use error::{BeamError, Result};
pub use lock::{LockProvider, NullLock, OwnedLock};
pub use proxy::{BeamBackend, ProxyBucket};
pub use queue::{Brigade, Delivered};
