use std::time::Duration;

/// Below this much free space, a buffer configured at or above this floor
/// waits for more room rather than admitting a fragment smaller than it.
/// Buffers configured under the floor split at the exact space left instead,
/// since the floor would otherwise never be reachable.
pub const MIN_SPLIT_SIZE: usize = 8 * 1024;

/// Which side's arena death triggers beam destruction.
///
/// The non-owner side's arena is merely monitored (its death clears references
/// into it); the owner side's arena death unconditionally runs `destroy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    Producer,
    Consumer,
}

/// Configuration for a [`crate::Beam`].
#[derive(Debug, Clone, Copy)]
pub struct BeamConfig {
    /// Maximum buffered bytes in `send` before backpressure kicks in. `0` means unbounded.
    pub max_buf_size: usize,
    /// Wait bound for blocking `send`/`receive`/`wait_empty`. `None` means wait forever.
    pub timeout: Option<Duration>,
    /// Which side's arena death destroys the beam.
    pub owner: Owner,
}

impl BeamConfig {
    pub const fn new(max_buf_size: usize, timeout: Option<Duration>, owner: Owner) -> Self {
        Self {
            max_buf_size,
            timeout,
            owner,
        }
    }

    /// No buffer bound, no timeout, owned by the producer side.
    pub const fn unbounded() -> Self {
        Self::new(0, None, Owner::Producer)
    }

    /// Bounded buffer, no timeout, owned by the producer side.
    pub const fn bounded(max_buf_size: usize) -> Self {
        Self::new(max_buf_size, None, Owner::Producer)
    }
}

impl Default for BeamConfig {
    fn default() -> Self {
        Self::unbounded()
    }
}
