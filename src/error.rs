use thiserror::Error;

/// Errors surfaced by [`crate::Beam`] operations.
///
/// `NotImplemented` from the design notes never reaches callers: it is an internal
/// sentinel the normalization fallback consumes inside `send`.
#[derive(Debug, Error)]
pub enum BeamError {
    /// Non-blocking call found no progress possible; try again later.
    #[error("would block")]
    Again,

    /// A blocking wait exceeded the beam's configured timeout.
    #[error("timed out waiting on beam")]
    TimedOut,

    /// The beam has observed an abort; no further progress is possible.
    #[error("connection aborted")]
    ConnectionAborted,

    /// `receive` was called on a closed, fully drained beam.
    #[error("end of file")]
    EndOfFile,

    /// A proxy's source chunk is gone (producer beam half was destroyed).
    #[error("connection reset")]
    ConnectionReset,

    /// Allocation failure while normalizing or materializing a chunk.
    #[error("out of memory")]
    OutOfMemory,

    /// Propagated verbatim from file setaside / read operations.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl BeamError {
    /// `true` for errors that indicate the caller should simply retry.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Again)
    }

    /// `true` for errors that indicate the beam is permanently unusable.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionAborted | Self::EndOfFile | Self::ConnectionReset
        )
    }
}

pub type Result<T> = std::result::Result<T, BeamError>;
