//! Error types returned by every engine operation.
//!
//! Each operation reports failure as an explicit [`EngineError`] value.
//! Apart from [`EngineError::Internal`], a failed operation leaves the
//! stream exactly as it was before the call.

use crate::engine::PlaybackState;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while opening, preparing or playing a stream.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The container is unrecognized or its contents are corrupt.
    #[error("Format error: {0}")]
    Format(String),

    /// The backing byte source failed to read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Memory for the stream could not be reserved.
    #[error("Resource error: {0}")]
    Resource(String),

    /// A locate target lies beyond the end of the stream.
    #[error("Seek target {target_ms} ms exceeds duration {duration_ms} ms")]
    SeekOutOfRange {
        /// Requested position in milliseconds.
        target_ms: u32,
        /// Parsed duration of the stream in milliseconds.
        duration_ms: u32,
    },

    /// The stream handle was closed (or never belonged to this engine).
    #[error("Stream handle used after close")]
    UseAfterClose,

    /// The operation is not valid in the stream's current state.
    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Playback state at the time of the call.
        state: PlaybackState,
    },

    /// An argument is outside its accepted range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unrecoverable failure; the stream is now in the Error state.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Shorthand for an [`EngineError::InvalidState`] value.
    pub(crate) fn invalid_state(operation: &'static str, state: PlaybackState) -> Self {
        EngineError::InvalidState { operation, state }
    }
}

impl From<midly::Error> for EngineError {
    fn from(e: midly::Error) -> Self {
        EngineError::Format(e.to_string())
    }
}
