//! Error kinds surfaced by the core.
//!
//! Transport failures propagate to the caller untouched; the job loop stamps
//! them with line/command context before surfacing. Compile and plan failures
//! come back as `Parse` with a human-readable message.

use thiserror::Error;

/// Result alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The transport has no usable link to the controller.
    #[error("transport not ready")]
    NotReady,

    /// A command did not terminate within its timeout.
    #[error("command timed out after {0} ms")]
    Timeout(u64),

    /// The controller answered with an error marker.
    #[error("controller error: {0}")]
    Controller(String),

    /// A response could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The requested transition is not legal for the entity's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Unknown job id or missing resource.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation was aborted by a cancellation request.
    #[error("cancelled")]
    Cancelled,

    /// SVG or G-code input could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// True for the kinds a caller may retry after operator intervention
    /// (the link itself stays usable).
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Timeout(_) | CoreError::NotReady)
    }
}
