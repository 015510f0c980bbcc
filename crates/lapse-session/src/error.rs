//! Error types for session store operations.

/// Error type for session store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Session was never created, has expired, or was deleted.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The injected ID generator failed or produced an unusable ID.
    #[error("Session ID generation failed: {0}")]
    IdGeneration(String),
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;
