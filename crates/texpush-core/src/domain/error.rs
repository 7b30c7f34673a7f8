//! Domain-level error taxonomy for texpush.

use std::path::PathBuf;

/// texpush domain errors.
#[derive(Debug, thiserror::Error)]
pub enum TexpushError {
    #[error("git error: {0}")]
    GitError(String),

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("failed to start command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("cannot append to run log {}: {source}", path.display())]
    LogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for texpush domain operations.
pub type Result<T> = std::result::Result<T, TexpushError>;
