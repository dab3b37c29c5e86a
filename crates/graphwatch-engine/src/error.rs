//! Engine error types.

use thiserror::Error;

/// Errors that can occur while starting or running a watch session.
#[derive(Debug, Error)]
pub enum WatchError {
    /// A session is already running on this watcher
    #[error("already watching {0}")]
    AlreadyWatching(String),

    /// The root could not be resolved to an existing directory
    #[error("invalid watch path: {0}")]
    InvalidPath(String),

    /// The root was given as a URI with a scheme other than `file`
    #[error("{0} scheme not supported")]
    UnsupportedScheme(String),

    /// I/O error during a walk
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Native subscription error
    #[error("Registry error: {0}")]
    Registry(String),

    /// Blocking task failed to complete
    #[error("Worker task failed: {0}")]
    Join(String),
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::Registry(e.to_string())
    }
}

impl From<tokio::task::JoinError> for WatchError {
    fn from(e: tokio::task::JoinError) -> Self {
        WatchError::Join(e.to_string())
    }
}
