use std::time::Duration;

use thiserror::Error;

/// Errors returned by a remote storage provider.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The provider has no file with this ID.
    #[error("remote file not found: {0}")]
    NotFound(String),

    /// Local filesystem failure (local backend only).
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request never got a usable HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with a non-zero result code.
    #[error("provider rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// The provider answered, but not in a shape we understand.
    #[error("malformed provider response: {0}")]
    Malformed(String),

    /// The credential cannot be used with this backend.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation did not finish within its deadline.
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),
}
