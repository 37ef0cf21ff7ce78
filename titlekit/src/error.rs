use std::path::PathBuf;

use thiserror::Error;

/// Catch-all error type for the decrypt + extract engine.
///
/// Only the fatal kinds from the error taxonomy ever surface as `Err`:
/// missing `title.tmd`/`title.tik` (component A), malformed metadata,
/// a per-content cipher failure or short read, and cancellation.
/// `CommonKeyMismatch`, `HashMismatch`, `MissingContainer`, and
/// `PathEscape` are non-fatal and are instead accumulated as
/// [`crate::report::Warning`] entries on the relevant report type.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TitleError {
    #[error("missing required file: {0}")]
    MissingFile(PathBuf),
    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),
    #[error("content cipher failure for content {content_id}: {reason}")]
    CipherFailure { content_id: String, reason: String },
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type TitleResult<T> = std::result::Result<T, TitleError>;
