//! Error taxonomy for directory and file operations.
//!
//! Every gateway call made by a node maps its failure to exactly one of
//! these kinds at the boundary and returns immediately; nothing is
//! aggregated or retried.

use crate::store::StoreError;
use thiserror::Error;
use tracing::error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum FsError {
    /// The key is absent from the backing store.
    #[error("no such entry")]
    NotFound,

    /// Any other store failure, connection errors included.
    #[error("i/o failure")]
    Io,

    /// A store type outside {string, list, stream} was encountered while
    /// materializing a read.
    #[error("operation not supported")]
    Unsupported,
}

impl FsError {
    /// Errno presented to the kernel.
    pub fn errno(self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::Io => libc::EIO,
            FsError::Unsupported => libc::ENOTSUP,
        }
    }
}

/// Funnel a gateway failure into the filesystem taxonomy. Backend
/// failures are logged with the operation and key for diagnosis.
pub(crate) fn map_store(op: &'static str, key: &str, err: StoreError) -> FsError {
    match err {
        StoreError::NotFound(_) => FsError::NotFound,
        StoreError::Backend(message) => {
            error!(op, key, error = %message, "store operation failed");
            FsError::Io
        }
    }
}
