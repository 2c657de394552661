//! Error types for the memcache backends.

use memcache::MemcacheError;
use scatter_storage::StorageError;

/// Error type for memcache backend operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error from the underlying memcache client.
    #[error("memcache storage error: {0}")]
    Memcache(#[from] MemcacheError),
}

fn is_timeout(err: &MemcacheError) -> bool {
    matches!(
        err,
        MemcacheError::IOError(io)
            if matches!(io.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock)
    )
}

impl From<Error> for StorageError {
    fn from(error: Error) -> Self {
        match error {
            Error::Memcache(err) if is_timeout(&err) => StorageError::timeout(err),
            Error::Memcache(err) => StorageError::backend(err),
        }
    }
}
