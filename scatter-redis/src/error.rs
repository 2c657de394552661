//! Error types for the Redis backend.

use redis::RedisError;
use scatter_storage::StorageError;

/// Error type for Redis backend operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An error from the underlying Redis client.
    #[error("redis storage error: {0}")]
    Redis(#[from] RedisError),

    /// The configured address could not be parsed as `host:port`.
    #[error("invalid redis address: {0:?}")]
    InvalidAddr(String),
}

impl From<Error> for StorageError {
    fn from(error: Error) -> Self {
        match error {
            Error::Redis(e) if e.is_timeout() => StorageError::timeout(e),
            Error::Redis(e) => StorageError::backend(e),
            other @ Error::InvalidAddr(_) => StorageError::InvalidConfig(other.to_string()),
        }
    }
}
