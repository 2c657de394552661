//! Error types for storage operations.

use thiserror::Error;

/// Boxed error used to carry backend-specific failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for storage operations.
///
/// The broker only discriminates two things about a failed write: whether it
/// was a timeout (counted separately) and everything else. Reads additionally
/// distinguish a missing request record from a backend failure.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No request record exists for the identifier.
    #[error("no request found: {0}")]
    NotFound(String),

    /// The `store_type` tag does not match any registered backend.
    #[error("unsupported \"store_type\": {0:?}")]
    UnknownStoreType(String),

    /// A backend configuration section is missing or unusable.
    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),

    /// The backend reported a timeout.
    #[error("storage operation timed out")]
    Timeout(#[source] BoxError),

    /// Any other backend failure.
    #[error(transparent)]
    Backend(BoxError),
}

impl StorageError {
    /// Wraps a backend error without timeout classification.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }

    /// Wraps a backend error classified as a timeout.
    pub fn timeout<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Timeout(Box::new(err))
    }

    /// True when the failure was a timeout.
    ///
    /// The dispatcher uses this to count `store_timeout` separately from
    /// other store failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
