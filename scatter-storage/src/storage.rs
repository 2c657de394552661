//! Core storage trait shared by every backend.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::response::ResponseView;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Derives the key an endpoint entry is stored under.
///
/// Backends that address the record and its endpoint entries separately
/// (memcache, the in-process cache) all use this shape so the offline read
/// tool can probe entries regardless of which backend wrote them.
pub fn entry_key(reqid: &str, name: &str) -> String {
    format!("{reqid}.{name}")
}

/// Persistence contract the dispatch engine relies on.
///
/// `store_request` runs on the request-handling task strictly before any
/// fan-out job is scheduled; `store_response` runs once per completed
/// (request, endpoint) round-trip, concurrently across endpoints and
/// requests. Implementations must therefore be safe for concurrent writers.
///
/// # Dyn-Compatibility
///
/// The trait is dyn-compatible; the broker holds it as `Arc<dyn Storage>`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist the request record for `reqid`.
    async fn store_request(&self, reqid: &str, method: &str, url: &str) -> StorageResult<()>;

    /// Persist one downstream response body under `(reqid, name)`.
    ///
    /// Written at most once per pair; the body is stored verbatim, whatever
    /// HTTP status it arrived with.
    async fn store_response(&self, reqid: &str, name: &str, data: &[u8]) -> StorageResult<()>;

    /// Assemble the stored view for `reqid`.
    ///
    /// Returns [`StorageError::NotFound`] when no request record exists.
    /// Endpoint entries that are missing or unreadable are left out of
    /// [`ResponseView::results`] rather than failing the read.
    async fn get_response(&self, reqid: &str) -> StorageResult<ResponseView>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_key_joins_with_dot() {
        assert_eq!(entry_key("abc", "ep1"), "abc.ep1");
    }
}
