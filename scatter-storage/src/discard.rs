//! No-op storage for load and wiring tests.

use async_trait::async_trait;

use crate::response::ResponseView;
use crate::storage::{Storage, StorageResult};

/// Storage that accepts every write and remembers nothing.
///
/// Reads succeed with a view carrying only the request identifier, so the
/// broker and the read tool stay exercisable without any backing service.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardStorage;

#[async_trait]
impl Storage for DiscardStorage {
    async fn store_request(&self, _reqid: &str, _method: &str, _url: &str) -> StorageResult<()> {
        Ok(())
    }

    async fn store_response(&self, _reqid: &str, _name: &str, _data: &[u8]) -> StorageResult<()> {
        Ok(())
    }

    async fn get_response(&self, reqid: &str) -> StorageResult<ResponseView> {
        Ok(ResponseView {
            id: reqid.to_owned(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_are_accepted_and_read_returns_id_only() {
        let storage = DiscardStorage;
        storage.store_request("abc", "GET", "/x").await.unwrap();
        storage.store_response("abc", "ep1", b"body").await.unwrap();

        let view = storage.get_response("abc").await.unwrap();
        assert_eq!(view.id, "abc");
        assert!(view.method.is_empty());
        assert!(view.results.is_empty());
    }
}
