//! Plumbing shared by both protocol flavors.

use std::sync::Arc;
use std::time::Duration;

use memcache::Client;
use scatter_storage::{ResponseView, StorageError, StorageResult};

use crate::error::Error;

/// Runs one synchronous client operation on the blocking thread pool.
pub(crate) async fn blocking<T, F>(client: Arc<Client>, op: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Client) -> StorageResult<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || op(&client)).await {
        Ok(result) => result,
        Err(join) => Err(StorageError::Backend(Box::new(join))),
    }
}

pub(crate) fn connect(urls: Vec<String>, pool_size: u32) -> Result<Client, Error> {
    let client = if pool_size > 0 {
        Client::with_pool_size(urls, pool_size)
    } else {
        Client::connect(urls)
    }?;
    Ok(client)
}

pub(crate) fn encode_record(reqid: &str, method: &str, url: &str) -> StorageResult<Vec<u8>> {
    serde_json::to_vec(&ResponseView::record(reqid, method, url)).map_err(StorageError::backend)
}

pub(crate) fn decode_record(bytes: &[u8]) -> StorageResult<ResponseView> {
    serde_json::from_slice(bytes).map_err(StorageError::backend)
}

/// TTL in whole seconds; sub-second remainders round up because zero means
/// "never expire" to memcache.
pub(crate) fn ttl_secs(d: Duration) -> u32 {
    if d.is_zero() {
        return 0;
    }
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.min(u64::from(u32::MAX)) as u32
}
