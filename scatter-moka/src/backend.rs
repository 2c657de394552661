//! Moka backend implementation.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache;
use scatter_storage::{
    Registry, ResponseView, Storage, StorageError, StorageResult, config::GoCacheConfig,
    entry_key,
};

/// One cache slot: either the request record or one endpoint body.
#[derive(Debug, Clone)]
enum Entry {
    Record(ResponseView),
    Body(Bytes),
}

/// In-process storage backend powered by Moka.
///
/// Expiration is best-effort: Moka evicts expired entries on access and in
/// background maintenance, the same way a periodic sweep would.
#[derive(Clone)]
pub struct MokaStorage {
    cache: Cache<String, Entry>,
    endpoint_names: Arc<Vec<String>>,
}

impl MokaStorage {
    /// Creates a backend from its configuration section.
    pub fn new(config: &GoCacheConfig, endpoint_names: &[String]) -> Self {
        let mut builder = Cache::builder();
        if !config.expire_in.is_zero() {
            builder = builder.time_to_live(config.expire_in.as_std());
        }
        Self {
            cache: builder.build(),
            endpoint_names: Arc::new(endpoint_names.to_vec()),
        }
    }
}

#[async_trait]
impl Storage for MokaStorage {
    async fn store_request(&self, reqid: &str, method: &str, url: &str) -> StorageResult<()> {
        self.cache
            .insert(
                reqid.to_owned(),
                Entry::Record(ResponseView::record(reqid, method, url)),
            )
            .await;
        Ok(())
    }

    async fn store_response(&self, reqid: &str, name: &str, data: &[u8]) -> StorageResult<()> {
        self.cache
            .insert(
                entry_key(reqid, name),
                Entry::Body(Bytes::copy_from_slice(data)),
            )
            .await;
        Ok(())
    }

    async fn get_response(&self, reqid: &str) -> StorageResult<ResponseView> {
        let mut view = match self.cache.get(reqid).await {
            Some(Entry::Record(record)) => record,
            _ => return Err(StorageError::NotFound(reqid.to_owned())),
        };
        for name in self.endpoint_names.iter() {
            if let Some(Entry::Body(body)) = self.cache.get(&entry_key(reqid, name)).await {
                view.results
                    .insert(name.clone(), String::from_utf8_lossy(&body).into_owned());
            }
        }
        Ok(view)
    }
}

/// Registers this backend under the legacy `"gocache"` tag.
pub fn register(registry: &mut Registry) {
    registry.register("gocache", |config, names| {
        let section = config.gocache.as_ref().ok_or_else(|| {
            StorageError::InvalidConfig("\"gocache\" section is not available".to_owned())
        })?;
        Ok(Arc::new(MokaStorage::new(section, names)))
    });
}
