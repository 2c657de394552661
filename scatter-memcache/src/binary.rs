//! Binary-protocol memcache backend.

use std::sync::Arc;

use async_trait::async_trait;
use memcache::Client;
use scatter_storage::{
    Registry, ResponseView, Storage, StorageError, StorageResult, config::BinMemcacheConfig,
    entry_key,
};

use crate::client::{blocking, connect, decode_record, encode_record, ttl_secs};
use crate::error::Error;

/// Memcache backend speaking the binary protocol.
///
/// Same key shapes as the text flavor; the read path fetches the record and
/// every endpoint entry in one multi-get.
pub struct BinMemcacheStorage {
    client: Arc<Client>,
    expire_secs: u32,
    endpoint_names: Vec<String>,
}

impl BinMemcacheStorage {
    /// Creates a backend from its configuration section.
    pub fn new(
        config: &BinMemcacheConfig,
        endpoint_names: &[String],
    ) -> Result<Self, StorageError> {
        if config.addrs.is_empty() {
            return Err(StorageError::InvalidConfig(
                "\"addrs\" requires one or more addresses".to_owned(),
            ));
        }
        let urls = config
            .addrs
            .iter()
            .map(|addr| format!("memcache://{addr}"))
            .collect();
        let client = connect(urls, config.conns_per_node).map_err(StorageError::from)?;
        Ok(Self {
            client: Arc::new(client),
            expire_secs: ttl_secs(config.expire_in.as_std()),
            endpoint_names: endpoint_names.to_vec(),
        })
    }
}

#[async_trait]
impl Storage for BinMemcacheStorage {
    async fn store_request(&self, reqid: &str, method: &str, url: &str) -> StorageResult<()> {
        let record = encode_record(reqid, method, url)?;
        let key = reqid.to_owned();
        let expire = self.expire_secs;
        blocking(Arc::clone(&self.client), move |client| {
            client
                .set(&key, record.as_slice(), expire)
                .map_err(|e| StorageError::from(Error::from(e)))
        })
        .await
    }

    async fn store_response(&self, reqid: &str, name: &str, data: &[u8]) -> StorageResult<()> {
        let key = entry_key(reqid, name);
        let data = data.to_vec();
        let expire = self.expire_secs;
        blocking(Arc::clone(&self.client), move |client| {
            client
                .set(&key, data.as_slice(), expire)
                .map_err(|e| StorageError::from(Error::from(e)))
        })
        .await
    }

    async fn get_response(&self, reqid: &str) -> StorageResult<ResponseView> {
        let reqid = reqid.to_owned();
        let names = self.endpoint_names.clone();
        blocking(Arc::clone(&self.client), move |client| {
            let mut keys = Vec::with_capacity(names.len() + 1);
            keys.push(reqid.clone());
            keys.extend(names.iter().map(|name| entry_key(&reqid, name)));
            let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();

            let mut found: std::collections::HashMap<String, Vec<u8>> = client
                .gets(&key_refs)
                .map_err(|e| StorageError::from(Error::from(e)))?;

            let record = found
                .remove(&reqid)
                .ok_or_else(|| StorageError::NotFound(reqid.clone()))?;
            let mut view = decode_record(&record)?;
            for name in &names {
                if let Some(body) = found.remove(&entry_key(&reqid, name)) {
                    view.results
                        .insert(name.clone(), String::from_utf8_lossy(&body).into_owned());
                }
            }
            Ok(view)
        })
        .await
    }
}

/// Registers this backend under the `"binmemcache"` tag.
pub fn register(registry: &mut Registry) {
    registry.register("binmemcache", |config, names| {
        let section = config.binmemcache.as_ref().ok_or_else(|| {
            StorageError::InvalidConfig("\"binmemcache\" section is not available".to_owned())
        })?;
        let storage = BinMemcacheStorage::new(section, names)?;
        Ok(Arc::new(storage))
    });
}
