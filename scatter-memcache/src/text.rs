//! Text-protocol (ascii) memcache backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use memcache::Client;
use scatter_storage::{
    Registry, ResponseView, Storage, StorageError, StorageResult, config::MemcacheConfig,
    entry_key,
};

use crate::client::{blocking, connect, decode_record, encode_record};
use crate::error::Error;

/// Memcache backend speaking the ascii protocol.
///
/// The request record is a JSON blob at key `reqid`; each endpoint body is
/// raw bytes at `reqid.<name>`. Every item carries the configured TTL, which
/// must be at least one second (the protocol counts expiry in whole
/// seconds). The read path probes each endpoint key individually and skips
/// misses.
pub struct TextMemcacheStorage {
    client: Arc<Client>,
    expire_secs: u32,
    endpoint_names: Vec<String>,
}

impl TextMemcacheStorage {
    /// Creates a backend from its configuration section.
    pub fn new(
        config: &MemcacheConfig,
        endpoint_names: &[String],
    ) -> Result<Self, StorageError> {
        if config.addrs.is_empty() {
            return Err(StorageError::InvalidConfig(
                "\"addrs\" requires one or more addresses".to_owned(),
            ));
        }
        if config.expire_in.as_std() < Duration::from_secs(1) {
            return Err(StorageError::InvalidConfig(format!(
                "\"expire_in\" must be at least one second: {}",
                config.expire_in
            )));
        }
        let urls = config
            .addrs
            .iter()
            .map(|addr| format!("memcache://{addr}?protocol=ascii"))
            .collect();
        let client = connect(urls, config.max_idle_conns).map_err(StorageError::from)?;
        Ok(Self {
            client: Arc::new(client),
            expire_secs: config.expire_in.as_std().as_secs() as u32,
            endpoint_names: endpoint_names.to_vec(),
        })
    }
}

#[async_trait]
impl Storage for TextMemcacheStorage {
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
            let record: Option<Vec<u8>> = client
                .get(&reqid)
                .map_err(|e| StorageError::from(Error::from(e)))?;
            let record = record.ok_or_else(|| StorageError::NotFound(reqid.clone()))?;
            let mut view = decode_record(&record)?;
            for name in &names {
                // An absent or unreadable entry just stays out of the view.
                if let Ok(Some(body)) = client.get::<Vec<u8>>(&entry_key(&reqid, name)) {
                    view.results
                        .insert(name.clone(), String::from_utf8_lossy(&body).into_owned());
                }
            }
            Ok(view)
        })
        .await
    }
}

/// Registers this backend under the `"memcache"` tag.
pub fn register(registry: &mut Registry) {
    registry.register("memcache", |config, names| {
        let section = config.memcache.as_ref().ok_or_else(|| {
            StorageError::InvalidConfig("\"memcache\" section is not available".to_owned())
        })?;
        let storage = TextMemcacheStorage::new(section, names)?;
        Ok(Arc::new(storage))
    });
}
