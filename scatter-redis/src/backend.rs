//! Redis backend implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo};
use scatter_storage::{
    Registry, ResponseView, Storage, StorageError, StorageResult, config::RedisConfig,
};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::error::Error;

/// Storage backend persisting brokered requests in Redis.
///
/// One request identifier maps to one hash: the reserved `_id`, `_method`
/// and `_url` fields carry the request record, every other field is one
/// endpoint body keyed by endpoint name. When a TTL is configured it is
/// applied to the hash in the same pipelined transaction as the record
/// write, so record and entries always share one expiry.
///
/// The connection is a lazily initialized multiplexed
/// [`ConnectionManager`]; many concurrent fan-out jobs share it.
pub struct RedisStorage {
    client: Client,
    connection: OnceCell<ConnectionManager>,
    expire_in: Duration,
}

impl RedisStorage {
    /// Creates a backend from its configuration section.
    ///
    /// Fails on an unparsable address; actual connection errors surface
    /// lazily on the first operation.
    pub fn new(config: &RedisConfig) -> Result<Self, Error> {
        let (host, port) = split_addr(&config.addr)?;
        if config.pool_size.is_some() {
            debug!("redis pool_size accepted; multiplexed connection manager does not pool");
        }
        let mut redis_info = RedisConnectionInfo::default().set_db(config.dbnum);
        if let Some(password) = config.password.as_ref() {
            redis_info = redis_info.set_password(password);
        }
        let info: ConnectionInfo = ConnectionAddr::Tcp(host, port)
            .into_connection_info()?
            .set_redis_settings(redis_info);
        Ok(Self {
            client: Client::open(info)?,
            connection: OnceCell::new(),
            expire_in: config.expire_in.as_std(),
        })
    }

    async fn connection(&self) -> Result<&ConnectionManager, Error> {
        self.connection
            .get_or_try_init(|| {
                trace!("initialize redis connection manager");
                self.client.get_connection_manager()
            })
            .await
            .map_err(Error::from)
    }
}

fn split_addr(addr: &str) -> Result<(String, u16), Error> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| Error::InvalidAddr(addr.to_owned()))?;
    let port = port
        .parse()
        .map_err(|_| Error::InvalidAddr(addr.to_owned()))?;
    Ok((host.to_owned(), port))
}

/// Turns an `HGETALL` result into a [`ResponseView`].
///
/// Reserved `_`-prefixed fields populate the record; everything else is an
/// endpoint entry. A map without `_id` means the record never existed.
fn assemble_view(reqid: &str, map: HashMap<String, Vec<u8>>) -> StorageResult<ResponseView> {
    if !map.contains_key("_id") {
        return Err(StorageError::NotFound(reqid.to_owned()));
    }
    let mut view = ResponseView::default();
    for (key, value) in map {
        let text = String::from_utf8_lossy(&value).into_owned();
        match key.as_str() {
            "_id" => view.id = text,
            "_method" => view.method = text,
            "_url" => view.url = text,
            _ if key.starts_with('_') => {}
            _ => {
                view.results.insert(key, text);
            }
        }
    }
    Ok(view)
}

#[async_trait]
impl Storage for RedisStorage {
    async fn store_request(&self, reqid: &str, method: &str, url: &str) -> StorageResult<()> {
        let mut con = self.connection().await?.clone();

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("HSET")
            .arg(reqid)
            .arg("_id")
            .arg(reqid)
            .arg("_method")
            .arg(method)
            .arg("_url")
            .arg(url)
            .ignore();
        if !self.expire_in.is_zero() {
            pipe.cmd("PEXPIRE")
                .arg(reqid)
                .arg(self.expire_in.as_millis() as u64)
                .ignore();
        }
        pipe.query_async::<()>(&mut con).await.map_err(Error::from)?;
        Ok(())
    }

    async fn store_response(&self, reqid: &str, name: &str, data: &[u8]) -> StorageResult<()> {
        let mut con = self.connection().await?.clone();
        redis::cmd("HSET")
            .arg(reqid)
            .arg(name)
            .arg(data)
            .query_async::<()>(&mut con)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn get_response(&self, reqid: &str) -> StorageResult<ResponseView> {
        let mut con = self.connection().await?.clone();
        let map: HashMap<String, Vec<u8>> = redis::cmd("HGETALL")
            .arg(reqid)
            .query_async(&mut con)
            .await
            .map_err(Error::from)?;
        assemble_view(reqid, map)
    }
}

/// Registers this backend under the `"redis"` tag.
pub fn register(registry: &mut Registry) {
    registry.register("redis", |config, _names| {
        let section = config.redis.as_ref().ok_or_else(|| {
            StorageError::InvalidConfig("\"redis\" section is not available".to_owned())
        })?;
        let storage = RedisStorage::new(section)?;
        Ok(Arc::new(storage))
    });
}
