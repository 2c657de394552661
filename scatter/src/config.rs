//! Broker configuration.
//!
//! Loaded from a strict JSON file: unknown fields are rejected at every
//! level. Durations accept either an integer nanosecond count or a string
//! like `"30s"` (see [`Duration`]).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use scatter_storage::config::Duration;
use scatter_storage::config::{
    BinMemcacheConfig, GoCacheConfig, MemcacheConfig, RedisConfig, StorageConfig,
};

use crate::error::Error;

/// Top-level broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listen address, e.g. `":8000"` or `"127.0.0.1:8000"`.
    pub addr: String,

    /// How long to wait for in-flight handlers to drain after cancellation.
    #[serde(default)]
    pub shutdown_timeout: Duration,

    /// Maximum number of concurrently running request handlers.
    /// Zero or negative disables the limit.
    #[serde(default)]
    pub max_handlers: i32,

    /// Worker pool size. Positive routes every fan-out job through a pool
    /// of that many executors; otherwise each job runs on its own task.
    #[serde(default)]
    pub worker_num: i32,

    /// Default timeout for endpoints that do not declare their own.
    pub http_client_timeout: Duration,

    /// Downstream endpoints by name. The map is ordered, so endpoint
    /// enumeration is canonical everywhere (acknowledgement, storage reads,
    /// logs).
    pub endpoints: BTreeMap<String, EndpointConfig>,

    /// Storage backend tag; see [`scatter_storage::Registry`].
    #[serde(default)]
    pub store_type: String,

    /// Redis backend settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,

    /// Text-protocol memcache settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memcache: Option<MemcacheConfig>,

    /// Binary-protocol memcache settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binmemcache: Option<BinMemcacheConfig>,

    /// In-process cache settings (legacy section name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gocache: Option<GoCacheConfig>,
}

/// One downstream target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    /// Base URL requests are dispatched to.
    pub url: String,

    /// Per-endpoint timeout; falls back to `http_client_timeout` when
    /// omitted or zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl Config {
    /// Loads and strictly parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Address in a bindable form: a bare `":8000"` becomes
    /// `"0.0.0.0:8000"`.
    pub fn listen_addr(&self) -> String {
        if self.addr.starts_with(':') {
            format!("0.0.0.0{}", self.addr)
        } else {
            self.addr.clone()
        }
    }

    /// Endpoint names in canonical (sorted) order.
    pub fn endpoint_names(&self) -> Vec<String> {
        self.endpoints.keys().cloned().collect()
    }

    /// The storage half of the configuration, bundled for the registry.
    pub fn storage(&self) -> StorageConfig {
        StorageConfig {
            store_type: self.store_type.clone(),
            redis: self.redis.clone(),
            memcache: self.memcache.clone(),
            binmemcache: self.binmemcache.clone(),
            gocache: self.gocache.clone(),
        }
    }
}
