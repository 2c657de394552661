#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod config;
pub mod discard;
pub mod error;
pub mod registry;
pub mod response;
pub mod storage;

pub use config::{
    BinMemcacheConfig, Duration, GoCacheConfig, MemcacheConfig, RedisConfig, StorageConfig,
};
pub use discard::DiscardStorage;
pub use error::{BoxError, StorageError};
pub use registry::{Registry, StorageFactory};
pub use response::ResponseView;
pub use storage::{Storage, StorageResult, entry_key};
