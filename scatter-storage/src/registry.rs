//! Tag registry mapping `store_type` values to backend factories.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::StorageConfig;
use crate::discard::DiscardStorage;
use crate::error::StorageError;
use crate::storage::Storage;

/// Factory signature every backend registers.
///
/// The endpoint-name slice is handed to backends whose read path probes one
/// derived key per endpoint.
pub type StorageFactory =
    fn(&StorageConfig, &[String]) -> Result<Arc<dyn Storage>, StorageError>;

/// Registry of storage backends keyed by their `store_type` tag.
///
/// The discard backend is built in under `""` and `"discard"`; every other
/// backend must be registered before [`Registry::build`] is called. An
/// unknown tag is a construction-time error, not a fallback.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<&'static str, StorageFactory>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a tag, replacing any previous one.
    pub fn register(&mut self, tag: &'static str, factory: StorageFactory) {
        if self.factories.insert(tag, factory).is_some() {
            debug!(tag, "storage factory replaced");
        }
    }

    /// Constructs the storage selected by `config.store_type`.
    pub fn build(
        &self,
        config: &StorageConfig,
        endpoint_names: &[String],
    ) -> Result<Arc<dyn Storage>, StorageError> {
        if let Some(factory) = self.factories.get(config.store_type.as_str()) {
            return factory(config, endpoint_names);
        }
        match config.store_type.as_str() {
            "" | "discard" => Ok(Arc::new(DiscardStorage)),
            other => Err(StorageError::UnknownStoreType(other.to_owned())),
        }
    }
}
