#![doc = include_str!("../README.md")]

use scatter_storage::Registry;

/// Builds a registry with every built-in backend registered.
///
/// The discard backend needs no registration; it is the registry's own
/// fallback for the `""` and `"discard"` tags.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    scatter_redis::register(&mut registry);
    scatter_memcache::register(&mut registry);
    scatter_moka::register(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use scatter_storage::StorageError;
    use scatter_storage::config::{Duration, GoCacheConfig, StorageConfig};

    use super::*;

    #[test]
    fn builds_the_in_process_backend() {
        let config = StorageConfig {
            store_type: "gocache".to_owned(),
            gocache: Some(GoCacheConfig {
                expire_in: Duration(std::time::Duration::from_secs(60)),
            }),
            ..Default::default()
        };
        default_registry()
            .build(&config, &["a".to_owned()])
            .unwrap();
    }

    #[test]
    fn missing_section_fails_construction() {
        let config = StorageConfig {
            store_type: "redis".to_owned(),
            ..Default::default()
        };
        assert!(matches!(
            default_registry().build(&config, &[]),
            Err(StorageError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unknown_tag_fails_construction() {
        let config = StorageConfig {
            store_type: "etcd".to_owned(),
            ..Default::default()
        };
        assert!(matches!(
            default_registry().build(&config, &[]),
            Err(StorageError::UnknownStoreType(_))
        ));
    }
}
