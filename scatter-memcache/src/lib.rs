#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod binary;
pub(crate) mod client;
pub mod error;
pub mod text;

pub use binary::BinMemcacheStorage;
pub use error::Error;
pub use text::TextMemcacheStorage;

use scatter_storage::Registry;

/// Registers both protocol flavors: `"memcache"` (text) and
/// `"binmemcache"` (binary).
pub fn register(registry: &mut Registry) {
    text::register(registry);
    binary::register(registry);
}
