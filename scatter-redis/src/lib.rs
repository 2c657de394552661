#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod backend;
pub mod error;

#[doc(inline)]
pub use crate::backend::{RedisStorage, register};
pub use crate::error::Error;
