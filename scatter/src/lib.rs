#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod broker;
mod client;
pub mod config;
pub mod error;
mod limiter;
pub mod monitor;
pub mod stat;
pub mod worker;

pub use broker::Broker;
pub use config::{Config, Duration, EndpointConfig};
pub use error::Error;
pub use stat::Stat;
pub use worker::{WorkerError, WorkerPool};
