//! Error types for broker construction and serving.

use scatter_storage::StorageError;
use thiserror::Error;

/// Error type for the broker.
///
/// Everything here happens strictly before or outside the request path:
/// per-request and per-endpoint failures are absorbed by counters and logs
/// instead (see [`crate::stat`]).
#[derive(Debug, Error)]
pub enum Error {
    /// Reading the configuration file, binding or serving failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The configuration file did not parse.
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration declares no endpoints.
    #[error("no endpoints")]
    NoEndpoints,

    /// An endpoint URL did not parse.
    #[error("invalid url for endpoint {name:?}: {reason}")]
    EndpointUrl {
        /// Endpoint name from the configuration.
        name: String,
        /// Parser message.
        reason: String,
    },

    /// Storage construction or the pre-fan-out record write failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The shared outbound client could not be built.
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}
